//! Shared geometry helpers: canonical WKT for points and bounding boxes.
//!
//! The snap cache stores snapped geometries as well-known text and the
//! point-identity hash is derived from a canonical WKT form, so formatting
//! must be deterministic: the same coordinates always produce the same
//! string, across runs and across machines.

use geo::{LineString, Point};

/// Format a point as canonical WKT.
///
/// Uses Rust's shortest-roundtrip float formatting, which prints integral
/// values without a fractional part (`POINT (5 0)`, not `POINT (5.0 0.0)`).
///
/// # Example
/// ```
/// use bikeability_engine::geo_utils::point_wkt;
/// use geo::Point;
///
/// assert_eq!(point_wkt(&Point::new(5.0, 0.0)), "POINT (5 0)");
/// assert_eq!(point_wkt(&Point::new(2.5, -1.25)), "POINT (2.5 -1.25)");
/// ```
pub fn point_wkt(point: &Point<f64>) -> String {
    format!("POINT ({} {})", point.x(), point.y())
}

/// Parse a WKT point string back into a `Point`.
///
/// Accepts `POINT (x y)` and `POINT(x y)`. Returns `None` for anything
/// else, including `POINT EMPTY`.
pub fn parse_point_wkt(wkt: &str) -> Option<Point<f64>> {
    let body = wkt.trim().strip_prefix("POINT")?.trim();
    let inner = body.strip_prefix('(')?.strip_suffix(')')?;
    let mut parts = inner.split_whitespace();
    let x: f64 = parts.next()?.parse().ok()?;
    let y: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(Point::new(x, y))
}

/// Axis-aligned bounding box of a line as ([min_x, min_y], [max_x, max_y]).
///
/// Returns `None` for an empty line or one containing non-finite
/// coordinates.
pub fn line_bbox(line: &LineString<f64>) -> Option<([f64; 2], [f64; 2])> {
    if line.0.is_empty() {
        return None;
    }

    let mut min = [f64::MAX, f64::MAX];
    let mut max = [f64::MIN, f64::MIN];

    for c in &line.0 {
        if !c.x.is_finite() || !c.y.is_finite() {
            return None;
        }
        min[0] = min[0].min(c.x);
        min[1] = min[1].min(c.y);
        max[0] = max[0].max(c.x);
        max[1] = max[1].max(c.y);
    }

    Some((min, max))
}

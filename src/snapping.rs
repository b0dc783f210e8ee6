//! Snapping observation points onto the street network.
//!
//! The R-tree stores bounding boxes, and the distance to a box only
//! lower-bounds the distance to the edge geometry inside it. Snapping
//! therefore seeds with the nearest box, then re-checks every edge whose
//! box lies within that seed distance before projecting onto the winner.

use geo::{Closest, ClosestPoint, EuclideanDistance, Point};

use crate::streets::StreetIndex;

/// Outcome of snapping a single observation point.
///
/// An `Unsnapped` point keeps its original position so downstream stages
/// can still carry it along; it simply never joins a street edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapResult {
    /// The point was projected onto an edge.
    Snapped {
        /// Projected position on the edge geometry.
        point: Point<f64>,
        /// Position of the edge in the street index.
        edge_idx: usize,
    },
    /// No usable edge was found; the original position is kept.
    Unsnapped { point: Point<f64> },
}

impl SnapResult {
    /// The resulting position, projected or original.
    pub fn point(&self) -> Point<f64> {
        match self {
            SnapResult::Snapped { point, .. } => *point,
            SnapResult::Unsnapped { point } => *point,
        }
    }

    /// The matched edge, if any.
    pub fn edge_index(&self) -> Option<usize> {
        match self {
            SnapResult::Snapped { edge_idx, .. } => Some(*edge_idx),
            SnapResult::Unsnapped { .. } => None,
        }
    }

    pub fn is_snapped(&self) -> bool {
        matches!(self, SnapResult::Snapped { .. })
    }
}

/// Snap one point to the nearest street edge.
///
/// Nearest means smallest euclidean distance to the edge geometry; when
/// two edges are exactly equidistant the one earlier in the index wins,
/// so repeated runs over the same network give the same answer.
///
/// Points with non-finite coordinates, and points whose nearest edge
/// cannot be projected onto, come back as [`SnapResult::Unsnapped`].
pub fn snap_point(index: &StreetIndex, point: &Point<f64>) -> SnapResult {
    if !point.x().is_finite() || !point.y().is_finite() {
        return SnapResult::Unsnapped { point: *point };
    }

    let position = [point.x(), point.y()];
    let seed = match index.nearest_handle(position) {
        Some(handle) => handle,
        None => return SnapResult::Unsnapped { point: *point },
    };
    if index.geometry(seed.idx).0.len() < 2 {
        return SnapResult::Unsnapped { point: *point };
    }

    let seed_dist = point.euclidean_distance(index.geometry(seed.idx));

    // Any edge nearer than the seed must have its box within seed_dist.
    let mut best_idx = seed.idx;
    let mut best_dist = seed_dist;
    for handle in index.handles_within(position, seed_dist * seed_dist) {
        if handle.idx == seed.idx {
            continue;
        }
        let dist = point.euclidean_distance(index.geometry(handle.idx));
        if dist < best_dist || (dist == best_dist && handle.idx < best_idx) {
            best_idx = handle.idx;
            best_dist = dist;
        }
    }

    match index.geometry(best_idx).closest_point(point) {
        Closest::SinglePoint(projected) => SnapResult::Snapped {
            point: projected,
            edge_idx: best_idx,
        },
        Closest::Intersection(projected) => SnapResult::Snapped {
            point: projected,
            edge_idx: best_idx,
        },
        Closest::Indeterminate => SnapResult::Unsnapped { point: *point },
    }
}

/// Snap a batch of points, preserving input order.
pub fn snap_batch(index: &StreetIndex, points: &[Point<f64>]) -> Vec<SnapResult> {
    points.iter().map(|p| snap_point(index, p)).collect()
}

/// Parallel variant of [`snap_batch`].
///
/// Falls back to the sequential path for small batches where thread
/// fan-out costs more than it saves. Output order matches input order
/// either way.
#[cfg(feature = "parallel")]
pub fn snap_batch_parallel(index: &StreetIndex, points: &[Point<f64>]) -> Vec<SnapResult> {
    use rayon::prelude::*;

    if points.len() < 128 {
        return snap_batch(index, points);
    }

    points.par_iter().map(|p| snap_point(index, p)).collect()
}

//! Deterministic identities for observation points.
//!
//! An observation is identified by where it is, what kind of reading it
//! carries and what was measured. Two runs over the same input data must
//! produce the same identities so previously snapped points can be looked
//! up in the cache instead of being snapped again.

use geo::Point;
use uuid::Uuid;

use crate::geo_utils::point_wkt;

/// Compute the stable identity of an observation point.
///
/// The identity is a name-based (v5) UUID over the canonical string
/// `"<wkt>_<tag>_<value>"`:
///
/// * `wkt` is the point in canonical WKT form,
/// * `tag` is the trimmed tag, or empty when absent,
/// * `value` is rendered with four decimal places, or empty when absent.
///
/// Rounding the value to four decimals makes identities robust against
/// float noise from upstream unit conversions. A missing value and a
/// zero value produce different identities.
pub fn point_identity(point: &Point<f64>, tag: Option<&str>, value: Option<f64>) -> Uuid {
    let tag = tag.map(str::trim).unwrap_or("");
    let value = value.map(|v| format!("{:.4}", v)).unwrap_or_default();
    let name = format!("{}_{}_{}", point_wkt(point), tag, value);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
}

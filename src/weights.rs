//! Category weighting and the final per-edge index.
//!
//! Sensors are grouped into categories (safety, infrastructure quality,
//! environment quality) so the index can express "how much does safety
//! matter" without re-tuning every time a sensor joins or leaves the
//! fleet. Weights are assigned per category; inside a category every
//! sensor counts the same.
//!
//! Missing data stays missing. A sensor that never reached an edge is
//! left out of its category mean, a category with no data at all drops
//! out of the weighted sum, and an edge with no data anywhere gets no
//! index rather than a misleading 0.
//!
//! ## Example
//! ```rust
//! use std::collections::HashMap;
//! use bikeability_engine::weights::{compute_index, CategoryMap};
//!
//! let categories = CategoryMap::default();
//! let mut weights = HashMap::new();
//! weights.insert("safety".to_string(), 0.5);
//! weights.insert("environment_quality".to_string(), 0.5);
//!
//! let mut normalized = HashMap::new();
//! normalized.insert("Speed".to_string(), 0.8);
//!
//! // Only the safety category has data, so it alone carries the index.
//! assert_eq!(compute_index(&normalized, &weights, &categories), Some(0.4));
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Category name to member sensor names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMap {
    #[serde(default)]
    pub members: HashMap<String, Vec<String>>,
}

impl CategoryMap {
    /// An empty map: no category groups any sensor.
    pub fn empty() -> Self {
        Self {
            members: HashMap::new(),
        }
    }

    /// Member sensors of a category.
    pub fn members(&self, category: &str) -> Option<&[String]> {
        self.members.get(category).map(|sensors| sensors.as_slice())
    }

    /// Insert or replace a category's member list.
    pub fn set(&mut self, category: &str, sensors: &[&str]) {
        self.members.insert(
            category.to_string(),
            sensors.iter().map(|s| s.to_string()).collect(),
        );
    }
}

impl Default for CategoryMap {
    /// Category grouping for the deployed sensor fleet.
    fn default() -> Self {
        let mut map = Self::empty();
        map.set("safety", &["Overtaking_Distance", "Speed"]);
        map.set("infrastructure_quality", &["Surface_Anomaly"]);
        map.set(
            "environment_quality",
            &[
                "Temperature",
                "Rel__Humidity",
                "Finedust_PM1",
                "Finedust_PM2_5",
                "Finedust_PM4",
                "Finedust_PM10",
            ],
        );
        map
    }
}

/// Lookup table from lowercased category name to weight.
fn lowercased(weights: &HashMap<String, f64>) -> HashMap<String, f64> {
    weights
        .iter()
        .map(|(category, weight)| (category.to_lowercase(), *weight))
        .collect()
}

/// Split each category weight evenly across the category's member sensors.
///
/// Category names are matched case-insensitively. A category with zero
/// weight, no weight entry, or no members contributes no sensor entries;
/// weight entries naming no known category are ignored.
pub fn expand_weights(
    category_weights: &HashMap<String, f64>,
    categories: &CategoryMap,
) -> HashMap<String, f64> {
    let weights = lowercased(category_weights);

    let mut expanded = HashMap::new();
    for (category, members) in &categories.members {
        let weight = weights
            .get(&category.to_lowercase())
            .copied()
            .unwrap_or(0.0);
        if members.is_empty() || weight == 0.0 {
            continue;
        }

        let share = weight / members.len() as f64;
        for sensor in members {
            expanded.insert(sensor.clone(), share);
        }
    }
    expanded
}

/// Unweighted mean of each category's member scores.
///
/// Members without a score are excluded from the mean rather than counted
/// as 0, so sparse coverage does not drag a category down. A category
/// none of whose members scored is absent from the result, as is any
/// score whose sensor belongs to no category.
pub fn category_scores(
    normalized: &HashMap<String, f64>,
    categories: &CategoryMap,
) -> HashMap<String, f64> {
    let mut scores = HashMap::new();
    for (category, members) in &categories.members {
        let present: Vec<f64> = members
            .iter()
            .filter_map(|sensor| normalized.get(sensor).copied())
            .collect();
        if present.is_empty() {
            continue;
        }
        scores.insert(
            category.clone(),
            present.iter().sum::<f64>() / present.len() as f64,
        );
    }
    scores
}

/// Weighted index for one edge from its normalized sensor scores.
///
/// Each category contributes its score times its weight; categories
/// without data drop out and the remaining weights are used as given,
/// not renormalized. Returns `None` when no category scored at all,
/// keeping "never measured" distinct from a genuine worst-case 0.
pub fn compute_index(
    normalized: &HashMap<String, f64>,
    category_weights: &HashMap<String, f64>,
    categories: &CategoryMap,
) -> Option<f64> {
    let scores = category_scores(normalized, categories);
    if scores.is_empty() {
        return None;
    }

    let weights = lowercased(category_weights);
    let index = scores
        .iter()
        .map(|(category, score)| {
            score * weights.get(&category.to_lowercase()).copied().unwrap_or(0.0)
        })
        .sum();
    Some(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries
            .iter()
            .map(|(category, weight)| (category.to_string(), *weight))
            .collect()
    }

    fn scores(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries
            .iter()
            .map(|(sensor, score)| (sensor.to_string(), *score))
            .collect()
    }

    #[test]
    fn test_expand_weights_splits_evenly() {
        let categories = CategoryMap::default();
        let expanded = expand_weights(
            &weights(&[
                ("safety", 0.4),
                ("infrastructure_quality", 0.5),
                ("environment_quality", 0.1),
            ]),
            &categories,
        );

        assert_eq!(expanded.get("Overtaking_Distance"), Some(&0.2));
        assert_eq!(expanded.get("Speed"), Some(&0.2));
        assert_eq!(expanded.get("Surface_Anomaly"), Some(&0.5));
        assert_eq!(expanded.get("Finedust_PM10"), Some(&(0.1 / 6.0)));
        assert_eq!(expanded.len(), 9);
    }

    #[test]
    fn test_expand_weights_skips_zero_and_unlisted() {
        let categories = CategoryMap::default();
        let expanded = expand_weights(
            &weights(&[("safety", 0.0), ("comfort", 1.0)]),
            &categories,
        );

        assert!(expanded.is_empty());
    }

    #[test]
    fn test_expand_weights_matches_case_insensitively() {
        let categories = CategoryMap::default();
        let expanded = expand_weights(&weights(&[("Safety", 0.4)]), &categories);

        assert_eq!(expanded.get("Speed"), Some(&0.2));
    }

    #[test]
    fn test_category_scores_averages_present_members() {
        let categories = CategoryMap::default();
        let normalized = scores(&[("Overtaking_Distance", 1.0), ("Speed", 0.5)]);

        let result = category_scores(&normalized, &categories);
        assert_eq!(result.get("safety"), Some(&0.75));
        assert!(!result.contains_key("environment_quality"));
    }

    #[test]
    fn test_category_scores_exclude_missing_members() {
        let categories = CategoryMap::default();
        let normalized = scores(&[("Speed", 0.5)]);

        // The absent overtaking sensor must not count as 0.
        let result = category_scores(&normalized, &categories);
        assert_eq!(result.get("safety"), Some(&0.5));
    }

    #[test]
    fn test_category_scores_ignore_ungrouped_sensors() {
        let categories = CategoryMap::default();
        let normalized = scores(&[("Cadence", 1.0)]);

        assert!(category_scores(&normalized, &categories).is_empty());
    }

    #[test]
    fn test_compute_index_weights_category_means() {
        let categories = CategoryMap::default();
        let normalized = scores(&[("Speed", 1.0), ("Surface_Anomaly", 0.5)]);
        let category_weights = weights(&[
            ("safety", 0.25),
            ("infrastructure_quality", 0.75),
        ]);

        let index = compute_index(&normalized, &category_weights, &categories);
        assert_eq!(index, Some(0.625));
    }

    #[test]
    fn test_compute_index_none_without_data() {
        let categories = CategoryMap::default();
        let category_weights = weights(&[("safety", 1.0)]);

        let index = compute_index(&HashMap::new(), &category_weights, &categories);
        assert_eq!(index, None);
    }

    #[test]
    fn test_compute_index_zero_for_unweighted_category() {
        let categories = CategoryMap::default();
        let normalized = scores(&[("Surface_Anomaly", 1.0)]);
        let category_weights = weights(&[("safety", 1.0)]);

        // Data exists, so an index exists, but its weight is zero. This is
        // a computed 0, not "no data".
        let index = compute_index(&normalized, &category_weights, &categories);
        assert_eq!(index, Some(0.0));
    }

    #[test]
    fn test_default_map_covers_fleet() {
        let categories = CategoryMap::default();

        assert_eq!(categories.members("safety").map(|m| m.len()), Some(2));
        assert_eq!(
            categories.members("infrastructure_quality").map(|m| m.len()),
            Some(1)
        );
        assert_eq!(
            categories.members("environment_quality").map(|m| m.len()),
            Some(6)
        );
    }
}

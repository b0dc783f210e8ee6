//! Normalization of aggregated sensor values onto a common [0, 1] scale.
//!
//! Raw per-edge statistics live in incompatible units (µg/m³, cm, km/h,
//! °C). Each sensor gets a policy describing what "good" looks like for
//! it, and every policy maps onto the same desirability scale where 1 is
//! best and 0 is worst. Only values on that shared scale are allowed into
//! the weighted index.
//!
//! ## Policies
//! - **Linear benefit** - more is better (overtaking distance)
//! - **Linear cost** - less is better (particulate matter, speed)
//! - **Triangular** - a comfort window with an optimum inside it
//!   (temperature, humidity)
//!
//! ## Example
//! ```rust
//! use bikeability_engine::normalize::{normalize_series, NormalizationConfig};
//!
//! let config = NormalizationConfig::default();
//! let speeds = vec![Some(10.0), Some(30.0), None, Some(50.0)];
//!
//! let scores = normalize_series(&speeds, "Speed", &config);
//! assert_eq!(scores, vec![Some(1.0), Some(0.5), None, Some(0.0)]);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How one sensor's raw values map onto the shared desirability scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizationPolicy {
    /// Higher raw values are better: `(value - min) / (max - min)`.
    LinearBenefit { min: f64, max: f64 },
    /// Lower raw values are better: `(max - value) / (max - min)`.
    LinearCost { min: f64, max: f64 },
    /// A comfort window: 0 at or beyond `min` and `max`, rising linearly
    /// to 1 at `opt`.
    Triangular { min: f64, opt: f64, max: f64 },
}

impl NormalizationPolicy {
    /// Map a raw value to its desirability score in [0, 1].
    ///
    /// Values outside the configured range clamp to the boundary score.
    /// A linear policy with a degenerate span (`max <= min`) scores 0,
    /// so a misconfigured sensor can never inflate the index.
    pub fn apply(&self, value: f64) -> f64 {
        let score = match *self {
            NormalizationPolicy::LinearBenefit { min, max } => {
                if max <= min {
                    return 0.0;
                }
                (value - min) / (max - min)
            }
            NormalizationPolicy::LinearCost { min, max } => {
                if max <= min {
                    return 0.0;
                }
                (max - value) / (max - min)
            }
            NormalizationPolicy::Triangular { min, opt, max } => {
                // Boundary checks first, so the divisions below always see
                // a non-zero denominator.
                if value <= min || value >= max {
                    0.0
                } else if value <= opt {
                    (value - min) / (opt - min)
                } else {
                    (max - value) / (max - opt)
                }
            }
        };
        score.clamp(0.0, 1.0)
    }
}

/// Per-sensor normalization policy table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// Sensor name to policy. Sensors without an entry pass through
    /// [`normalize_series`] unchanged.
    #[serde(default)]
    pub policies: HashMap<String, NormalizationPolicy>,
}

impl NormalizationConfig {
    /// An empty table: every sensor passes through unchanged.
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    /// Look up the policy for a sensor.
    pub fn policy(&self, sensor: &str) -> Option<&NormalizationPolicy> {
        self.policies.get(sensor)
    }

    /// Insert or replace the policy for a sensor.
    pub fn set(&mut self, sensor: &str, policy: NormalizationPolicy) {
        self.policies.insert(sensor.to_string(), policy);
    }
}

impl Default for NormalizationConfig {
    /// Policy table for the deployed sensor fleet.
    ///
    /// Particulate bounds follow the WHO 24h guideline ranges, the
    /// overtaking range brackets the legal minimum passing distance,
    /// and the comfort windows come from the cycling-climate literature.
    fn default() -> Self {
        let mut policies = HashMap::new();

        policies.insert(
            "Finedust_PM1".to_string(),
            NormalizationPolicy::LinearCost { min: 0.0, max: 25.0 },
        );
        policies.insert(
            "Finedust_PM2_5".to_string(),
            NormalizationPolicy::LinearCost { min: 0.0, max: 25.0 },
        );
        policies.insert(
            "Finedust_PM4".to_string(),
            NormalizationPolicy::LinearCost { min: 0.0, max: 40.0 },
        );
        policies.insert(
            "Finedust_PM10".to_string(),
            NormalizationPolicy::LinearCost { min: 0.0, max: 50.0 },
        );
        policies.insert(
            "Surface_Anomaly".to_string(),
            NormalizationPolicy::LinearCost { min: 0.0, max: 10.0 },
        );
        policies.insert(
            "Overtaking_Distance".to_string(),
            NormalizationPolicy::LinearBenefit { min: 1.0, max: 2.0 },
        );
        policies.insert(
            "Temperature".to_string(),
            NormalizationPolicy::Triangular {
                min: 10.0,
                opt: 22.0,
                max: 30.0,
            },
        );
        policies.insert(
            "Rel__Humidity".to_string(),
            NormalizationPolicy::Triangular {
                min: 20.0,
                opt: 50.0,
                max: 70.0,
            },
        );
        policies.insert(
            "Speed".to_string(),
            NormalizationPolicy::LinearCost {
                min: 10.0,
                max: 50.0,
            },
        );

        Self { policies }
    }
}

/// Normalize one sensor's per-edge statistics to the [0, 1] scale.
///
/// `None` entries (edges the sensor never reached) stay `None`. Two whole
/// series pass through untouched: a series with no values at all, and a
/// sensor without a configured policy. The latter is logged, since fleets
/// routinely carry sensors that are collected before they are scored.
pub fn normalize_series(
    series: &[Option<f64>],
    sensor: &str,
    config: &NormalizationConfig,
) -> Vec<Option<f64>> {
    if series.iter().all(|value| value.is_none()) {
        return series.to_vec();
    }

    let policy = match config.policy(sensor) {
        Some(policy) => policy,
        None => {
            log::warn!(
                "[Normalize] No policy configured for sensor '{}', passing {} values through",
                sensor,
                series.iter().filter(|value| value.is_some()).count()
            );
            return series.to_vec();
        }
    };

    series
        .iter()
        .map(|entry| entry.map(|value| policy.apply(value)))
        .collect()
}

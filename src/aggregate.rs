//! Joining snapped observations onto edges and collapsing them into
//! per-edge statistics.
//!
//! Value rules (clamps, severity mapping) run before the join so that the
//! joined value lists already carry the numbers that enter the statistic.
//! The join itself is a corridor test: a point belongs to the closest edge
//! within `buffer` planar units, and to no edge at all when none is that
//! close. Edges nobody hit simply do not appear in the output.

use std::collections::HashMap;

use geo::{EuclideanDistance, Point};
use serde::{Deserialize, Serialize};

use crate::streets::StreetIndex;
use crate::ObservationPoint;

/// A value adjustment applied to raw observations, in listed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClampRule {
    /// Values above `max` are pulled down to `max`.
    Ceiling { max: f64 },
    /// The exact sentinel `from` becomes `to`; all other values pass.
    Replace { from: f64, to: f64 },
}

/// How the joined values of one edge collapse into a single statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateMethod {
    Mean,
    Sum,
}

impl Default for AggregateMethod {
    fn default() -> Self {
        AggregateMethod::Mean
    }
}

/// Per-sensor preprocessing and aggregation rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorRules {
    /// Clamps applied to each value before the corridor join.
    #[serde(default)]
    pub clamps: Vec<ClampRule>,
    /// Tag-class weights for event sensors. When set, the mapped weight
    /// replaces the observation value and observations with an unmapped
    /// tag carry no value at all.
    #[serde(default)]
    pub severity_weights: Option<HashMap<String, f64>>,
    /// Statistic computed per edge.
    #[serde(default)]
    pub method: AggregateMethod,
}

impl SensorRules {
    /// Rules for an event sensor whose tag encodes a severity class;
    /// per-edge values are summed instead of averaged.
    pub fn severity_weighted(weights: HashMap<String, f64>) -> Self {
        Self {
            clamps: Vec::new(),
            severity_weights: Some(weights),
            method: AggregateMethod::Sum,
        }
    }

    /// Default severity mapping: class "1" (fatal) 0.5, "2" (serious)
    /// 0.35, "3" (light) 0.15.
    pub fn default_severity_weights() -> HashMap<String, f64> {
        let mut weights = HashMap::new();
        weights.insert("1".to_string(), 0.5);
        weights.insert("2".to_string(), 0.35);
        weights.insert("3".to_string(), 0.15);
        weights
    }
}

/// Default rules for the known sensor fleet. Callers override or extend
/// this table through [`crate::ScoringConfig`].
pub fn default_sensor_rules() -> HashMap<String, SensorRules> {
    let mut rules = HashMap::new();

    // GPS spikes above 60 km/h are vehicle rides, not cycling.
    rules.insert(
        "Speed".to_string(),
        SensorRules {
            clamps: vec![ClampRule::Ceiling { max: 60.0 }],
            ..Default::default()
        },
    );
    // The particulate sensors saturate; readings above 180 are noise.
    for dust in [
        "Finedust_PM1",
        "Finedust_PM2_5",
        "Finedust_PM4",
        "Finedust_PM10",
    ] {
        rules.insert(
            dust.to_string(),
            SensorRules {
                clamps: vec![ClampRule::Ceiling { max: 180.0 }],
                ..Default::default()
            },
        );
    }
    // The ultrasound unit reports 400 when no vehicle passed at all.
    rules.insert(
        "Overtaking_Distance".to_string(),
        SensorRules {
            clamps: vec![ClampRule::Replace {
                from: 400.0,
                to: 0.0,
            }],
            ..Default::default()
        },
    );

    rules
}

/// Values of every observation joined to one edge, plus their statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorAggregate {
    pub values: Vec<f64>,
    pub statistic: f64,
}

/// Apply a sensor's value rules to a series of observations.
///
/// Severity mapping runs first (when configured) and derives the value
/// from the tag; clamps then fold over whatever value is present. Points
/// are returned in input order with only their values rewritten, so they
/// can still be snapped and cached even when the value ends up absent.
pub fn apply_rules(points: &[ObservationPoint], rules: &SensorRules) -> Vec<ObservationPoint> {
    points
        .iter()
        .map(|point| {
            let mut point = point.clone();
            let value = match &rules.severity_weights {
                Some(weights) => point
                    .tag
                    .as_deref()
                    .map(str::trim)
                    .and_then(|tag| weights.get(tag).copied()),
                None => point.value,
            };
            point.value = value.map(|v| apply_clamps(v, &rules.clamps));
            point
        })
        .collect()
}

fn apply_clamps(value: f64, clamps: &[ClampRule]) -> f64 {
    clamps.iter().fold(value, |v, rule| match rule {
        ClampRule::Ceiling { max } => v.min(*max),
        ClampRule::Replace { from, to } => {
            if v == *from {
                *to
            } else {
                v
            }
        }
    })
}

/// Join valued points onto edges and aggregate per edge.
///
/// A point joins the closest edge within `buffer`; exact ties go to the
/// lower edge index. Points with no edge that close are dropped. The
/// result only contains edges that received at least one point.
pub fn aggregate_points(
    points: &[(Point<f64>, f64)],
    index: &StreetIndex,
    buffer: f64,
    method: AggregateMethod,
) -> HashMap<usize, SensorAggregate> {
    let mut buckets: HashMap<usize, Vec<f64>> = HashMap::new();

    for (point, value) in points {
        let (x, y) = (point.x(), point.y());
        let mut best: Option<(f64, usize)> = None;

        for handle in index.handles_in_box([x - buffer, y - buffer], [x + buffer, y + buffer]) {
            let dist = point.euclidean_distance(index.geometry(handle.idx));
            if dist > buffer {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_dist, best_idx)) => {
                    dist < best_dist || (dist == best_dist && handle.idx < best_idx)
                }
            };
            if better {
                best = Some((dist, handle.idx));
            }
        }

        if let Some((_, idx)) = best {
            buckets.entry(idx).or_default().push(*value);
        }
    }

    buckets
        .into_iter()
        .map(|(idx, values)| {
            let sum: f64 = values.iter().sum();
            let statistic = match method {
                AggregateMethod::Mean => sum / values.len() as f64,
                AggregateMethod::Sum => sum,
            };
            (idx, SensorAggregate { values, statistic })
        })
        .collect()
}

//! # Bikeability Engine
//!
//! Per-street-segment bikeability scoring from crowd-collected sensor
//! rides and accident records.
//!
//! This library provides:
//! - Nearest-edge snapping of observation points onto a street network
//! - A persistent, content-addressed snap cache so repeated runs never
//!   redo distance computations
//! - Per-edge aggregation, normalization and category weighting into a
//!   single bikeability index
//! - Daily track segmentation for ride traces
//!
//! ## Features
//!
//! - **`persistence`** - SQLite-backed snap cache (enabled by default)
//! - **`parallel`** - Parallel snapping with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use bikeability_engine::{Edge, ObservationPoint, ScoringEngine, SensorSeries};
//! use geo::{Coord, LineString};
//!
//! // Two street edges in a projected planar CRS.
//! let edges = vec![
//!     Edge::new(
//!         "a",
//!         LineString::new(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 0.0 }]),
//!     ),
//!     Edge::new(
//!         "b",
//!         LineString::new(vec![Coord { x: 0.0, y: 50.0 }, Coord { x: 100.0, y: 50.0 }]),
//!     ),
//! ];
//!
//! let engine = ScoringEngine::new(edges).unwrap();
//!
//! // Speed readings recorded a little off the first edge.
//! let series = SensorSeries::new(
//!     "Speed",
//!     vec![
//!         ObservationPoint::new(20.0, 0.4).with_value(18.0),
//!         ObservationPoint::new(60.0, -0.3).with_value(24.0),
//!     ],
//! );
//!
//! let scores = engine.score(&[series]);
//! assert!(scores.row("a").unwrap().index.is_some());
//! assert!(scores.row("b").unwrap().index.is_none()); // no data, no index
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use geo::{LineString, Point};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, ScoringError};

// Geometry helpers (WKT formatting, bounding boxes)
pub mod geo_utils;

// Content-based point identity
pub mod identity;
pub use identity::point_identity;

// Spatially indexed street network
pub mod streets;
pub use streets::{EdgeHandle, StreetIndex};

// Nearest-edge snapping
pub mod snapping;
#[cfg(feature = "parallel")]
pub use snapping::snap_batch_parallel;
pub use snapping::{snap_batch, snap_point, SnapResult};

// Persistent snap cache
#[cfg(feature = "persistence")]
pub mod cache;
#[cfg(feature = "persistence")]
pub use cache::{SnapCache, SnapRecord};

// Sensor value rules and the point-to-edge corridor join
pub mod aggregate;
pub use aggregate::{
    aggregate_points, apply_rules, default_sensor_rules, AggregateMethod, ClampRule,
    SensorAggregate, SensorRules,
};

// Daily track segmentation
pub mod tracks;
pub use tracks::{split_track, DailySegment, TrackPoint};

// Normalization onto the shared [0, 1] desirability scale
pub mod normalize;
pub use normalize::{normalize_series, NormalizationConfig, NormalizationPolicy};

// Category weighting and the final index
pub mod weights;
pub use weights::{category_scores, compute_index, expand_weights, CategoryMap};

// The scoring pipeline end to end
pub mod engine;
pub use engine::{
    EdgeScoreRow, EdgeScores, ScoringEngine, SkippedSensor, SnapBatchResult, SnappedObservation,
};

// ============================================================================
// Core Types
// ============================================================================

/// A single sensor or accident reading at a projected planar position.
///
/// # Example
/// ```
/// use bikeability_engine::ObservationPoint;
/// let reading = ObservationPoint::new(368_200.0, 5_702_100.0).with_value(17.5);
/// assert!(reading.is_valid());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationPoint {
    /// Easting in the working planar CRS.
    pub x: f64,
    /// Northing in the working planar CRS.
    pub y: f64,
    /// Measured value. Event readings may carry only a tag instead.
    #[serde(default)]
    pub value: Option<f64>,
    /// Categorical tag, e.g. an accident severity class.
    #[serde(default)]
    pub tag: Option<String>,
    /// When the reading was taken. Deliberately not part of the point's
    /// identity: re-exported datasets with shifted timestamps must still
    /// hit the snap cache.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ObservationPoint {
    /// Create a reading with no value, tag or timestamp.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            value: None,
            tag: None,
            timestamp: None,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// The raw position as a geometry point.
    pub fn position(&self) -> Point<f64> {
        Point::new(self.x, self.y)
    }

    /// Check the reading has usable coordinates.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// The reading's stable content identity (see [`point_identity`]).
    pub fn identity(&self) -> Uuid {
        point_identity(&self.position(), self.tag.as_deref(), self.value)
    }
}

/// One street-network segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    /// Stable identifier from the street network snapshot.
    pub id: String,
    /// Segment polyline in the working planar CRS.
    pub geometry: LineString<f64>,
    /// Descriptive tags carried through from the source data.
    pub tags: HashMap<String, String>,
}

impl Edge {
    /// Create an edge with no tags.
    pub fn new(id: &str, geometry: LineString<f64>) -> Self {
        Self {
            id: id.to_string(),
            geometry,
            tags: HashMap::new(),
        }
    }

    pub fn with_tags(mut self, tags: HashMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    /// Check the edge can be indexed: at least two coordinates, all finite.
    pub fn is_valid(&self) -> bool {
        self.geometry.0.len() >= 2
            && self
                .geometry
                .0
                .iter()
                .all(|coord| coord.x.is_finite() && coord.y.is_finite())
    }
}

/// A named batch of observations sharing one measurement type.
///
/// The sensor name is the key into every per-sensor table: value rules,
/// normalization policies and category membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSeries {
    pub sensor: String,
    pub points: Vec<ObservationPoint>,
}

impl SensorSeries {
    pub fn new(sensor: &str, points: Vec<ObservationPoint>) -> Self {
        Self {
            sensor: sensor.to_string(),
            points,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Everything the scoring pipeline needs besides the street network.
///
/// All lookup tables are plain values here rather than process globals,
/// so several cities or weighting schemes can run side by side in one
/// process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Per-sensor value rules applied before snapping and aggregation.
    pub sensor_rules: HashMap<String, SensorRules>,
    /// Per-sensor normalization policies.
    pub normalization: NormalizationConfig,
    /// Category name to member sensors.
    pub categories: CategoryMap,
    /// Category name to weight. Expected to sum to at most 1.
    pub category_weights: HashMap<String, f64>,
    /// Corridor half-width for the point-to-edge join, in planar units.
    pub buffer: f64,
    /// Recording pause that splits a ride into separate track segments,
    /// in minutes.
    pub track_gap_minutes: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let mut category_weights = HashMap::new();
        category_weights.insert("safety".to_string(), 0.222);
        category_weights.insert("infrastructure_quality".to_string(), 0.111);
        category_weights.insert("environment_quality".to_string(), 0.666);

        Self {
            sensor_rules: default_sensor_rules(),
            normalization: NormalizationConfig::default(),
            categories: CategoryMap::default(),
            category_weights,
            buffer: 1.0,
            track_gap_minutes: 5,
        }
    }
}

impl ScoringConfig {
    /// Load a configuration from JSON. Missing fields keep their default
    /// values, so a config file only has to name what it overrides.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ScoringError::ConfigError {
            message: format!("invalid config JSON: {}", e),
        })
    }

    /// The configuration as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Reject configurations the pipeline cannot meaningfully run with.
    pub fn validate(&self) -> Result<()> {
        if self.category_weights.is_empty() {
            return Err(ScoringError::ConfigError {
                message: "category weight map is empty".to_string(),
            });
        }
        if !self.buffer.is_finite() || self.buffer <= 0.0 {
            return Err(ScoringError::ConfigError {
                message: format!("corridor buffer must be positive, got {}", self.buffer),
            });
        }
        if self.track_gap_minutes < 0 {
            return Err(ScoringError::ConfigError {
                message: format!(
                    "track gap must be non-negative, got {} minutes",
                    self.track_gap_minutes
                ),
            });
        }

        let weight_sum: f64 = self.category_weights.values().sum();
        if weight_sum > 1.0 + 1e-9 {
            log::warn!(
                "[Config] Category weights sum to {:.3}, expected at most 1",
                weight_sum
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    #[test]
    fn test_observation_point_builders() {
        let reading = ObservationPoint::new(10.0, 20.0)
            .with_value(3.5)
            .with_tag("2");

        assert_eq!(reading.position(), Point::new(10.0, 20.0));
        assert_eq!(reading.value, Some(3.5));
        assert_eq!(reading.tag.as_deref(), Some("2"));
        assert!(reading.is_valid());
    }

    #[test]
    fn test_observation_point_rejects_non_finite_coords() {
        assert!(!ObservationPoint::new(f64::NAN, 0.0).is_valid());
        assert!(!ObservationPoint::new(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_identity_ignores_timestamp() {
        let base = ObservationPoint::new(5.0, 5.0).with_value(1.0);
        let stamped = base.clone().with_timestamp(Utc::now());

        assert_eq!(base.identity(), stamped.identity());

        // Value changes do change the identity.
        let other = ObservationPoint::new(5.0, 5.0).with_value(2.0);
        assert_ne!(base.identity(), other.identity());
    }

    #[test]
    fn test_edge_validation() {
        let good = Edge::new(
            "e1",
            LineString::new(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }]),
        );
        assert!(good.is_valid());

        let short = Edge::new("e2", LineString::new(vec![Coord { x: 0.0, y: 0.0 }]));
        assert!(!short.is_valid());

        let broken = Edge::new(
            "e3",
            LineString::new(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord {
                    x: f64::NAN,
                    y: 1.0,
                },
            ]),
        );
        assert!(!broken.is_valid());
    }

    #[test]
    fn test_config_defaults() {
        let config = ScoringConfig::default();

        assert_eq!(config.buffer, 1.0);
        assert_eq!(config.track_gap_minutes, 5);
        assert_eq!(config.category_weights.len(), 3);
        assert!(config.validate().is_ok());

        let weight_sum: f64 = config.category_weights.values().sum();
        assert!((weight_sum - 0.999).abs() < 1e-9);
    }

    #[test]
    fn test_config_validate_rejects_bad_values() {
        let mut config = ScoringConfig::default();
        config.category_weights.clear();
        assert!(matches!(
            config.validate(),
            Err(ScoringError::ConfigError { .. })
        ));

        let mut config = ScoringConfig::default();
        config.buffer = 0.0;
        assert!(config.validate().is_err());

        let mut config = ScoringConfig::default();
        config.track_gap_minutes = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_json_keeps_defaults_for_missing_fields() {
        let config = ScoringConfig::from_json(r#"{"buffer": 2.5}"#).unwrap();

        assert_eq!(config.buffer, 2.5);
        assert_eq!(config.track_gap_minutes, 5);
        assert!(!config.normalization.policies.is_empty());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = ScoringConfig::default();
        let json = config.to_json();

        let back = ScoringConfig::from_json(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_config_from_json_rejects_garbage() {
        assert!(matches!(
            ScoringConfig::from_json("not json"),
            Err(ScoringError::ConfigError { .. })
        ));
    }
}

//! # Scoring Engine
//!
//! The full pipeline from raw observations to per-edge scores:
//!
//! 1. Per-sensor value rules (severity mapping, clamps)
//! 2. Nearest-edge snapping, deduplicated by content identity and
//!    optionally served from the persistent snap cache
//! 3. Corridor join and per-edge aggregation
//! 4. Normalization onto the shared [0, 1] scale
//! 5. Category means and the weighted index
//!
//! One engine owns one street network and one configuration; observation
//! data flows through per call. Sensors are processed independently: a
//! series that cannot be used is reported and skipped, never blocking the
//! rest of the run.

use std::collections::{HashMap, HashSet};

use chrono::Duration;
use geo::Point;
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::{aggregate_points, apply_rules, SensorAggregate};
use crate::error::{Result, ScoringError};
use crate::normalize::normalize_series;
use crate::streets::StreetIndex;
use crate::tracks::{split_track, DailySegment, TrackPoint};
use crate::weights::{category_scores, compute_index};
use crate::{Edge, ObservationPoint, ScoringConfig, SensorSeries};

#[cfg(feature = "persistence")]
use crate::cache::{SnapCache, SnapRecord};

// ============================================================================
// Result Types
// ============================================================================

/// One observation together with its snap outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct SnappedObservation {
    /// The observation after its sensor's value rules were applied.
    pub point: ObservationPoint,
    /// Content identity the snap is keyed under.
    pub identity: Uuid,
    /// Position moved onto the street network, or the raw position when
    /// no edge was found.
    pub geometry: Point<f64>,
    /// Index of the matched edge in the street index.
    pub edge_index: Option<usize>,
}

/// Outcome of snapping one sensor series.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapBatchResult {
    /// Snap outcomes in input order, one per usable observation.
    pub observations: Vec<SnappedObservation>,
    /// Observations whose identity was already in the cache.
    pub from_cache: usize,
    /// Distinct new identities snapped in this run.
    pub computed: usize,
    /// Observations repeating an identity seen earlier in the same batch.
    pub duplicates: usize,
}

impl SnapBatchResult {
    pub fn total(&self) -> usize {
        self.observations.len()
    }
}

/// A sensor series the pipeline had to leave out, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedSensor {
    pub sensor: String,
    pub reason: String,
}

/// Scored output for one edge.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeScoreRow {
    /// Edge identifier from the street network.
    pub edge_id: String,
    /// Rule-adjusted values joined to this edge, per sensor.
    pub values: HashMap<String, Vec<f64>>,
    /// Aggregated statistic (mean or sum) per sensor.
    pub aggregates: HashMap<String, f64>,
    /// Normalized [0, 1] score per sensor.
    pub normalized: HashMap<String, f64>,
    /// Unweighted mean of each category's present member scores.
    pub categories: HashMap<String, f64>,
    /// Weighted bikeability index. `None` when no sensor reached the
    /// edge, which is different from a genuine worst-case 0.
    pub index: Option<f64>,
}

/// Per-edge score table for one run.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeScores {
    /// One row per edge, in street-index order.
    pub rows: Vec<EdgeScoreRow>,
    /// Sensors that failed and were left out of the table.
    pub skipped: Vec<SkippedSensor>,
}

impl EdgeScores {
    /// The row for an edge id.
    pub fn row(&self, edge_id: &str) -> Option<&EdgeScoreRow> {
        self.rows.iter().find(|row| row.edge_id == edge_id)
    }

    /// The score table as JSON. Edges without data keep a `null` index.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.rows).unwrap_or_else(|_| "[]".to_string())
    }
}

// ============================================================================
// Scoring Engine
// ============================================================================

/// The scoring pipeline over one street network.
pub struct ScoringEngine {
    streets: StreetIndex,
    config: ScoringConfig,
}

impl ScoringEngine {
    /// Build an engine over a street network with the default config.
    pub fn new(edges: Vec<Edge>) -> Result<Self> {
        Self::with_config(edges, ScoringConfig::default())
    }

    /// Build an engine with an explicit configuration.
    pub fn with_config(edges: Vec<Edge>, config: ScoringConfig) -> Result<Self> {
        config.validate()?;
        let streets = StreetIndex::build(edges)?;
        Ok(Self { streets, config })
    }

    pub fn streets(&self) -> &StreetIndex {
        &self.streets
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    // ========================================================================
    // Snapping
    // ========================================================================

    /// Apply the sensor's value rules and drop observations the pipeline
    /// cannot place.
    fn prepare_series(&self, series: &SensorSeries) -> Result<Vec<ObservationPoint>> {
        if series.points.is_empty() {
            return Err(ScoringError::EmptySeries {
                sensor: series.sensor.clone(),
            });
        }

        let rules = self
            .config
            .sensor_rules
            .get(&series.sensor)
            .cloned()
            .unwrap_or_default();
        let adjusted = apply_rules(&series.points, &rules);

        let total = adjusted.len();
        let usable: Vec<ObservationPoint> = adjusted
            .into_iter()
            .filter(|point| point.is_valid())
            .collect();
        if usable.len() < total {
            log::warn!(
                "[Engine] Dropped {} observation(s) with non-finite coordinates for '{}'",
                total - usable.len(),
                series.sensor
            );
        }
        if usable.is_empty() {
            return Err(ScoringError::EmptySeries {
                sensor: series.sensor.clone(),
            });
        }
        Ok(usable)
    }

    /// Snap prepared observations, reusing `known` outcomes by identity.
    ///
    /// Only the first occurrence of each unseen identity is actually
    /// snapped. The fresh outcomes are returned alongside the batch result
    /// so the cached path can persist them.
    fn snap_prepared(
        &self,
        points: Vec<ObservationPoint>,
        known: HashMap<Uuid, (Point<f64>, Option<usize>)>,
    ) -> (SnapBatchResult, Vec<(Uuid, Point<f64>, Option<usize>)>) {
        let identities: Vec<Uuid> = points.iter().map(|point| point.identity()).collect();

        let mut resolved = known;
        let mut pending: Vec<(Uuid, Point<f64>)> = Vec::new();
        let mut pending_ids: HashSet<Uuid> = HashSet::new();
        let mut from_cache = 0usize;
        let mut duplicates = 0usize;

        for (point, identity) in points.iter().zip(&identities) {
            if resolved.contains_key(identity) {
                from_cache += 1;
            } else if pending_ids.insert(*identity) {
                pending.push((*identity, point.position()));
            } else {
                duplicates += 1;
            }
        }

        let positions: Vec<Point<f64>> = pending.iter().map(|(_, position)| *position).collect();
        #[cfg(feature = "parallel")]
        let outcomes = crate::snapping::snap_batch_parallel(&self.streets, &positions);
        #[cfg(not(feature = "parallel"))]
        let outcomes = crate::snapping::snap_batch(&self.streets, &positions);

        let mut fresh = Vec::with_capacity(pending.len());
        for ((identity, _), outcome) in pending.into_iter().zip(outcomes) {
            let entry = (outcome.point(), outcome.edge_index());
            resolved.insert(identity, entry);
            fresh.push((identity, entry.0, entry.1));
        }

        let observations: Vec<SnappedObservation> = points
            .into_iter()
            .zip(identities)
            .map(|(point, identity)| {
                let (geometry, edge_index) = resolved
                    .get(&identity)
                    .copied()
                    .unwrap_or((point.position(), None));
                SnappedObservation {
                    point,
                    identity,
                    geometry,
                    edge_index,
                }
            })
            .collect();

        let result = SnapBatchResult {
            observations,
            from_cache,
            computed: fresh.len(),
            duplicates,
        };
        (result, fresh)
    }

    /// Snap one sensor series without a cache.
    ///
    /// Duplicate identities within the batch are still snapped only once.
    pub fn snap_series(&self, series: &SensorSeries) -> Result<SnapBatchResult> {
        let points = self.prepare_series(series)?;
        let (result, _) = self.snap_prepared(points, HashMap::new());

        log::info!(
            "[Engine] Snapped '{}': {} observations, {} computed, {} duplicate",
            series.sensor,
            result.total(),
            result.computed,
            result.duplicates
        );
        Ok(result)
    }

    /// Snap one sensor series, serving known identities from the cache.
    ///
    /// The sensor's cache table is loaded up front, only strictly new
    /// identities are snapped, and the merged set is written back in one
    /// atomic replace. Running the same series twice computes nothing the
    /// second time.
    #[cfg(feature = "persistence")]
    pub fn snap_series_cached(
        &self,
        series: &SensorSeries,
        cache: &mut SnapCache,
    ) -> Result<SnapBatchResult> {
        let points = self.prepare_series(series)?;

        let known = cache.load(&series.sensor)?;
        let known_by_identity: HashMap<Uuid, (Point<f64>, Option<usize>)> = known
            .iter()
            .map(|(identity, record)| (*identity, (record.geometry, record.edge_index)))
            .collect();

        let (result, fresh) = self.snap_prepared(points, known_by_identity);

        if !fresh.is_empty() {
            let records: Vec<SnapRecord> = fresh
                .into_iter()
                .map(|(identity, geometry, edge_index)| SnapRecord {
                    identity,
                    geometry,
                    edge_index,
                })
                .collect();
            cache.merge_and_save(&series.sensor, known, records)?;
        }

        log::info!(
            "[Engine] Snapped '{}': {} observations, {} from cache, {} computed, {} duplicate",
            series.sensor,
            result.total(),
            result.from_cache,
            result.computed,
            result.duplicates
        );
        Ok(result)
    }

    // ========================================================================
    // Scoring
    // ========================================================================

    /// Join one snapped series onto edges and aggregate its values.
    fn aggregate_series(
        &self,
        sensor: &str,
        snapped: &SnapBatchResult,
    ) -> HashMap<usize, SensorAggregate> {
        let valued: Vec<(Point<f64>, f64)> = snapped
            .observations
            .iter()
            .filter_map(|snap| {
                snap.point
                    .value
                    .filter(|value| value.is_finite())
                    .map(|value| (snap.geometry, value))
            })
            .collect();

        let method = self
            .config
            .sensor_rules
            .get(sensor)
            .map(|rules| rules.method)
            .unwrap_or_default();

        aggregate_points(&valued, &self.streets, self.config.buffer, method)
    }

    /// Run the full pipeline without a snap cache.
    ///
    /// A series that cannot be processed is recorded in the result's
    /// `skipped` list; it never blocks the remaining sensors.
    pub fn score(&self, series: &[SensorSeries]) -> EdgeScores {
        let mut columns = HashMap::new();
        let mut skipped = Vec::new();

        for one in series {
            match self.snap_series(one) {
                Ok(snapped) => {
                    columns.insert(
                        one.sensor.clone(),
                        self.aggregate_series(&one.sensor, &snapped),
                    );
                }
                Err(err) => {
                    log::warn!("[Engine] Skipping sensor '{}': {}", one.sensor, err);
                    skipped.push(SkippedSensor {
                        sensor: one.sensor.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        self.build_scores(columns, skipped)
    }

    /// Run the full pipeline with a persistent snap cache.
    #[cfg(feature = "persistence")]
    pub fn score_cached(&self, series: &[SensorSeries], cache: &mut SnapCache) -> EdgeScores {
        let mut columns = HashMap::new();
        let mut skipped = Vec::new();

        for one in series {
            match self.snap_series_cached(one, cache) {
                Ok(snapped) => {
                    columns.insert(
                        one.sensor.clone(),
                        self.aggregate_series(&one.sensor, &snapped),
                    );
                }
                Err(err) => {
                    log::warn!("[Engine] Skipping sensor '{}': {}", one.sensor, err);
                    skipped.push(SkippedSensor {
                        sensor: one.sensor.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        self.build_scores(columns, skipped)
    }

    /// Normalize every sensor column and assemble the per-edge table.
    fn build_scores(
        &self,
        columns: HashMap<String, HashMap<usize, SensorAggregate>>,
        skipped: Vec<SkippedSensor>,
    ) -> EdgeScores {
        let edge_count = self.streets.len();

        let mut normalized_columns: HashMap<String, Vec<Option<f64>>> = HashMap::new();
        for (sensor, aggregates) in &columns {
            let raw: Vec<Option<f64>> = (0..edge_count)
                .map(|idx| aggregates.get(&idx).map(|aggregate| aggregate.statistic))
                .collect();
            normalized_columns.insert(
                sensor.clone(),
                normalize_series(&raw, sensor, &self.config.normalization),
            );
        }

        let rows: Vec<EdgeScoreRow> = (0..edge_count)
            .map(|idx| {
                let edge_id = self
                    .streets
                    .edge(idx)
                    .map(|edge| edge.id.clone())
                    .unwrap_or_default();

                let mut values = HashMap::new();
                let mut aggregated = HashMap::new();
                for (sensor, aggregates) in &columns {
                    if let Some(aggregate) = aggregates.get(&idx) {
                        values.insert(sensor.clone(), aggregate.values.clone());
                        aggregated.insert(sensor.clone(), aggregate.statistic);
                    }
                }

                let mut normalized = HashMap::new();
                for (sensor, column) in &normalized_columns {
                    if let Some(score) = column[idx] {
                        normalized.insert(sensor.clone(), score);
                    }
                }

                let categories = category_scores(&normalized, &self.config.categories);
                let index = compute_index(
                    &normalized,
                    &self.config.category_weights,
                    &self.config.categories,
                );

                EdgeScoreRow {
                    edge_id,
                    values,
                    aggregates: aggregated,
                    normalized,
                    categories,
                    index,
                }
            })
            .collect();

        let scored = rows.iter().filter(|row| row.index.is_some()).count();
        log::info!("[Engine] Scored {} of {} edges", scored, rows.len());

        EdgeScores { rows, skipped }
    }

    // ========================================================================
    // Tracks
    // ========================================================================

    /// Split a unit's ride trace into daily segments using the configured
    /// recording-gap threshold.
    pub fn segment_track(&self, unit_id: &str, points: &[TrackPoint]) -> Vec<DailySegment> {
        split_track(
            unit_id,
            points,
            Duration::minutes(self.config.track_gap_minutes),
        )
    }
}

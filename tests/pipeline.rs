//! End-to-end pipeline integration tests.
//!
//! Runs the whole flow against a real SQLite cache file: value rules ->
//! snap -> cache -> corridor join -> normalize -> weighted index. The
//! second run over the same data must be served entirely from the cache
//! and produce identical scores.
//!
//! Run with: `cargo test --test pipeline`

use bikeability_engine::{
    Edge, EdgeScores, ObservationPoint, ScoringConfig, ScoringEngine, SensorRules, SensorSeries,
    SnapCache,
};
use geo::{Coord, LineString};
use tempfile::TempDir;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A small grid: two horizontal avenues and a connecting side street.
fn street_grid() -> Vec<Edge> {
    vec![
        Edge::new(
            "north",
            LineString::new(vec![
                Coord { x: 0.0, y: 100.0 },
                Coord { x: 200.0, y: 100.0 },
            ]),
        ),
        Edge::new(
            "south",
            LineString::new(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 200.0, y: 0.0 }]),
        ),
        Edge::new(
            "link",
            LineString::new(vec![
                Coord { x: 100.0, y: 0.0 },
                Coord { x: 100.0, y: 100.0 },
            ]),
        ),
    ]
}

/// Default config plus severity-weighted rules for the accident layer.
fn scoring_config() -> ScoringConfig {
    let mut config = ScoringConfig::default();
    config.sensor_rules.insert(
        "accidents".to_string(),
        SensorRules::severity_weighted(SensorRules::default_severity_weights()),
    );
    config
}

fn build_engine() -> ScoringEngine {
    ScoringEngine::with_config(street_grid(), scoring_config()).expect("failed to build engine")
}

/// Three sensor layers: two rides' worth of speed and particulate readings
/// plus an accident record layer.
///
/// Speed puts two readings on the south avenue (mean 19) and one on the
/// north (34); particulates sit on the south avenue only; both accidents
/// are serious (class 2) on the south avenue.
fn ride_data() -> Vec<SensorSeries> {
    vec![
        SensorSeries::new(
            "Speed",
            vec![
                ObservationPoint::new(40.0, 0.5).with_value(16.0),
                ObservationPoint::new(60.0, -0.4).with_value(22.0),
                ObservationPoint::new(30.0, 99.3).with_value(34.0),
            ],
        ),
        SensorSeries::new(
            "Finedust_PM2_5",
            vec![
                ObservationPoint::new(50.0, 0.2).with_value(12.5),
                ObservationPoint::new(55.0, 0.6).with_value(12.5),
            ],
        ),
        SensorSeries::new(
            "accidents",
            vec![
                ObservationPoint::new(70.0, 0.3).with_tag("2"),
                ObservationPoint::new(80.0, -0.2).with_tag("2"),
            ],
        ),
    ]
}

/// Helper: temp dir plus a cache stored inside it.
fn setup_cache() -> (SnapCache, TempDir) {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let cache = SnapCache::new(tmp.path().join("snaps.db")).expect("failed to open cache");
    (cache, tmp)
}

fn assert_same_scores(first: &EdgeScores, second: &EdgeScores) {
    assert_eq!(first.rows.len(), second.rows.len());
    for (a, b) in first.rows.iter().zip(&second.rows) {
        assert_eq!(a.edge_id, b.edge_id);
        assert_eq!(a.values, b.values, "values differ on '{}'", a.edge_id);
        assert_eq!(a.aggregates, b.aggregates, "aggregates differ on '{}'", a.edge_id);
        assert_eq!(a.normalized, b.normalized, "normalized differ on '{}'", a.edge_id);
        assert_eq!(a.categories, b.categories, "categories differ on '{}'", a.edge_id);
        assert_eq!(a.index, b.index, "index differs on '{}'", a.edge_id);
    }
}

// ============================================================================
// Test: Full Pipeline
// ============================================================================

#[test]
fn test_full_pipeline_scores_the_network() {
    init_logs();
    let engine = build_engine();
    let (mut cache, _tmp) = setup_cache();

    let scores = engine.score_cached(&ride_data(), &mut cache);
    assert!(scores.skipped.is_empty());

    let south = scores.row("south").expect("south row");
    assert_eq!(south.values["Speed"], vec![16.0, 22.0]);
    assert!((south.aggregates["Speed"] - 19.0).abs() < 1e-9);
    // Speed: linear cost over [10, 50]; PM2.5: linear cost over [0, 25].
    assert!((south.normalized["Speed"] - 0.775).abs() < 1e-9);
    assert!((south.normalized["Finedust_PM2_5"] - 0.5).abs() < 1e-9);
    assert!((south.categories["safety"] - 0.775).abs() < 1e-9);
    assert!((south.categories["environment_quality"] - 0.5).abs() < 1e-9);

    let index = south.index.expect("south index");
    let expected = 0.222 * 0.775 + 0.666 * 0.5;
    assert!((index - expected).abs() < 1e-9, "index {} != {}", index, expected);

    // Two serious accidents sum their severity weights; the layer belongs
    // to no category, so it reports without moving the index.
    assert!((south.aggregates["accidents"] - 0.7).abs() < 1e-9);
    assert!(!south.categories.contains_key("accidents"));

    // The north avenue only saw the fast ride.
    let north = scores.row("north").expect("north row");
    assert!((north.normalized["Speed"] - 0.4).abs() < 1e-9);
    let north_index = north.index.expect("north index");
    assert!((north_index - 0.222 * 0.4).abs() < 1e-9);

    // The side street saw no data at all: no index, not a zero.
    assert!(scores.row("link").expect("link row").index.is_none());
}

#[test]
fn test_json_export_keeps_null_index_for_unseen_edges() {
    init_logs();
    let engine = build_engine();
    let (mut cache, _tmp) = setup_cache();

    let scores = engine.score_cached(&ride_data(), &mut cache);
    let json = scores.to_json();

    let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");
    let rows = parsed.as_array().expect("array of rows");
    assert_eq!(rows.len(), 3);

    let link = rows
        .iter()
        .find(|row| row["edge_id"] == "link")
        .expect("link row in JSON");
    assert!(link["index"].is_null());

    let south = rows
        .iter()
        .find(|row| row["edge_id"] == "south")
        .expect("south row in JSON");
    assert!(south["index"].is_number());
}

// ============================================================================
// Test: Cache Idempotence
// ============================================================================

#[test]
fn test_second_run_is_served_entirely_from_cache() {
    init_logs();
    let engine = build_engine();
    let (mut cache, _tmp) = setup_cache();
    let series = ride_data();

    for one in &series {
        let stats = engine
            .snap_series_cached(one, &mut cache)
            .expect("first snap");
        assert_eq!(stats.from_cache, 0, "fresh cache served '{}'", one.sensor);
        assert_eq!(stats.computed, stats.total());
    }

    for one in &series {
        let stats = engine
            .snap_series_cached(one, &mut cache)
            .expect("second snap");
        assert_eq!(stats.computed, 0, "second run re-snapped '{}'", one.sensor);
        assert_eq!(stats.from_cache, stats.total());
    }
}

#[test]
fn test_cache_survives_reopening_the_database() {
    init_logs();
    let tmp = TempDir::new().expect("failed to create temp dir");
    let db_path = tmp.path().join("snaps.db");
    let engine = build_engine();
    let series = ride_data();

    let first = {
        let mut cache = SnapCache::new(&db_path).expect("failed to open cache");
        engine.score_cached(&series, &mut cache)
    };

    // A brand new connection to the same file already knows every identity.
    let mut cache = SnapCache::new(&db_path).expect("failed to reopen cache");
    for one in &series {
        let stats = engine
            .snap_series_cached(one, &mut cache)
            .expect("snap after reopen");
        assert_eq!(stats.computed, 0, "reopened cache re-snapped '{}'", one.sensor);
    }

    let second = engine.score_cached(&series, &mut cache);
    assert_same_scores(&first, &second);
}

#[test]
fn test_growing_dataset_only_snaps_new_points() {
    init_logs();
    let engine = build_engine();
    let (mut cache, _tmp) = setup_cache();

    let mut series = ride_data();
    engine.score_cached(&series, &mut cache);

    // The next upload repeats all old readings and adds two new ones.
    series[0]
        .points
        .push(ObservationPoint::new(120.0, 0.3).with_value(28.0));
    series[1]
        .points
        .push(ObservationPoint::new(130.0, -0.5).with_value(40.0));

    let speed = engine
        .snap_series_cached(&series[0], &mut cache)
        .expect("speed snap");
    assert_eq!(speed.computed, 1);
    assert_eq!(speed.from_cache, 3);

    let dust = engine
        .snap_series_cached(&series[1], &mut cache)
        .expect("dust snap");
    assert_eq!(dust.computed, 1);
    assert_eq!(dust.from_cache, 2);
}

// ============================================================================
// Test: Failure Isolation
// ============================================================================

#[test]
fn test_broken_series_does_not_block_the_run() {
    init_logs();
    let engine = build_engine();
    let (mut cache, _tmp) = setup_cache();

    let mut series = ride_data();
    series.push(SensorSeries::new("Temperature", vec![]));

    let scores = engine.score_cached(&series, &mut cache);
    assert_eq!(scores.skipped.len(), 1);
    assert_eq!(scores.skipped[0].sensor, "Temperature");

    // The healthy sensors were cached as usual.
    let stats = engine
        .snap_series_cached(&ride_data()[0], &mut cache)
        .expect("speed snap");
    assert_eq!(stats.computed, 0);
}

//! Splitting raw GPS traces into per-day ride segments.
//!
//! A measurement unit uploads one long stream of timestamped positions.
//! For mapping and per-day statistics that stream is cut wherever the
//! calendar date changes or the recording pauses for longer than the
//! configured gap, and fragments too short to describe a ride are thrown
//! away.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};

/// A single timestamped position from a measurement unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub x: f64,
    pub y: f64,
    pub timestamp: DateTime<Utc>,
}

impl TrackPoint {
    pub fn new(x: f64, y: f64, timestamp: DateTime<Utc>) -> Self {
        Self { x, y, timestamp }
    }
}

/// One contiguous ride of a unit within a single calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySegment {
    pub unit_id: String,
    /// Calendar date (UTC) of the segment's first point.
    pub date: NaiveDate,
    pub points: Vec<TrackPoint>,
}

impl DailySegment {
    /// The segment's polyline.
    pub fn linestring(&self) -> LineString<f64> {
        LineString::new(
            self.points
                .iter()
                .map(|p| Coord { x: p.x, y: p.y })
                .collect(),
        )
    }
}

/// Split a time-ordered trace into daily ride segments.
///
/// A new segment starts whenever the calendar date (UTC) changes between
/// consecutive points or the time between them exceeds `max_gap`; a gap of
/// exactly `max_gap` does not split. Segments need more than two points to
/// survive. Points must already be in ascending time order.
pub fn split_track(unit_id: &str, points: &[TrackPoint], max_gap: Duration) -> Vec<DailySegment> {
    let mut segments = Vec::new();
    let mut current: Vec<TrackPoint> = Vec::new();

    for point in points {
        if let Some(last) = current.last() {
            let day_changed = point.timestamp.date_naive() != last.timestamp.date_naive();
            let gap = point.timestamp.signed_duration_since(last.timestamp);
            if day_changed || gap > max_gap {
                flush(unit_id, &mut current, &mut segments);
            }
        }
        current.push(point.clone());
    }
    flush(unit_id, &mut current, &mut segments);

    log::debug!(
        "[Tracks] Split {} points into {} segments for unit '{}'",
        points.len(),
        segments.len(),
        unit_id
    );
    segments
}

fn flush(unit_id: &str, current: &mut Vec<TrackPoint>, segments: &mut Vec<DailySegment>) {
    if current.len() > 2 {
        let points = std::mem::take(current);
        segments.push(DailySegment {
            unit_id: unit_id.to_string(),
            date: points[0].timestamp.date_naive(),
            points,
        });
    } else {
        current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-06-01T00:00:00Z
    const DAY_START: i64 = 1_717_200_000;

    fn tp(x: f64, secs_after_midnight: i64) -> TrackPoint {
        TrackPoint::new(
            x,
            0.0,
            DateTime::from_timestamp(DAY_START + secs_after_midnight, 0).unwrap(),
        )
    }

    #[test]
    fn test_same_day_points_form_one_segment() {
        let points = vec![tp(0.0, 0), tp(1.0, 60), tp(2.0, 120)];
        let segments = split_track("unit-7", &points, Duration::minutes(5));

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].unit_id, "unit-7");
        assert_eq!(segments[0].date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(segments[0].points.len(), 3);
    }

    #[test]
    fn test_midnight_crossing_short_runs_are_dropped() {
        // Two points before midnight, two after: both fragments are too
        // short to keep.
        let points = vec![
            tp(0.0, 86_280),
            tp(1.0, 86_340),
            tp(2.0, 86_460),
            tp(3.0, 86_520),
        ];
        let segments = split_track("unit-7", &points, Duration::minutes(5));
        assert!(segments.is_empty());
    }

    #[test]
    fn test_midnight_split_keeps_long_halves() {
        let points = vec![
            tp(0.0, 86_160),
            tp(1.0, 86_220),
            tp(2.0, 86_280),
            tp(3.0, 86_460),
            tp(4.0, 86_520),
            tp(5.0, 86_580),
        ];
        let segments = split_track("unit-7", &points, Duration::minutes(5));

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(segments[1].date, NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
    }

    #[test]
    fn test_gap_strictly_above_threshold_splits() {
        // Exactly five minutes: no split.
        let contiguous = vec![tp(0.0, 0), tp(1.0, 300), tp(2.0, 600)];
        assert_eq!(
            split_track("u", &contiguous, Duration::minutes(5)).len(),
            1
        );

        // One second more: split into fragments too short to keep.
        let gapped = vec![tp(0.0, 0), tp(1.0, 301), tp(2.0, 602)];
        assert!(split_track("u", &gapped, Duration::minutes(5)).is_empty());
    }

    #[test]
    fn test_gap_split_keeps_long_runs() {
        let points = vec![
            tp(0.0, 0),
            tp(1.0, 60),
            tp(2.0, 120),
            // 30 minute pause.
            tp(3.0, 1_920),
            tp(4.0, 1_980),
            tp(5.0, 2_040),
        ];
        let segments = split_track("u", &points, Duration::minutes(5));

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].points.len(), 3);
        assert_eq!(segments[1].points.len(), 3);
    }

    #[test]
    fn test_linestring_follows_points() {
        let points = vec![tp(0.0, 0), tp(1.0, 60), tp(2.0, 120)];
        let segments = split_track("u", &points, Duration::minutes(5));
        let line = segments[0].linestring();

        assert_eq!(line.0.len(), 3);
        assert_eq!(line.0[2], Coord { x: 2.0, y: 0.0 });
    }
}

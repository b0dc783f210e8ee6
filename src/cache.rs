//! SQLite-backed cache of snapped observation points.
//!
//! Each sensor gets its own table keyed by point identity. Snapping is
//! pure with respect to the street network, so a cached entry never needs
//! updating: saving merges new records under existing ones, then rewrites
//! the sensor's table in a single transaction. A crash mid-save leaves
//! the previous table contents intact.

use std::collections::HashMap;
use std::path::Path;

use geo::Point;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::Result;
use crate::geo_utils::{parse_point_wkt, point_wkt};

/// One cached snap outcome.
///
/// `edge_index` is `None` for points that could not be matched to any
/// edge; caching those too keeps them from being re-snapped every run.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapRecord {
    pub identity: Uuid,
    pub geometry: Point<f64>,
    pub edge_index: Option<usize>,
}

/// Persistent store of snap results, one table per sensor.
pub struct SnapCache {
    conn: Connection,
}

impl SnapCache {
    /// Open (or create) a cache database at the given path.
    ///
    /// Fails immediately when the file cannot be opened; a run without a
    /// working cache would silently redo all snapping work.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// In-memory cache, mainly for tests.
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    /// Load all cached records for a sensor.
    ///
    /// Rows that fail to parse are skipped rather than reported; the
    /// affected points are simply snapped again on the next run.
    pub fn load(&self, sensor: &str) -> Result<HashMap<Uuid, SnapRecord>> {
        let table = Self::table_name(sensor);
        self.ensure_table(&table)?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT identity, geometry_wkt, edge_index FROM {}",
            table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
            ))
        })?;

        let mut records = HashMap::new();
        for (identity, wkt, edge_index) in rows.filter_map(|r| r.ok()) {
            let identity = match Uuid::parse_str(&identity) {
                Ok(id) => id,
                Err(_) => continue,
            };
            let geometry = match parse_point_wkt(&wkt) {
                Some(p) => p,
                None => continue,
            };
            records.insert(
                identity,
                SnapRecord {
                    identity,
                    geometry,
                    edge_index: edge_index.map(|i| i as usize),
                },
            );
        }

        log::info!(
            "[Cache] Loaded {} snapped points for '{}'",
            records.len(),
            sensor
        );
        Ok(records)
    }

    /// Merge freshly snapped records into the existing set and persist.
    ///
    /// Existing entries win: an identity already in `existing` keeps its
    /// record even if `fresh` carries the same identity. The merged set
    /// replaces the sensor's table atomically and is returned for reuse.
    pub fn merge_and_save(
        &mut self,
        sensor: &str,
        mut existing: HashMap<Uuid, SnapRecord>,
        fresh: Vec<SnapRecord>,
    ) -> Result<HashMap<Uuid, SnapRecord>> {
        for record in fresh {
            existing.entry(record.identity).or_insert(record);
        }
        self.replace(sensor, &existing)?;
        Ok(existing)
    }

    /// Replace the sensor's table contents with the given records.
    ///
    /// Runs delete and inserts in one transaction so readers never see a
    /// half-written table.
    pub fn replace(&mut self, sensor: &str, records: &HashMap<Uuid, SnapRecord>) -> Result<()> {
        let table = Self::table_name(sensor);
        self.ensure_table(&table)?;

        let tx = self.conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", table), [])?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (identity, geometry_wkt, edge_index) VALUES (?1, ?2, ?3)",
                table
            ))?;
            for record in records.values() {
                stmt.execute(params![
                    record.identity.to_string(),
                    point_wkt(&record.geometry),
                    record.edge_index.map(|i| i as i64),
                ])?;
            }
        }
        tx.commit()?;

        log::info!(
            "[Cache] Saved {} snapped points for '{}'",
            records.len(),
            sensor
        );
        Ok(())
    }

    fn ensure_table(&self, table: &str) -> Result<()> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                identity TEXT PRIMARY KEY,
                geometry_wkt TEXT NOT NULL,
                edge_index INTEGER
            )",
            table
        ))?;
        Ok(())
    }

    // Sensor names come from config files, so they cannot be trusted as
    // SQL identifiers verbatim.
    fn table_name(sensor: &str) -> String {
        let safe: String = sensor
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        format!("snap_{}", safe)
    }
}

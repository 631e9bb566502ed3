use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::RecordStore;
use crate::error::{Result, RoadTrackerError};
use crate::types::{ClassifiedSample, PersistedRecord};

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS processed_agent_data (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    road_state  TEXT    NOT NULL CHECK (length(road_state) > 0),
    user_id     INTEGER NOT NULL,
    x           INTEGER NOT NULL,
    y           INTEGER NOT NULL,
    z           INTEGER NOT NULL,
    latitude    REAL    NOT NULL,
    longitude   REAL    NOT NULL,
    timestamp   TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_processed_agent_data_user
    ON processed_agent_data (user_id);
";

const SELECT_COLUMNS: &str =
    "SELECT id, road_state, user_id, x, y, z, latitude, longitude, timestamp FROM processed_agent_data";

/// SQLite-backed record store.
///
/// # Storage
/// - One row per classified sample in `processed_agent_data`
/// - Ids come from `AUTOINCREMENT`: monotonic and never reused
/// - Timestamps stored as RFC 3339 text with nanosecond precision
///
/// Access is serialized through a single connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if current > SCHEMA_VERSION {
            return Err(RoadTrackerError::PersistenceFailure(format!(
                "database schema version {} is newer than supported {}",
                current, SCHEMA_VERSION
            )));
        }
        if current < 1 {
            conn.execute_batch(SCHEMA)?;
            conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
            log::info!("Initialized record store schema v{}", SCHEMA_VERSION);
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            RoadTrackerError::PersistenceFailure("Failed to acquire connection lock".to_string())
        })
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<PersistedRecord> {
    let raw_ts: String = row.get(8)?;
    let timestamp = DateTime::parse_from_rfc3339(&raw_ts)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(PersistedRecord {
        id: row.get(0)?,
        road_state: row.get(1)?,
        user_id: row.get(2)?,
        x: row.get(3)?,
        y: row.get(4)?,
        z: row.get(5)?,
        latitude: row.get(6)?,
        longitude: row.get(7)?,
        timestamp,
    })
}

impl RecordStore for SqliteStore {
    fn commit_batch(&self, samples: &[ClassifiedSample]) -> Result<Vec<PersistedRecord>> {
        let mut conn = self.lock()?;
        // Dropping the transaction on any early return rolls it back
        let tx = conn.transaction()?;
        let mut records = Vec::with_capacity(samples.len());
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO processed_agent_data
                    (road_state, user_id, x, y, z, latitude, longitude, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for sample in samples {
                let data = &sample.agent_data;
                stmt.execute(params![
                    sample.road_state,
                    data.user_id,
                    data.accelerometer.x,
                    data.accelerometer.y,
                    data.accelerometer.z,
                    data.gps.latitude,
                    data.gps.longitude,
                    format_timestamp(&data.timestamp),
                ])?;
                records.push(PersistedRecord::from_sample(tx.last_insert_rowid(), sample));
            }
        }
        tx.commit()?;
        Ok(records)
    }

    fn get_by_id(&self, id: i64) -> Result<Option<PersistedRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn list_all(&self) -> Result<Vec<PersistedRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY id", SELECT_COLUMNS))?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn update_by_id(&self, id: i64, sample: &ClassifiedSample) -> Result<usize> {
        let conn = self.lock()?;
        let data = &sample.agent_data;
        let affected = conn.execute(
            "UPDATE processed_agent_data
                SET road_state = ?1, user_id = ?2, x = ?3, y = ?4, z = ?5,
                    latitude = ?6, longitude = ?7, timestamp = ?8
              WHERE id = ?9",
            params![
                sample.road_state,
                data.user_id,
                data.accelerometer.x,
                data.accelerometer.y,
                data.accelerometer.z,
                data.gps.latitude,
                data.gps.longitude,
                format_timestamp(&data.timestamp),
                id,
            ],
        )?;
        Ok(affected)
    }

    fn delete_by_id(&self, id: i64) -> Result<usize> {
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM processed_agent_data WHERE id = ?1", params![id])?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawAccelSample, RawGpsFix, UnifiedSample};

    fn sample(user_id: u32, road_state: &str) -> ClassifiedSample {
        ClassifiedSample {
            road_state: road_state.to_string(),
            agent_data: UnifiedSample {
                user_id,
                accelerometer: RawAccelSample::new(3, -2, 16),
                gps: RawGpsFix::new(30.523, 50.450),
                timestamp: Utc::now(),
            },
        }
    }

    #[test]
    fn test_commit_assigns_monotonic_ids() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.commit_batch(&[sample(1, "Smooth"), sample(1, "Rough")]).unwrap();
        let second = store.commit_batch(&[sample(2, "Smooth")]).unwrap();

        assert!(first[0].id < first[1].id);
        assert!(first[1].id < second[0].id);
        assert_eq!(store.list_all().unwrap().len(), 3);
    }

    #[test]
    fn test_round_trip_by_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let original = sample(7, "Rough");
        let committed = store.commit_batch(&[original.clone()]).unwrap();

        let fetched = store.get_by_id(committed[0].id).unwrap().unwrap();
        assert_eq!(fetched, committed[0]);
        assert_eq!(fetched.to_sample(), original);
    }

    #[test]
    fn test_failed_row_rolls_back_batch() {
        let store = SqliteStore::open_in_memory().unwrap();
        // Empty road_state violates the CHECK constraint
        let batch = vec![sample(1, "Smooth"), sample(1, ""), sample(1, "Rough")];

        let err = store.commit_batch(&batch).unwrap_err();
        assert!(matches!(err, RoadTrackerError::PersistenceFailure(_)));
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_update_and_delete_counts() {
        let store = SqliteStore::open_in_memory().unwrap();
        let committed = store.commit_batch(&[sample(1, "Smooth")]).unwrap();
        let id = committed[0].id;

        assert_eq!(store.update_by_id(id, &sample(1, "Rough")).unwrap(), 1);
        assert_eq!(store.get_by_id(id).unwrap().unwrap().road_state, "Rough");
        assert_eq!(store.update_by_id(id + 100, &sample(1, "Rough")).unwrap(), 0);

        assert_eq!(store.delete_by_id(id).unwrap(), 1);
        assert_eq!(store.delete_by_id(id).unwrap(), 0);
        assert!(store.get_by_id(id).unwrap().is_none());
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.commit_batch(&[sample(1, "Smooth")]).unwrap();
        store.delete_by_id(first[0].id).unwrap();

        let second = store.commit_batch(&[sample(1, "Smooth")]).unwrap();
        assert!(second[0].id > first[0].id);
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.commit_batch(&[sample(4, "Smooth")]).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_all().unwrap().len(), 1);
    }
}

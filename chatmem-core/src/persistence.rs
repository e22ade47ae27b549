//! SQLite persistence layer for the chatmem memory engine.
//!
//! Each subject's memories are stored as one JSON snapshot: the ordered list
//! of `(id, record)` pairs, written whole on every mutation. A second table
//! holds the per-subject "onboarding extraction already ran" flag.
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS memory_snapshots (
//!     subject_id TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! CREATE TABLE IF NOT EXISTS onboarding_flags (
//!     subject_id TEXT PRIMARY KEY,
//!     extracted  INTEGER NOT NULL,
//!     updated_at TEXT NOT NULL
//! );
//! ```
//!
//! - WAL mode for concurrent reads.
//! - JSON inside a BLOB keeps the schema stable as the record evolves.
//! - Optional CRC-32 checksum detects snapshot corruption.
//! - One connection per engine, shared by every subject behind a mutex.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{ChatmemError, Result};
use crate::memory::MemoryRecord;
use crate::types::{MemoryId, SubjectId};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS memory_snapshots (
        subject_id TEXT PRIMARY KEY,
        data       BLOB NOT NULL,
        updated_at TEXT NOT NULL,
        checksum   TEXT
    );
    CREATE TABLE IF NOT EXISTS onboarding_flags (
        subject_id TEXT PRIMARY KEY,
        extracted  INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    );";

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 of `data` as a lowercase hex string.
fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// Basic CRC-32 (ISO 3309 / ITU-T V.42) computation.
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// Snapshot codec
// ---------------------------------------------------------------------------

/// Encode records as the JSON list of `(id, record)` pairs.
///
/// # Errors
///
/// Returns [`ChatmemError::Serialization`] if JSON encoding fails.
pub fn encode_snapshot(records: &[MemoryRecord]) -> Result<Vec<u8>> {
    let pairs: Vec<(MemoryId, &MemoryRecord)> = records.iter().map(|r| (r.id, r)).collect();
    serde_json::to_vec(&pairs).map_err(|e| ChatmemError::Serialization(e.to_string()))
}

/// Decode a snapshot produced by [`encode_snapshot`], preserving order.
///
/// Out-of-range importances are clamped and bad decay rates recomputed;
/// records with blank content or a non-finite importance are dropped.
///
/// # Errors
///
/// Returns [`ChatmemError::Serialization`] if the bytes are not a valid snapshot.
pub fn decode_snapshot(data: &[u8]) -> Result<Vec<MemoryRecord>> {
    let pairs: Vec<(MemoryId, MemoryRecord)> =
        serde_json::from_slice(data).map_err(|e| ChatmemError::Serialization(e.to_string()))?;

    Ok(pairs
        .into_iter()
        .filter_map(|(id, mut record)| {
            if record.id != id {
                warn!(key = %id, record = %record.id, "Snapshot key disagrees with record id, using key");
                record.id = id;
            }
            let sanitized = record.sanitized();
            if sanitized.is_none() {
                warn!(id = %id, "Dropping invalid record from snapshot");
            }
            sanitized
        })
        .collect())
}

// ---------------------------------------------------------------------------
// PersistenceEngine
// ---------------------------------------------------------------------------

/// Handle to an open SQLite database that stores memory snapshots.
///
/// # Usage
///
/// ```no_run
/// # use chatmem_core::persistence::PersistenceEngine;
/// # use chatmem_core::config::PersistenceConfig;
/// # use chatmem_core::types::SubjectId;
/// let engine = PersistenceEngine::open("chatmem.db", &PersistenceConfig::default())?;
/// let subject = SubjectId::new("character-42");
/// engine.save_snapshot(&subject, &[])?;
/// let loaded = engine.load_snapshot(&subject)?;
/// # Ok::<(), chatmem_core::error::ChatmemError>(())
/// ```
pub struct PersistenceEngine {
    conn: Mutex<Connection>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for PersistenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceEngine")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PersistenceEngine {
    /// Open (or create) an SQLite database at `path`.
    ///
    /// The schema is automatically created if it does not exist.
    /// WAL mode is enabled when `config.wal_mode` is `true`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatmemError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "chatmem persistence engine opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`ChatmemError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Save (upsert) a subject's full snapshot, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ChatmemError::Serialization`] if JSON encoding fails, or
    /// [`ChatmemError::Database`] on SQLite failures.
    pub fn save_snapshot(&self, subject: &SubjectId, records: &[MemoryRecord]) -> Result<()> {
        let start = Instant::now();
        let json = encode_snapshot(records)?;

        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
        let now = Utc::now().to_rfc3339();

        self.conn.lock().execute(
            "INSERT INTO memory_snapshots (subject_id, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(subject_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![subject.as_str(), json, now, checksum],
        )?;

        debug!(
            subject = %subject,
            memories = records.len(),
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved memory snapshot"
        );

        Ok(())
    }

    /// Load a subject's snapshot.
    ///
    /// Returns `None` if nothing was ever saved for the subject. A checksum
    /// mismatch is logged but the data is still decoded.
    ///
    /// # Errors
    ///
    /// Returns [`ChatmemError::Serialization`] if the snapshot is malformed, or
    /// [`ChatmemError::Database`] on SQLite failures.
    pub fn load_snapshot(&self, subject: &SubjectId) -> Result<Option<Vec<MemoryRecord>>> {
        let start = Instant::now();

        let row: Option<(Vec<u8>, Option<String>)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(
                "SELECT data, checksum FROM memory_snapshots WHERE subject_id = ?1",
            )?;
            let row = stmt
                .query_row(params![subject.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?;
            row
        };

        let Some((data, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(
                        subject = %subject,
                        expected = %expected,
                        actual = %actual,
                        "Checksum mismatch — possible snapshot corruption"
                    );
                }
            }
        }

        let records = decode_snapshot(&data)?;

        debug!(
            subject = %subject,
            memories = records.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded memory snapshot"
        );

        Ok(Some(records))
    }

    /// Delete a subject's snapshot and onboarding flag.
    ///
    /// Returns `true` if a snapshot row was actually deleted.
    ///
    /// # Errors
    ///
    /// Returns [`ChatmemError::Database`] on SQLite failures.
    pub fn delete_snapshot(&self, subject: &SubjectId) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM memory_snapshots WHERE subject_id = ?1",
            params![subject.as_str()],
        )?;
        conn.execute(
            "DELETE FROM onboarding_flags WHERE subject_id = ?1",
            params![subject.as_str()],
        )?;
        Ok(deleted > 0)
    }

    /// List every subject that has a saved snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ChatmemError::Database`] on SQLite failures.
    pub fn list_subjects(&self) -> Result<Vec<SubjectId>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT subject_id FROM memory_snapshots ORDER BY subject_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut subjects = Vec::new();
        for row in rows {
            subjects.push(SubjectId(row?));
        }
        Ok(subjects)
    }

    // ------------------------------------------------------------------
    // Onboarding flag
    // ------------------------------------------------------------------

    /// Whether onboarding extraction already ran for `subject`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatmemError::Database`] on SQLite failures.
    pub fn load_onboarding_flag(&self, subject: &SubjectId) -> Result<bool> {
        let conn = self.conn.lock();
        let flag: Option<bool> = conn
            .query_row(
                "SELECT extracted FROM onboarding_flags WHERE subject_id = ?1",
                params![subject.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(flag.unwrap_or(false))
    }

    /// Record whether onboarding extraction ran for `subject`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatmemError::Database`] on SQLite failures.
    pub fn save_onboarding_flag(&self, subject: &SubjectId, extracted: bool) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.lock().execute(
            "INSERT INTO onboarding_flags (subject_id, extracted, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(subject_id) DO UPDATE SET
                extracted = excluded.extracted,
                updated_at = excluded.updated_at",
            params![subject.as_str(), extracted, now],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Utility
    // ------------------------------------------------------------------

    /// Return the path to the database file (or `:memory:` for in-memory DBs).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Overwrite a subject's snapshot bytes verbatim, bypassing encoding.
    #[cfg(test)]
    pub(crate) fn write_raw_snapshot(&self, subject: &SubjectId, data: &[u8]) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO memory_snapshots (subject_id, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, NULL)",
            params![subject.as_str(), data, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKind;
    use crate::types::Timestamp;

    fn test_config() -> PersistenceConfig {
        PersistenceConfig {
            checksum_enabled: true,
            ..PersistenceConfig::default()
        }
    }

    fn sample_records() -> Vec<MemoryRecord> {
        let t0 = Timestamp::from_millis(1_700_000_000_123);
        let mut tea = MemoryRecord::new(MemoryKind::Preference, "likes jasmine tea", 6.3, ["drink"], t0)
            .expect("valid");
        tea.record_access(t0.plus_days(0.7));
        let job = MemoryRecord::new(
            MemoryKind::Fact,
            "works night shifts at the hospital",
            8.0,
            ["work", "schedule"],
            t0.plus_days(1.0 / 3.0),
        )
        .expect("valid");
        vec![tea, job]
    }

    #[test]
    fn round_trip_save_load() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        let subject = SubjectId::new("alice");
        let records = sample_records();

        engine.save_snapshot(&subject, &records).expect("save");
        let loaded = engine.load_snapshot(&subject).expect("load").expect("Some");

        assert_eq!(loaded, records);
    }

    #[test]
    fn load_nonexistent_returns_none() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        let result = engine.load_snapshot(&SubjectId::new("nobody")).expect("load");
        assert!(result.is_none());
    }

    #[test]
    fn upsert_overwrites_whole_snapshot() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        let subject = SubjectId::new("bob");
        let records = sample_records();

        engine.save_snapshot(&subject, &records).expect("save1");
        engine.save_snapshot(&subject, &records[..1]).expect("save2");

        let loaded = engine.load_snapshot(&subject).expect("load").expect("Some");
        assert_eq!(loaded.len(), 1, "Should reflect the second save");
    }

    #[test]
    fn snapshot_is_list_of_id_record_pairs() {
        let records = sample_records();
        let bytes = encode_snapshot(&records).expect("encode");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        let first = &value[0];
        assert_eq!(first[0], serde_json::json!(records[0].id.0.to_string()));
        assert_eq!(first[1]["content"], "likes jasmine tea");
    }

    #[test]
    fn edited_snapshot_is_brought_back_in_bounds() {
        let records = sample_records();
        let bytes = encode_snapshot(&records).expect("encode");
        let mut value: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        value[0][1]["importance"] = serde_json::json!(42.0);
        value[0][1]["decay_rate"] = serde_json::json!(-1.0);
        value[1][1]["importance"] = serde_json::json!(-3.0);
        let mut blank = value[1].clone();
        blank[0] = serde_json::json!(crate::types::MemoryId::new().0.to_string());
        blank[1]["content"] = serde_json::json!("   ");
        value.as_array_mut().expect("array").push(blank);

        let decoded = decode_snapshot(&serde_json::to_vec(&value).expect("encode")).expect("decode");
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].importance, 10.0);
        assert!((decoded[0].decay_rate - crate::decay::decay_rate(MemoryKind::Preference, 10.0)).abs() < 1e-12);
        assert_eq!(decoded[1].importance, 1.0);
        assert_eq!(decoded[1].decay_rate, records[1].decay_rate);
    }

    #[test]
    fn malformed_snapshot_is_serialization_error() {
        let err = decode_snapshot(b"{not json").unwrap_err();
        assert!(matches!(err, ChatmemError::Serialization(_)));
    }

    #[test]
    fn delete_and_list_subjects() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        for name in ["c", "a", "b"] {
            engine.save_snapshot(&SubjectId::new(name), &[]).expect("save");
        }
        let listed: Vec<_> = engine
            .list_subjects()
            .expect("list")
            .into_iter()
            .map(|s| s.0)
            .collect();
        assert_eq!(listed, vec!["a", "b", "c"]);

        assert!(engine.delete_snapshot(&SubjectId::new("a")).expect("delete"));
        assert!(!engine.delete_snapshot(&SubjectId::new("a")).expect("delete again"));
        assert_eq!(engine.list_subjects().expect("list").len(), 2);
    }

    #[test]
    fn onboarding_flag_round_trip() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        let subject = SubjectId::new("carol");
        assert!(!engine.load_onboarding_flag(&subject).expect("load"));
        engine.save_onboarding_flag(&subject, true).expect("save");
        assert!(engine.load_onboarding_flag(&subject).expect("load"));
    }

    #[test]
    fn checksum_mismatch_still_loads() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        let subject = SubjectId::new("dave");
        engine.save_snapshot(&subject, &sample_records()).expect("save");

        engine
            .conn
            .lock()
            .execute(
                "UPDATE memory_snapshots SET checksum = 'deadbeef' WHERE subject_id = ?1",
                params![subject.as_str()],
            )
            .expect("corrupt checksum");

        let loaded = engine.load_snapshot(&subject).expect("load").expect("Some");
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn file_based_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("chatmem_test.db");
        let subject = SubjectId::new("erin");
        let records = sample_records();

        {
            let engine = PersistenceEngine::open(&db_path, &test_config()).expect("open");
            engine.save_snapshot(&subject, &records).expect("save");
            engine.save_onboarding_flag(&subject, true).expect("flag");
        }

        let reopened = PersistenceEngine::open(&db_path, &test_config()).expect("reopen");
        assert_eq!(reopened.load_snapshot(&subject).expect("load"), Some(records));
        assert!(reopened.load_onboarding_flag(&subject).expect("flag"));
    }

    #[test]
    fn crc32_basic() {
        // Known test vector: CRC-32 of "123456789" = 0xCBF43926
        assert_eq!(crc32_compute(b"123456789"), 0xCBF4_3926);
    }
}

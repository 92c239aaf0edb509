use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use super::{Committed, DatasetRecord, EvictedRecord, NewRecord, RecordRepo};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS datasets (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    raw_reference TEXT NOT NULL,
    uploaded_at   TEXT NOT NULL,
    summary       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_datasets_uploaded_at ON datasets (uploaded_at);
";

const SELECT_COLUMNS: &str = "SELECT id, name, raw_reference, uploaded_at, summary FROM datasets";

/// [`RecordRepo`] backed by a single SQLite file.
///
/// Timestamps are stored as fixed-width RFC 3339 UTC text so that string
/// order equals time order. The summary is stored as JSON.
pub struct SqliteRepo {
    conn: Mutex<Connection>,
}

/// Raw column values before timestamp and JSON decoding.
struct RawRow {
    id: i64,
    name: String,
    raw_reference: String,
    uploaded_at: String,
    summary: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            raw_reference: row.get(2)?,
            uploaded_at: row.get(3)?,
            summary: row.get(4)?,
        })
    }

    fn decode(self) -> Result<DatasetRecord> {
        let uploaded_at = DateTime::parse_from_rfc3339(&self.uploaded_at)
            .with_context(|| format!("dataset {} has a bad timestamp", self.id))?
            .with_timezone(&Utc);
        let summary = serde_json::from_str(&self.summary)
            .with_context(|| format!("dataset {} has a bad summary", self.id))?;

        Ok(DatasetRecord {
            id: self.id,
            name: self.name,
            raw_reference: self.raw_reference,
            uploaded_at,
            summary,
        })
    }
}

fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SqliteRepo {
    /// Opens (creating if needed) the database at `path` and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        info!(path = %path.display(), "Opened dataset database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)
            .context("failed to apply dataset schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("sqlite connection mutex poisoned"))
    }
}

impl RecordRepo for SqliteRepo {
    fn insert(&self, record: NewRecord, retention: usize) -> Result<Committed> {
        let summary = serde_json::to_string(&record.summary)?;
        let uploaded_at = record.uploaded_at.trunc_subsecs(6);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO datasets (name, raw_reference, uploaded_at, summary) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.name,
                record.raw_reference,
                encode_timestamp(&uploaded_at),
                summary
            ],
        )
        .context("failed to insert dataset")?;
        let id = tx.last_insert_rowid();

        let evicted = {
            let mut stmt = tx.prepare(
                "SELECT id, raw_reference FROM datasets \
                 ORDER BY uploaded_at DESC, id DESC LIMIT -1 OFFSET ?1",
            )?;
            let rows = stmt.query_map(params![retention as i64], |row| {
                Ok(EvictedRecord {
                    id: row.get(0)?,
                    raw_reference: row.get(1)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        for old in &evicted {
            tx.execute("DELETE FROM datasets WHERE id = ?1", params![old.id])
                .with_context(|| format!("failed to evict dataset {}", old.id))?;
        }

        // Dropping `tx` on any error above rolls back the insert as well.
        tx.commit().context("failed to commit dataset insert")?;

        Ok(Committed {
            record: DatasetRecord {
                id,
                name: record.name,
                raw_reference: record.raw_reference,
                uploaded_at,
                summary: record.summary,
            },
            evicted,
        })
    }

    fn get(&self, id: i64) -> Result<Option<DatasetRecord>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::decode).transpose()
    }

    fn list_desc(&self, limit: Option<usize>) -> Result<Vec<DatasetRecord>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} ORDER BY uploaded_at DESC, id DESC LIMIT ?1"
        ))?;

        let rows = stmt.query_map(params![limit], RawRow::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.decode()?);
        }
        Ok(records)
    }
}

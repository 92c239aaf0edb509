//! Dataset records and the retention-bounded store that owns them.
//!
//! [`RecordRepo`] is the metadata persistence seam ([`MemoryRepo`], [`SqliteRepo`]).
//! A repo insert also removes every record beyond the newest `retention` by
//! `uploaded_at`, atomically: either both happen or neither does.
//! [`DatasetStore`] serializes inserts and cleans up the raw files of evicted
//! records once the metadata change is committed.

mod memory;
mod sqlite;

pub use memory::MemoryRepo;
pub use sqlite::SqliteRepo;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::blob::BlobStore;
use crate::stats::DatasetSummary;

/// Number of records kept after every insert unless configured otherwise.
pub const DEFAULT_RETENTION: usize = 5;

/// One persisted upload with its derived summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: i64,
    pub name: String,
    pub raw_reference: String,
    pub uploaded_at: DateTime<Utc>,
    pub summary: DatasetSummary,
}

/// A record that has not been assigned an id yet.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub name: String,
    pub raw_reference: String,
    pub uploaded_at: DateTime<Utc>,
    pub summary: DatasetSummary,
}

/// A record removed from metadata by the retention rule.
#[derive(Debug, Clone, PartialEq)]
pub struct EvictedRecord {
    pub id: i64,
    pub raw_reference: String,
}

/// Outcome of a committed insert.
#[derive(Debug, Clone)]
pub struct Committed {
    pub record: DatasetRecord,
    pub evicted: Vec<EvictedRecord>,
}

/// Metadata persistence for dataset records.
///
/// Implementations are synchronous; [`DatasetStore`] calls them from the
/// blocking thread pool.
pub trait RecordRepo: Send + Sync {
    /// Persists `record`, then removes everything beyond the newest
    /// `retention` records in [`list_desc`](Self::list_desc) order.
    ///
    /// Both steps commit together. On error neither the new record nor any
    /// removal is visible.
    fn insert(&self, record: NewRecord, retention: usize) -> Result<Committed>;

    fn get(&self, id: i64) -> Result<Option<DatasetRecord>>;

    /// Records ordered by `uploaded_at` descending, ties broken by id descending.
    fn list_desc(&self, limit: Option<usize>) -> Result<Vec<DatasetRecord>>;
}

/// Source of upload timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct DatasetStore {
    repo: Arc<dyn RecordRepo>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    retention: usize,
    write_lock: Mutex<()>,
}

impl DatasetStore {
    pub fn new(repo: Arc<dyn RecordRepo>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            repo,
            blobs,
            clock: Arc::new(SystemClock),
            retention: DEFAULT_RETENTION,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the retention window. Values below 1 are raised to 1.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    async fn with_repo<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn RecordRepo) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || f(repo.as_ref()))
            .await
            .context("record repository task failed")?
    }

    /// Persists a new record stamped with the current time and evicts every
    /// record beyond the retention window in the same repo commit.
    ///
    /// Inserts are serialized by a lock. Raw files of evicted records are
    /// deleted after the commit.
    ///
    /// # Errors
    ///
    /// Fails only when nothing was committed: the new record is not stored and
    /// no record was evicted. Raw-file cleanup failures are only logged.
    #[tracing::instrument(skip(self, summary), fields(retention = self.retention))]
    pub async fn insert(
        &self,
        name: &str,
        raw_reference: &str,
        summary: DatasetSummary,
    ) -> Result<DatasetRecord> {
        let _guard = self.write_lock.lock().await;

        // Stored timestamps carry microseconds; keep the returned value identical.
        let new = NewRecord {
            name: name.to_string(),
            raw_reference: raw_reference.to_string(),
            uploaded_at: self.clock.now().trunc_subsecs(6),
            summary,
        };
        let retention = self.retention;
        let committed = self
            .with_repo(move |repo| repo.insert(new, retention))
            .await?;
        info!(
            id = committed.record.id,
            uploaded_at = %committed.record.uploaded_at,
            "Dataset stored"
        );

        self.remove_evicted_files(&committed.evicted).await;
        Ok(committed.record)
    }

    async fn remove_evicted_files(&self, evicted: &[EvictedRecord]) {
        for old in evicted {
            if let Err(e) = self.blobs.delete(&old.raw_reference).await {
                // Orphaned file; the record itself is already gone.
                warn!(
                    id = old.id,
                    reference = %old.raw_reference,
                    error = %format!("{e:#}"),
                    "Failed to delete raw file of evicted dataset"
                );
            }
        }

        if !evicted.is_empty() {
            info!(
                evicted = evicted.len(),
                retention = self.retention,
                "Evicted datasets beyond retention window"
            );
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<DatasetRecord>> {
        self.with_repo(move |repo| repo.get(id)).await
    }

    /// Most recent record by `uploaded_at`, or `None` when the store is empty.
    pub async fn get_latest(&self) -> Result<Option<DatasetRecord>> {
        let mut latest = self.with_repo(|repo| repo.list_desc(Some(1))).await?;
        Ok(latest.pop())
    }

    /// Up to `limit` records, most recent first.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<DatasetRecord>> {
        self.with_repo(move |repo| repo.list_desc(Some(limit))).await
    }
}

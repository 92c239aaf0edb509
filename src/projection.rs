//! Read-only view of a record exposed across the HTTP boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blob::BlobStore;
use crate::stats::DatasetSummary;
use crate::store::DatasetRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetView {
    pub id: i64,
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
    pub summary: DatasetSummary,
    pub file_url: String,
}

impl DatasetView {
    pub fn from_record(record: DatasetRecord, blobs: &dyn BlobStore) -> Self {
        let file_url = blobs.url(&record.raw_reference);
        Self {
            id: record.id,
            name: record.name,
            uploaded_at: record.uploaded_at,
            summary: record.summary,
            file_url,
        }
    }

    /// One-line listing used by the `history` command.
    pub fn history_line(&self) -> String {
        format!("{} — {} — {}", self.id, self.name, self.uploaded_at.to_rfc3339())
    }
}

//! Storage for the raw uploaded files.
//!
//! The summary pipeline never reads these files back; it only keeps the opaque
//! reference returned by [`BlobStore::put`] so the file can be linked from the
//! record projection and deleted when the record is evicted.

mod local;
mod memory;
mod s3;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

use anyhow::Result;
use bytes::Bytes;
use uuid::Uuid;

#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` and returns the reference to persist with the record.
    async fn put(&self, file_name: &str, bytes: Bytes) -> Result<String>;

    /// Removes the file behind `reference`.
    async fn delete(&self, reference: &str) -> Result<()>;

    /// Location a client can fetch the raw file from.
    fn url(&self, reference: &str) -> String;
}

/// Builds a collision-free key under `uploads/` that keeps the uploaded file name readable.
pub fn upload_key(file_name: &str) -> String {
    format!("uploads/{}_{}", Uuid::new_v4().simple(), sanitize_file_name(file_name))
}

/// Strips any directory part and replaces characters outside `[A-Za-z0-9._-]`.
fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "dataset.csv".to_string()
    } else {
        cleaned
    }
}

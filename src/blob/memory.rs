use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow, bail};
use bytes::Bytes;

use super::{BlobStore, upload_key};

/// Process-local blob store. Deletions can be made to fail to exercise the
/// best-effort cleanup path during eviction.
#[derive(Default)]
pub struct MemoryBlobStore {
    files: Mutex<HashMap<String, Bytes>>,
    fail_deletes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.files
            .lock()
            .map(|files| files.contains_key(reference))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|files| files.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, file_name: &str, bytes: Bytes) -> Result<String> {
        let reference = upload_key(file_name);
        self.files
            .lock()
            .map_err(|_| anyhow!("blob map poisoned"))?
            .insert(reference.clone(), bytes);
        Ok(reference)
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            bail!("simulated delete failure for '{reference}'");
        }
        self.files
            .lock()
            .map_err(|_| anyhow!("blob map poisoned"))?
            .remove(reference)
            .map(|_| ())
            .ok_or_else(|| anyhow!("no blob stored under '{reference}'"))
    }

    fn url(&self, reference: &str) -> String {
        format!("memory://{reference}")
    }
}

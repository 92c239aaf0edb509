//! Upload pipeline: parse, validate, summarize, store the raw file, insert and evict.

use bytes::Bytes;
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::parser::parse_table;
use crate::schema::Schema;
use crate::stats::DatasetSummary;
use crate::store::{DatasetRecord, DatasetStore};

const DEFAULT_NAME: &str = "dataset.csv";

/// An uploaded file as received from the caller.
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name supplied with the payload, if any.
    pub file_name: Option<String>,
    /// Explicit display label, if any.
    pub display_name: Option<String>,
    pub bytes: Bytes,
}

impl Upload {
    /// Explicit label if non-empty, else the file name, else `dataset.csv`.
    pub fn resolved_name(&self) -> String {
        [self.display_name.as_deref(), self.file_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|n| !n.is_empty())
            .unwrap_or(DEFAULT_NAME)
            .to_string()
    }
}

/// Runs one upload through the whole pipeline and returns the stored record.
///
/// Nothing is written when parsing or validation fails. If the record is not
/// committed after the raw file was stored, the raw file is removed again on
/// a best-effort basis.
#[tracing::instrument(skip(store, schema, upload), fields(bytes = upload.bytes.len()))]
pub async fn ingest(
    store: &DatasetStore,
    schema: &Schema,
    upload: Upload,
) -> Result<DatasetRecord, ServiceError> {
    let name = upload.resolved_name();

    let table = parse_table(&upload.bytes)?;
    schema.validate(&table)?;
    let summary = DatasetSummary::from_table(&table, schema);

    let file_name = upload.file_name.as_deref().unwrap_or(&name);
    let reference = store.blobs().put(file_name, upload.bytes).await?;

    match store.insert(&name, &reference, summary).await {
        Ok(record) => {
            info!(
                id = record.id,
                name = %record.name,
                total_count = record.summary.total_count,
                "Upload summarized"
            );
            Ok(record)
        }
        Err(e) => {
            if let Err(cleanup) = store.blobs().delete(&reference).await {
                warn!(
                    reference = %reference,
                    error = %format!("{cleanup:#}"),
                    "Failed to remove raw file after insert failure"
                );
            }
            Err(ServiceError::Storage(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::error::InputError;
    use crate::store::MemoryRepo;
    use std::sync::Arc;

    fn upload(csv: &'static str) -> Upload {
        Upload {
            file_name: Some("readings.csv".into()),
            display_name: None,
            bytes: Bytes::from_static(csv.as_bytes()),
        }
    }

    fn store() -> (DatasetStore, Arc<MemoryBlobStore>) {
        let blobs = Arc::new(MemoryBlobStore::new());
        (DatasetStore::new(Arc::new(MemoryRepo::new()), blobs.clone()), blobs)
    }

    #[test]
    fn test_resolved_name_precedence() {
        let mut u = upload("");
        assert_eq!(u.resolved_name(), "readings.csv");
        u.display_name = Some("Line 3".into());
        assert_eq!(u.resolved_name(), "Line 3");
        u.display_name = Some("  ".into());
        u.file_name = None;
        assert_eq!(u.resolved_name(), "dataset.csv");
    }

    #[tokio::test]
    async fn test_ingest_stores_record_and_file() {
        let (store, blobs) = store();
        let record = ingest(
            &store,
            &Schema::EQUIPMENT,
            upload("Type,Flowrate,Pressure,Temperature\nPump,1,2,3\nValve,3,4,5\n"),
        )
        .await
        .unwrap();

        assert_eq!(record.name, "readings.csv");
        assert_eq!(record.summary.total_count, 2);
        assert_eq!(record.summary.averages["Flowrate"], Some(2.0));
        assert!(blobs.contains(&record.raw_reference));
    }

    #[tokio::test]
    async fn test_missing_column_stores_nothing() {
        let (store, blobs) = store();
        let err = ingest(&store, &Schema::EQUIPMENT, upload("Type,Flowrate,Temperature\n"))
            .await
            .unwrap_err();

        match err {
            ServiceError::Input(InputError::MissingColumn(col)) => assert_eq!(col, "Pressure"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(blobs.is_empty());
        assert!(store.get_latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parse_error_is_input_error() {
        let (store, _) = store();
        let err = ingest(&store, &Schema::EQUIPMENT, upload(""))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Input(InputError::Parse(_))));
    }

    #[tokio::test]
    async fn test_failed_eviction_removes_only_the_new_file() {
        let repo = Arc::new(MemoryRepo::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = DatasetStore::new(repo.clone(), blobs.clone());
        let csv = "Type,Flowrate,Pressure,Temperature\nPump,1,2,3\n";

        for i in 0..5 {
            let mut u = upload(csv);
            u.display_name = Some(format!("{i}.csv"));
            ingest(&store, &Schema::EQUIPMENT, u).await.unwrap();
        }

        repo.set_fail_evictions(true);
        let mut u = upload(csv);
        u.display_name = Some("5.csv".into());
        let err = ingest(&store, &Schema::EQUIPMENT, u).await.unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)));

        let remaining = store.list_recent(100).await.unwrap();
        assert_eq!(remaining.len(), 5);
        assert_eq!(store.get_latest().await.unwrap().unwrap().name, "4.csv");
        assert_eq!(blobs.len(), 5);
        for r in &remaining {
            assert!(blobs.contains(&r.raw_reference));
        }
    }
}

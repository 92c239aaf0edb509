use std::io::Write;

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::debug;

use super::{BlobStore, upload_key};

/// Keeps raw files in an S3 bucket, optionally gzip-compressed.
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    gzip: bool,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>, gzip: bool) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            gzip,
        }
    }

    /// Creates a store using the ambient AWS configuration (env vars, instance profile, etc.).
    pub async fn from_env(bucket: impl Into<String>, gzip: bool) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket, gzip)
    }
}

fn gzip_bytes(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

#[async_trait::async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, file_name: &str, bytes: Bytes) -> Result<String> {
        let request = self.client.put_object().bucket(&self.bucket);

        let (key, request) = if self.gzip {
            let compressed = gzip_bytes(&bytes)?;
            let key = format!("{}.gz", upload_key(file_name));
            let request = request
                .key(&key)
                .content_encoding("gzip")
                .body(ByteStream::from(compressed));
            (key, request)
        } else {
            let key = upload_key(file_name);
            let request = request.key(&key).body(ByteStream::from(bytes));
            (key, request)
        };

        request
            .content_type("text/csv")
            .send()
            .await
            .with_context(|| format!("S3 PutObject failed for '{key}'"))?;

        debug!(bucket = %self.bucket, key = %key, gzip = self.gzip, "Stored raw upload in S3");
        Ok(key)
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(reference)
            .send()
            .await
            .with_context(|| format!("S3 DeleteObject failed for '{reference}'"))?;
        Ok(())
    }

    fn url(&self, reference: &str) -> String {
        format!("s3://{}/{}", self.bucket, reference)
    }
}

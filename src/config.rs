//! Command-line and environment configuration.
//!
//! Every flag can also be set through the environment variable named next to
//! it; `main` loads a `.env` file first.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;
use tracing::info;

use crate::blob::{BlobStore, LocalBlobStore, S3BlobStore};
use crate::server::auth::StaticCredentials;
use crate::store::{DEFAULT_RETENTION, DatasetStore, MemoryRepo, RecordRepo, SqliteRepo};

/// Database path that selects the non-persistent repository.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long = "bind", env = "BIND_ADDR", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// SQLite database file for dataset records (":memory:" keeps them in process)
    #[arg(long = "database", env = "DATABASE_PATH", default_value = "data/equipment.db")]
    pub database: String,

    /// Directory for raw uploads when no S3 bucket is configured
    #[arg(long, env = "MEDIA_DIR", default_value = "media")]
    pub media_dir: PathBuf,

    /// Optional: S3 bucket to store raw uploads in instead of the media directory
    #[arg(long, env = "S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Gzip raw uploads stored in S3
    #[arg(long, default_value_t = false)]
    pub gzip: bool,

    /// Username callers must present with HTTP Basic auth
    #[arg(long, env = "API_USERNAME")]
    pub username: String,

    /// Password callers must present with HTTP Basic auth
    #[arg(long, env = "API_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Number of most recent uploads to keep
    #[arg(long, env = "RETENTION", default_value_t = DEFAULT_RETENTION)]
    pub retention: usize,

    /// Maximum upload request size in megabytes
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 25)]
    pub max_upload_mb: usize,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retention == 0 {
            bail!("retention must be at least 1");
        }
        if self.username.is_empty() || self.password.is_empty() {
            bail!("API_USERNAME and API_PASSWORD must both be non-empty");
        }
        if self.max_upload_mb == 0 {
            bail!("max upload size must be at least 1 MB");
        }
        Ok(())
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    pub fn credentials(&self) -> StaticCredentials {
        StaticCredentials::new(&self.username, &self.password)
    }

    /// Media directory to serve at `/media`, when raw files are kept locally.
    pub fn served_media_dir(&self) -> Option<PathBuf> {
        self.s3_bucket.is_none().then(|| self.media_dir.clone())
    }

    /// Builds the record repository and blob store this configuration selects.
    pub async fn build_store(&self) -> Result<DatasetStore> {
        let repo: Arc<dyn RecordRepo> = if self.database == IN_MEMORY_DATABASE {
            info!("Using in-memory dataset repository");
            Arc::new(MemoryRepo::new())
        } else {
            Arc::new(SqliteRepo::open(&self.database)?)
        };

        let blobs: Arc<dyn BlobStore> = match &self.s3_bucket {
            Some(bucket) => {
                info!(bucket = %bucket, gzip = self.gzip, "Raw uploads go to S3");
                Arc::new(S3BlobStore::from_env(bucket.clone(), self.gzip).await)
            }
            None => {
                info!(dir = %self.media_dir.display(), "Raw uploads go to the media directory");
                Arc::new(LocalBlobStore::new(&self.media_dir))
            }
        };

        Ok(DatasetStore::new(repo, blobs).with_retention(self.retention))
    }
}

#[derive(Debug, Clone, Args)]
pub struct ClientConfig {
    /// Base URL of the summary API
    #[arg(long, env = "API_BASE", default_value = "http://127.0.0.1:8000/api/", global = true)]
    pub api_base: String,

    /// Username for HTTP Basic auth
    #[arg(long = "user", env = "VIS_USER", global = true)]
    pub user: Option<String>,

    /// Password for HTTP Basic auth
    #[arg(long = "pass", env = "VIS_PASS", hide_env_values = true, global = true)]
    pub pass: Option<String>,
}

impl ClientConfig {
    /// Returns the configured credentials, failing before any request is made if either is missing.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        match (self.user.as_deref(), self.pass.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Ok((u, p)),
            _ => bail!("set --user/--pass (or VIS_USER/VIS_PASS) before calling the API"),
        }
    }
}

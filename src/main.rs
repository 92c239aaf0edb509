//! CLI entry point for the equipment summary service.
//!
//! `serve` runs the HTTP API; the remaining subcommands are a client for it
//! (upload, summary, history, report download) plus a local CSV preview.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use equipment_rater::client::ApiClient;
use equipment_rater::config::{ClientConfig, ServerConfig};
use equipment_rater::fetch::BasicClient;
use equipment_rater::fetch::auth::BasicAuth;
use equipment_rater::preview::{PREVIEW_ROWS, preview_bytes, preview_path};
use equipment_rater::report::attachment_filename;
use equipment_rater::server;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "equipment_rater")]
#[command(about = "Summarize equipment sensor CSVs and render reports", long_about = None)]
struct Cli {
    #[command(flatten)]
    client: ClientConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve(ServerConfig),
    /// Upload a CSV file and print its summary
    Upload {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Display name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Show the summary of a dataset (latest when no id is given)
    Summary {
        #[arg(long)]
        id: Option<i64>,
    },
    /// List the retained uploads, most recent first
    History,
    /// Download the PDF report of a dataset
    Report {
        id: i64,

        /// Where to write the PDF (defaults to the server-provided file name)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Preview the first rows of a local CSV, or of a stored dataset with --id
    ///
    /// `--id` downloads the raw file over HTTP, so it only works when the
    /// server keeps uploads in its media directory. Datasets stored in S3
    /// report an `s3://` file URL and are rejected.
    Preview {
        #[arg(value_name = "FILE", required_unless_present = "id")]
        path: Option<PathBuf>,

        #[arg(long, conflicts_with = "path")]
        id: Option<i64>,

        /// Number of data rows to show
        #[arg(short, long, default_value_t = PREVIEW_ROWS)]
        rows: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/equipment_rater.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("equipment_rater.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(config) => server::serve(config).await?,
        Commands::Upload { path, name } => {
            let view = api(&cli.client)?.upload(&path, name.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Commands::Summary { id } => {
            let view = api(&cli.client)?.summary(id).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Commands::History => {
            let history = api(&cli.client)?.history().await?;
            if history.is_empty() {
                info!("No datasets uploaded yet");
            }
            for view in &history {
                println!("{}", view.history_line());
            }
        }
        Commands::Report { id, out } => {
            let client = api(&cli.client)?;
            let download = client.report(id).await?;
            let out = match out.or(download.filename.map(PathBuf::from)) {
                Some(out) => out,
                None => PathBuf::from(attachment_filename(&client.summary(Some(id)).await?.name)),
            };
            tokio::fs::write(&out, &download.bytes)
                .await
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(path = %out.display(), bytes = download.bytes.len(), "Report saved");
        }
        Commands::Preview { path, id, rows } => {
            let preview = if let Some(path) = path {
                preview_path(&path, rows)?
            } else {
                let Some(id) = id else {
                    bail!("preview needs a FILE or --id");
                };
                let client = api(&cli.client)?;
                let view = client.summary(Some(id)).await?;
                let bytes = client.fetch_raw(&view.file_url).await?;
                preview_bytes(&bytes, rows)?
            };
            info!(rows = preview.rows.len(), "Preview loaded");
            println!("{}", preview.render());
        }
    }

    Ok(())
}

fn api(config: &ClientConfig) -> Result<ApiClient<BasicAuth<BasicClient>>> {
    let (user, pass) = config.credentials()?;
    ApiClient::with_credentials(&config.api_base, user, pass)
}

//! Client for the summary service, used by the command-line subcommands.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, Request, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::ErrorBody;
use crate::fetch::auth::BasicAuth;
use crate::fetch::{BasicClient, HttpClient, fetch_bytes};
use crate::projection::DatasetView;

/// A downloaded PDF report.
#[derive(Debug)]
pub struct ReportDownload {
    /// File name from `Content-Disposition`, when the server sent one.
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

pub struct ApiClient<C> {
    http: C,
    base: Url,
    builder: reqwest::Client,
}

impl ApiClient<BasicAuth<BasicClient>> {
    /// Client that authenticates every call with HTTP Basic credentials.
    pub fn with_credentials(api_base: &str, username: &str, password: &str) -> Result<Self> {
        let http = BasicAuth::new(BasicClient::new()?, username, password)?;
        Self::new(http, api_base)
    }
}

impl<C: HttpClient> ApiClient<C> {
    pub fn new(http: C, api_base: &str) -> Result<Self> {
        Ok(Self {
            http,
            base: parse_base(api_base)?,
            builder: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("invalid endpoint path '{path}'"))
    }

    async fn send(&self, req: Request) -> Result<Response> {
        let method = req.method().clone();
        let url = req.url().clone();
        debug!(%method, %url, "Sending API request");

        let resp = self
            .http
            .execute(req)
            .await
            .with_context(|| format!("{method} {url} failed"))?;

        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.detail)
            .unwrap_or(body);
        Err(anyhow!("{method} {url} returned {status}: {detail}"))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let req = Request::new(Method::GET, self.endpoint(path)?);
        let resp = self.send(req).await?;
        resp.json()
            .await
            .with_context(|| format!("failed to decode response from {path}"))
    }

    /// Uploads the CSV at `path`, optionally under an explicit display name.
    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub async fn upload(&self, path: &Path, name: Option<&str>) -> Result<DatasetView> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("dataset.csv")
            .to_string();

        let mut form = Form::new().part(
            "file",
            Part::bytes(bytes).file_name(file_name).mime_str("text/csv")?,
        );
        if let Some(name) = name {
            form = form.text("name", name.to_string());
        }

        let req = self
            .builder
            .post(self.endpoint("upload/")?)
            .multipart(form)
            .build()?;
        let view: DatasetView = self.send(req).await?.json().await?;
        info!(id = view.id, name = %view.name, "Upload accepted");
        Ok(view)
    }

    /// Summary of dataset `id`, or of the most recent upload when `id` is `None`.
    pub async fn summary(&self, id: Option<i64>) -> Result<DatasetView> {
        match id {
            Some(id) => self.get_json(&format!("summary/{id}/")).await,
            None => self.get_json("summary/").await,
        }
    }

    pub async fn history(&self) -> Result<Vec<DatasetView>> {
        self.get_json("history/").await
    }

    pub async fn report(&self, id: i64) -> Result<ReportDownload> {
        let req = Request::new(Method::GET, self.endpoint(&format!("pdf/{id}/"))?);
        let resp = self.send(req).await?;

        let filename = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_filename);
        let bytes = resp.bytes().await?.to_vec();
        Ok(ReportDownload { filename, bytes })
    }

    /// Downloads the raw file behind a projection's `file_url`.
    pub async fn fetch_raw(&self, file_url: &str) -> Result<Vec<u8>> {
        let url = resolve_file_url(&self.base, file_url)?;
        fetch_bytes(&self.http, url.as_str()).await
    }
}

/// Ensures the base ends in `/` so relative endpoints join beneath it.
fn parse_base(api_base: &str) -> Result<Url> {
    let mut base = api_base.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base).with_context(|| format!("invalid API base URL '{api_base}'"))
}

/// Resolves a `file_url` as returned by the server. Absolute paths such as
/// `/media/...` are taken relative to the API origin.
fn resolve_file_url(base: &Url, file_url: &str) -> Result<Url> {
    match Url::parse(file_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        Ok(url) => bail!("cannot download '{url}': unsupported scheme '{}'", url.scheme()),
        Err(_) => base
            .join(file_url)
            .with_context(|| format!("invalid file URL '{file_url}'")),
    }
}

/// Extracts `filename` from a `Content-Disposition` header value, keeping only
/// its final path component.
fn attachment_filename(disposition: &str) -> Option<String> {
    disposition.split(';').map(str::trim).find_map(|part| {
        let value = part.strip_prefix("filename=")?.trim_matches('"');
        let base = value.rsplit(['/', '\\']).next()?;
        (!base.is_empty() && base != "." && base != "..").then(|| base.to_string())
    })
}

use axum::Json;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::debug;

use super::AppState;
use crate::error::{InputError, ServiceError};
use crate::pipeline::{Upload, ingest};
use crate::projection::DatasetView;
use crate::report;
use crate::store::DatasetRecord;

fn view(state: &AppState, record: DatasetRecord) -> DatasetView {
    DatasetView::from_record(record, state.store.blobs().as_ref())
}

fn malformed(e: MultipartError) -> ServiceError {
    InputError::Malformed(e.body_text()).into()
}

/// `POST /api/upload/`: multipart field `file` plus optional `name`.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<DatasetView>), ServiceError> {
    let Ok(mut multipart) = multipart else {
        return Err(InputError::NoFile.into());
    };

    let mut file: Option<(Option<String>, Bytes)> = None;
    let mut display_name = None;

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(malformed)?;
                file = Some((file_name, bytes));
            }
            "name" => display_name = Some(field.text().await.map_err(malformed)?),
            other => debug!(field = other, "Ignoring unknown upload field"),
        }
    }

    let (file_name, bytes) = file.ok_or(InputError::NoFile)?;
    let record = ingest(
        &state.store,
        &state.schema,
        Upload {
            file_name,
            display_name,
            bytes,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(view(&state, record))))
}

/// `GET /api/summary/`: the most recent dataset.
pub async fn latest_summary(
    State(state): State<AppState>,
) -> Result<Json<DatasetView>, ServiceError> {
    let record = state
        .store
        .get_latest()
        .await?
        .ok_or(ServiceError::NotFound("No datasets"))?;
    Ok(Json(view(&state, record)))
}

/// `GET /api/summary/:id/`
pub async fn summary_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DatasetView>, ServiceError> {
    let record = state
        .store
        .get(id)
        .await?
        .ok_or(ServiceError::NotFound("Not found"))?;
    Ok(Json(view(&state, record)))
}

/// `GET /api/history/`: the retained datasets, most recent first. Empty when nothing is stored.
pub async fn history(State(state): State<AppState>) -> Result<Json<Vec<DatasetView>>, ServiceError> {
    let records = state.store.list_recent(state.store.retention()).await?;
    Ok(Json(records.into_iter().map(|r| view(&state, r)).collect()))
}

/// `GET /api/pdf/:id/`: the dataset's report as a PDF attachment.
pub async fn pdf_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ServiceError> {
    let record = state
        .store
        .get(id)
        .await?
        .ok_or(ServiceError::NotFound("Not found"))?;

    let pdf = report::render_pdf(&record).map_err(ServiceError::Report)?;

    let filename = report::attachment_filename(&record.name);
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .or_else(|_| HeaderValue::from_str("attachment; filename=\"report.pdf\""))
        .map_err(|e| ServiceError::Report(e.into()))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
        .into_response())
}

pub async fn health() -> &'static str {
    "ok"
}

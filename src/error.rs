//! Error taxonomy for the upload, summary and report surfaces.
//!
//! Library plumbing uses [`anyhow`]; anything that crosses the HTTP boundary is
//! folded into a [`ServiceError`] so it can be mapped onto a status code and a
//! `{"detail": ...}` body.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// User-correctable problems with an upload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("No file uploaded")]
    NoFile,
    #[error("CSV parse error: {0}")]
    Parse(String),
    #[error("Missing column: {0}")]
    MissingColumn(String),
    #[error("Malformed upload: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Input(#[from] InputError),

    /// Carries the exact message returned to the caller ("Not found", "No datasets").
    #[error("{0}")]
    NotFound(&'static str),

    #[error("Authentication credentials were not provided or are invalid")]
    Unauthorized,

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("report rendering failed: {0:#}")]
    Report(anyhow::Error),
}

/// JSON body used for every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Input(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Storage(_) | ServiceError::Report(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the caller. Internal failures are logged, not echoed.
    fn detail(&self) -> String {
        match self {
            ServiceError::Storage(e) => {
                error!(error = %format!("{e:#}"), "Storage failure");
                "Storage error".to_string()
            }
            ServiceError::Report(e) => {
                error!(error = %format!("{e:#}"), "Report rendering failure");
                "Report rendering error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let unauthorized = matches!(self, ServiceError::Unauthorized);
        let mut response = (status, Json(ErrorBody { detail: self.detail() })).into_response();

        if unauthorized {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"equipment\""),
            );
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_messages() {
        assert_eq!(InputError::NoFile.to_string(), "No file uploaded");
        assert_eq!(
            InputError::MissingColumn("Pressure".into()).to_string(),
            "Missing column: Pressure"
        );
        assert_eq!(
            InputError::Parse("bad quote".into()).to_string(),
            "CSV parse error: bad quote"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServiceError::from(InputError::NoFile).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::NotFound("Not found").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Storage(anyhow::anyhow!("disk full")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unauthorized_sets_challenge_header() {
        let response = ServiceError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }
}

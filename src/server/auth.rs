//! HTTP Basic authentication in front of every API route.
//!
//! Identity checks are delegated to an [`Authenticator`]; the service ships
//! with [`StaticCredentials`], a single configured username and password.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::warn;

use crate::error::ServiceError;

pub trait Authenticator: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

#[derive(Clone)]
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl Authenticator for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        username == self.username && password == self.password
    }
}

/// Decodes an `Authorization: Basic ...` header value into `(username, password)`.
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(token.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Rejects requests without valid credentials before they reach a handler.
pub async fn require_basic_auth(
    State(auth): State<Arc<dyn Authenticator>>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let credentials = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic);

    match credentials {
        Some((user, pass)) if auth.verify(&user, &pass) => Ok(next.run(request).await),
        Some((user, _)) => {
            warn!(user = %user, path = %request.uri().path(), "Rejected invalid credentials");
            Err(ServiceError::Unauthorized)
        }
        None => {
            warn!(path = %request.uri().path(), "Rejected unauthenticated request");
            Err(ServiceError::Unauthorized)
        }
    }
}

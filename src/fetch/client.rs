use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes outbound requests for the API client.
///
/// Wrappers such as [`BasicAuth`](super::auth::BasicAuth) decorate a request
/// before handing it to the inner client; tests substitute recorders.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: Request) -> reqwest::Result<Response>;
}

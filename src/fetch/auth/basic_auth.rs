use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderValue};

/// An [`HttpClient`] wrapper that sends HTTP Basic credentials with every request.
pub struct BasicAuth<C> {
    pub inner: C,
    header: HeaderValue,
}

impl<C> BasicAuth<C> {
    /// Encodes `username:password` once; the header is marked sensitive so it
    /// never shows up in debug output.
    pub fn new(inner: C, username: &str, password: &str) -> anyhow::Result<Self> {
        let token = STANDARD.encode(format!("{username}:{password}"));
        let mut header = HeaderValue::from_str(&format!("Basic {token}"))?;
        header.set_sensitive(true);
        Ok(Self { inner, header })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for BasicAuth<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut().insert(AUTHORIZATION, self.header.clone());
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records the Authorization header of every request and answers 200.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl HttpClient for Recorder {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            let auth = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            self.seen.lock().unwrap().push(auth);
            Ok(reqwest::Response::from(axum::http::Response::new("ok")))
        }
    }

    #[tokio::test]
    async fn test_basic_auth_header_is_injected() {
        let client = BasicAuth::new(Recorder::default(), "alice", "s3cret").unwrap();
        let req = reqwest::Request::new(
            reqwest::Method::GET,
            "http://localhost/api/history/".parse().unwrap(),
        );

        client.execute(req).await.unwrap();

        let seen = client.inner.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[Some("Basic YWxpY2U6czNjcmV0".to_string())]);
    }
}

//! HTTP surface: upload, summary, history and report endpoints.
//!
//! Every route except `/health` sits behind [`auth::require_basic_auth`].
//! Raw uploads kept in the local media directory are served under `/media`.

pub mod auth;
mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::schema::Schema;
use crate::store::DatasetStore;
use auth::{Authenticator, require_basic_auth};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DatasetStore>,
    pub schema: Schema,
}

impl AppState {
    pub fn new(store: DatasetStore) -> Self {
        Self {
            store: Arc::new(store),
            schema: Schema::EQUIPMENT,
        }
    }
}

/// Options for [`router`] that do not live in [`AppState`].
pub struct RouterOptions {
    pub authenticator: Arc<dyn Authenticator>,
    pub media_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

pub fn router(state: AppState, options: RouterOptions) -> Router {
    let mut protected = Router::new()
        .route("/api/upload/", post(handlers::upload))
        .route("/api/summary/", get(handlers::latest_summary))
        .route("/api/summary/:id/", get(handlers::summary_by_id))
        .route("/api/history/", get(handlers::history))
        .route("/api/pdf/:id/", get(handlers::pdf_report));

    if let Some(dir) = options.media_dir {
        protected = protected.nest_service("/media", ServeDir::new(dir));
    }

    let protected = protected
        .layer(DefaultBodyLimit::max(options.max_upload_bytes))
        .layer(middleware::from_fn_with_state(
            options.authenticator,
            require_basic_auth,
        ));

    Router::new()
        .merge(protected)
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Runs the service until Ctrl+C.
pub async fn serve(config: ServerConfig) -> Result<()> {
    config.validate()?;

    let store = config.build_store().await?;
    let app = router(
        AppState::new(store),
        RouterOptions {
            authenticator: Arc::new(config.credentials()),
            media_dir: config.served_media_dir(),
            max_upload_bytes: config.max_upload_bytes(),
        },
    );

    let listener = TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, retention = config.retention, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::projection::DatasetView;
    use crate::store::MemoryRepo;
    use auth::StaticCredentials;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    const AUTH: &str = "Basic YWRtaW46c2VjcmV0"; // admin:secret
    const BOUNDARY: &str = "X-EQUIPMENT-BOUNDARY";

    fn app() -> Router {
        let store = DatasetStore::new(
            Arc::new(MemoryRepo::new()),
            Arc::new(MemoryBlobStore::new()),
        );
        router(
            AppState::new(store),
            RouterOptions {
                authenticator: Arc::new(StaticCredentials::new("admin", "secret")),
                media_dir: None,
                max_upload_bytes: 1024 * 1024,
            },
        )
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, AUTH)
            .body(Body::empty())
            .unwrap()
    }

    fn multipart_upload(file: Option<(&str, &str)>, name: Option<&str>) -> Request<Body> {
        let mut body = String::new();
        if let Some((file_name, content)) = file {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: text/csv\r\n\r\n{content}\r\n"
            ));
        }
        if let Some(name) = name {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\n{name}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri("/api/upload/")
            .header(header::AUTHORIZATION, AUTH)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const VALID_CSV: &str = "Equipment Name,Type,Flowrate,Pressure,Temperature\nP-1,Pump,1,10,100\nP-2,Pump,2,20,200\nV-1,Valve,3,30,300";

    #[tokio::test]
    async fn test_health_is_public() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_requires_credentials() {
        let response = app()
            .oneshot(Request::builder().uri("/api/history/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let request = Request::builder()
            .uri("/api/summary/")
            .header(header::AUTHORIZATION, "Basic YWRtaW46d3Jvbmc=") // admin:wrong
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_store_responses() {
        let app = app();

        let response = app.clone().oneshot(get("/api/summary/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["detail"], "No datasets");

        let response = app.clone().oneshot(get("/api/summary/3/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["detail"], "Not found");

        let response = app.clone().oneshot(get("/api/history/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await, serde_json::json!([]));

        let response = app.oneshot(get("/api/pdf/3/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_then_read_back() {
        let app = app();

        let response = app
            .clone()
            .oneshot(multipart_upload(Some(("plant.csv", VALID_CSV)), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: DatasetView = serde_json::from_value(json(response).await).unwrap();
        assert_eq!(created.name, "plant.csv");
        assert_eq!(created.summary.total_count, 3);
        assert_eq!(created.summary.averages["Flowrate"], Some(2.0));
        assert_eq!(created.summary.type_distribution["Pump"], 2);
        assert!(created.file_url.starts_with("memory://uploads/"));

        let response = app.clone().oneshot(get("/api/summary/")).await.unwrap();
        let latest: DatasetView = serde_json::from_value(json(response).await).unwrap();
        assert_eq!(latest, created);

        let uri = format!("/api/summary/{}/", created.id);
        let response = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/api/history/")).await.unwrap();
        let history: Vec<DatasetView> = serde_json::from_value(json(response).await).unwrap();
        assert_eq!(history, vec![created]);
    }

    #[tokio::test]
    async fn test_upload_uses_display_name() {
        let response = app()
            .oneshot(multipart_upload(Some(("plant.csv", VALID_CSV)), Some("Line 4")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json(response).await["name"], "Line 4");
    }

    #[tokio::test]
    async fn test_upload_without_file() {
        let response = app()
            .oneshot(multipart_upload(None, Some("Line 4")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["detail"], "No file uploaded");
    }

    #[tokio::test]
    async fn test_upload_without_multipart_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/upload/")
            .header(header::AUTHORIZATION, AUTH)
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["detail"], "No file uploaded");
    }

    #[tokio::test]
    async fn test_upload_missing_column() {
        let response = app()
            .oneshot(multipart_upload(
                Some(("bad.csv", "Type,Flowrate,Temperature\nPump,1,2")),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["detail"], "Missing column: Pressure");
    }

    #[tokio::test]
    async fn test_upload_unparseable_csv() {
        let response = app()
            .oneshot(multipart_upload(Some(("empty.csv", "")), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let detail = json(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("CSV parse error: "), "{detail}");
    }

    #[tokio::test]
    async fn test_pdf_download() {
        let app = app();
        let response = app
            .clone()
            .oneshot(multipart_upload(Some(("plant.csv", VALID_CSV)), Some("plant")))
            .await
            .unwrap();
        let created: DatasetView = serde_json::from_value(json(response).await).unwrap();

        let uri = format!("/api/pdf/{}/", created.id);
        let response = app.oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"plant_report.pdf\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_pdf_filename_has_no_path_separators() {
        let app = app();
        let response = app
            .clone()
            .oneshot(multipart_upload(Some(("plant.csv", VALID_CSV)), Some("../../.bashrc")))
            .await
            .unwrap();
        let created: DatasetView = serde_json::from_value(json(response).await).unwrap();

        let uri = format!("/api/pdf/{}/", created.id);
        let response = app.oneshot(get(&uri)).await.unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\".._.._.bashrc_report.pdf\""
        );
    }

    #[tokio::test]
    async fn test_history_is_bounded_to_retention() {
        let app = app();
        for i in 0..7 {
            let response = app
                .clone()
                .oneshot(multipart_upload(Some((&format!("{i}.csv"), VALID_CSV)), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = app.oneshot(get("/api/history/")).await.unwrap();
        let history: Vec<DatasetView> = serde_json::from_value(json(response).await).unwrap();
        let names: Vec<&str> = history.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["6.csv", "5.csv", "4.csv", "3.csv", "2.csv"]);
    }
}

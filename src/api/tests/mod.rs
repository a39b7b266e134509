use super::*;
use crate::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tempfile::tempdir;
use tower::ServiceExt;

mod jobs;

/// A service rooted in a fresh temp dir; the extraction tool is never found on PATH
async fn create_test_service() -> (Arc<YtdlService>, tempfile::TempDir) {
    let root = tempdir().unwrap();
    let mut config = Config::default();
    config.download.web_root = root.path().to_path_buf();
    config.tools.search_path = false;
    let service = YtdlService::new(config).await.unwrap();
    (Arc::new(service), root)
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn cors_headers_present_when_enabled() {
    let (service, _root) = create_test_service().await;
    let app = create_router(service);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn cors_can_be_disabled() {
    let root = tempdir().unwrap();
    let mut config = Config::default();
    config.download.web_root = root.path().to_path_buf();
    config.tools.search_path = false;
    config.api.cors_enabled = false;
    let service = Arc::new(YtdlService::new(config).await.unwrap());
    let app = create_router(service);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn api_server_binds_and_serves() {
    let root = tempdir().unwrap();
    let mut config = Config::default();
    config.download.web_root = root.path().to_path_buf();
    config.tools.search_path = false;
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let service = Arc::new(YtdlService::new(config).await.unwrap());

    let handle = tokio::spawn(start_api_server(service));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(!handle.is_finished(), "server exited early");
    handle.abort();
}

use super::*;

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn enqueue_accepts_valid_url() {
    let (service, _root) = create_test_service().await;
    service.start().unwrap();
    let app = create_router(Arc::clone(&service));

    let response = app
        .oneshot(json_request(
            "POST",
            "/dl",
            serde_json::json!({"URL": "https://www.youtube.com/watch?v=abc"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["status"], "queued");
    assert_eq!(body["URL"], "https://www.youtube.com/watch?v=abc");

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn enqueue_rejects_empty_url() {
    let (service, _root) = create_test_service().await;
    let app = create_router(service);

    let response = app
        .oneshot(json_request("POST", "/dl", serde_json::json!({"URL": ""})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "invalid_url");
}

#[tokio::test]
async fn enqueue_during_shutdown_is_unavailable() {
    let (service, _root) = create_test_service().await;
    service.shutdown().await.unwrap();
    let app = create_router(service);

    let response = app
        .oneshot(json_request(
            "POST",
            "/dl",
            serde_json::json!({"URL": "https://example.com/a"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn delete_removes_file_then_reports_missing() {
    let (service, root) = create_test_service().await;
    let file = root.path().join("dl/ytdl-Band-Song.oga");
    std::fs::write(&file, "x").unwrap();
    let app = create_router(service);

    let body = serde_json::json!({"URLs": ["dl/ytdl-Band-Song.oga"]});
    let response = app
        .clone()
        .oneshot(json_request("DELETE", "/dl", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!file.exists());

    let response = app
        .oneshot(json_request("DELETE", "/dl", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_rejects_traversal() {
    let (service, _root) = create_test_service().await;
    let app = create_router(service);

    let response = app
        .oneshot(json_request(
            "DELETE",
            "/dl",
            serde_json::json!({"URLs": ["dl/../../etc/passwd"]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "invalid_path");
}

#[tokio::test]
async fn recent_lists_finished_files() {
    let (service, root) = create_test_service().await;
    std::fs::write(root.path().join("dl/ytdl-A-B.m4a"), "x").unwrap();
    std::fs::write(root.path().join("dl/t/ytdl-partial.opus"), "x").unwrap();
    let app = create_router(service);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/recent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["URL"], "dl/ytdl-A-B.m4a");
    assert!(entries[0]["Timestamp"].is_string());
}

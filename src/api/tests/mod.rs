use super::*;
use crate::error::ApiError;
use crate::types::SubmissionId;
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use std::time::Duration;
use tower::ServiceExt;

fn router(capacity: usize) -> (Router, Arc<DispatchBuffer>, CancellationToken) {
    let buffer = Arc::new(DispatchBuffer::new(capacity).unwrap());
    let cancel = CancellationToken::new();
    (create_router(buffer.clone(), cancel.clone()), buffer, cancel)
}

fn submit(body: &str) -> Request {
    Request::builder()
        .method("POST")
        .uri("/")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_submit_accepts_and_buffers() {
    let (app, buffer, _cancel) = router(10);

    let response = app
        .oneshot(submit(r#"{"submission_id": "abc123"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = json_body(response).await;
    assert_eq!(body["submission_id"], "abc123");
    assert_eq!(buffer.drain(), vec![SubmissionId::from("abc123")]);
}

#[tokio::test]
async fn test_submit_rejects_when_full() {
    let (app, buffer, _cancel) = router(1);
    buffer.offer("first".into()).unwrap();

    let response = app
        .oneshot(submit(r#"{"submission_id": "second"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: ApiError = json_body(response).await;
    assert_eq!(body.error.code, "buffer_full");
    assert_eq!(buffer.drain(), vec![SubmissionId::from("first")]);
}

#[tokio::test]
async fn test_submit_rejects_after_shutdown() {
    let (app, buffer, cancel) = router(10);
    cancel.cancel();

    let response = app
        .oneshot(submit(r#"{"submission_id": "late"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(buffer.is_empty());
}

#[tokio::test]
async fn test_submit_malformed_json_is_bad_request() {
    let (app, buffer, _cancel) = router(10);

    let response = app.oneshot(submit("{not json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ApiError = json_body(response).await;
    assert_eq!(body.error.code, "validation_error");
    assert!(buffer.is_empty());
}

#[tokio::test]
async fn test_submit_wrong_shape_is_unprocessable() {
    let (app, _buffer, _cancel) = router(10);

    let response = app
        .oneshot(submit(r#"{"submission": 42}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_other_methods_are_not_allowed() {
    let (app, _buffer, _cancel) = router(10);

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_health_check() {
    let (app, _buffer, _cancel) = router(10);

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_stats_reports_buffer_counters() {
    let (app, buffer, _cancel) = router(2);
    buffer.offer("a".into()).unwrap();
    buffer.offer("b".into()).unwrap();
    buffer.offer("c".into()).unwrap_err();

    let request = Request::builder()
        .uri("/stats")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    let status: routes::BufferStatus = json_body(response).await;
    assert_eq!(status.len, 2);
    assert_eq!(status.capacity, 2);
    assert_eq!(status.stats.offered, 3);
    assert_eq!(status.stats.dropped, 1);
}

#[tokio::test]
async fn test_server_stops_on_cancel() {
    let buffer = Arc::new(DispatchBuffer::new(10).unwrap());
    let cancel = CancellationToken::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let handle = tokio::spawn(serve(listener, buffer.clone(), cancel.clone()));

    let response = reqwest::Client::new()
        .post(format!("http://{address}/"))
        .body(r#"{"submission_id": "over-the-wire"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    assert_eq!(buffer.len(), 1);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("server should shut down")
        .unwrap()
        .unwrap();
}

//! Integration tests for the HTTP inference backend against a mock server.

use switchyard_abstraction::{BackendError, BackendKind, Classifier, Complexity};
use switchyard_backends::HttpBackend;

#[tokio::test]
async fn test_classify_success() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/classify")
        .match_body(mockito::Matcher::Json(serde_json::json!({"text": "summarize this article"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "intent": "summarization",
                "confidence": 0.91,
                "complexity": "moderate",
                "techniques": ["step_by_step"],
                "raw_metadata": {"model": "bart-large-mnli"}
            }"#,
        )
        .create_async()
        .await;

    let backend = HttpBackend::new(BackendKind::ZeroShot, server.url()).unwrap();
    let result = backend.classify("summarize this article").await.unwrap();

    assert_eq!(result.intent, "summarization");
    assert!((result.confidence - 0.91).abs() < 1e-9);
    assert_eq!(result.complexity, Complexity::Moderate);
    assert_eq!(result.techniques, vec!["step_by_step".to_string()]);
    assert_eq!(result.raw_metadata["model"], "bart-large-mnli");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_error_is_connection_class() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/classify")
        .with_status(503)
        .with_body("warming up")
        .create_async()
        .await;

    let backend = HttpBackend::new(BackendKind::HeavyModel, server.url()).unwrap();
    let err = backend.classify("anything").await.unwrap_err();
    assert!(matches!(err, BackendError::Connection(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_invalid_body_is_inference_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/classify")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"label": "oops"}"#)
        .create_async()
        .await;

    let backend = HttpBackend::new(BackendKind::HeavyModel, server.url()).unwrap();
    let err = backend.classify("anything").await.unwrap_err();
    assert!(matches!(err, BackendError::Inference(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_out_of_range_confidence_is_inference_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/classify")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"intent": "analysis", "confidence": 1.7, "complexity": "complex"}"#)
        .create_async()
        .await;

    let backend = HttpBackend::new(BackendKind::HeavyModel, server.url()).unwrap();
    assert!(matches!(backend.classify("x").await, Err(BackendError::Inference(_))));
}

#[tokio::test]
async fn test_client_error_is_inference_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/classify")
        .with_status(422)
        .with_body("text too long")
        .create_async()
        .await;

    let backend = HttpBackend::new(BackendKind::ZeroShot, server.url()).unwrap();
    assert!(matches!(backend.classify("x").await, Err(BackendError::Inference(_))));
}

#[tokio::test]
async fn test_health_check() {
    let mut server = mockito::Server::new_async().await;
    let _healthy = server.mock("GET", "/health").with_status(200).create_async().await;

    let backend = HttpBackend::new(BackendKind::ZeroShot, server.url()).unwrap();
    assert!(backend.health_check().await);

    let mut down = mockito::Server::new_async().await;
    let _unhealthy = down.mock("GET", "/health").with_status(500).create_async().await;
    let backend = HttpBackend::new(BackendKind::ZeroShot, down.url()).unwrap();
    assert!(!backend.health_check().await);
}

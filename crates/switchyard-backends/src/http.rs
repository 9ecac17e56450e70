//! Remote inference backend.
//!
//! This module provides an implementation of the `Classifier` trait for a
//! model served over HTTP. Both the zero-shot model and the fine-tuned heavy
//! model are deployed behind the same small JSON API:
//!
//! - `POST {base_url}/classify` with `{"text": "..."}` returns a `ClassificationResult`
//! - `GET {base_url}/health` returns any 2xx status when the service is ready

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use switchyard_abstraction::{BackendError, BackendKind, ClassificationResult, Classifier};
use tracing::{debug, error};

/// Default client-side timeout; the router normally enforces a tighter one.
const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP inference backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// The backend kind this service fulfils.
    kind: BackendKind,
    /// Base URL of the inference service (e.g., "http://heavy-model:8080").
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

impl HttpBackend {
    /// Creates a new `HttpBackend` with the default client timeout.
    ///
    /// # Arguments
    /// * `kind` - Backend kind served by the remote service
    /// * `base_url` - Base URL without a trailing path (e.g., "http://localhost:8080")
    ///
    /// # Errors
    /// Returns a `BackendError` if the HTTP client cannot be created.
    pub fn new(kind: BackendKind, base_url: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_timeout(kind, base_url, DEFAULT_CLIENT_TIMEOUT)
    }

    /// Creates a new `HttpBackend` with a custom client-side timeout.
    ///
    /// # Errors
    /// Returns a `BackendError` if the HTTP client cannot be created.
    pub fn with_timeout(
        kind: BackendKind,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Connection(format!("Failed to build HTTP client: {}", e)))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { kind, base_url, client })
    }

    /// Returns the configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: &reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(format!("{} did not answer in time", self.base_url))
        } else if e.is_connect() {
            BackendError::Connection(format!("{} not reachable: {}", self.base_url, e))
        } else {
            BackendError::Connection(format!("Network error: {}", e))
        }
    }

    fn map_status(status: StatusCode, body: &str) -> BackendError {
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            BackendError::Connection(format!("Service unavailable ({}): {}", status, body))
        } else {
            BackendError::Inference(format!("API error ({}): {}", status, body))
        }
    }
}

#[async_trait]
impl Classifier for HttpBackend {
    async fn classify(&self, text: &str) -> Result<ClassificationResult, BackendError> {
        debug!(
            backend = %self.kind,
            base_url = %self.base_url,
            text_len = text.len(),
            "HttpBackend classifying text"
        );

        let url = format!("{}/classify", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ClassifyRequest { text })
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, base_url = %self.base_url, "Failed to reach inference service");
                self.map_send_error(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                status = %status,
                error = %error_text,
                "Inference service returned error status"
            );
            return Err(Self::map_status(status, &error_text));
        }

        let result: ClassificationResult = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse inference response");
            if e.is_timeout() {
                self.map_send_error(&e)
            } else {
                BackendError::Inference(format!("Failed to parse response: {}", e))
            }
        })?;

        result.validate()?;
        Ok(result)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(backend = %self.kind, error = %e, "Health probe failed");
                false
            }
        }
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalised() {
        let backend = HttpBackend::new(BackendKind::ZeroShot, "http://localhost:8080/").unwrap();
        assert_eq!(backend.base_url(), "http://localhost:8080");
        assert_eq!(backend.kind(), BackendKind::ZeroShot);
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            HttpBackend::map_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            BackendError::Connection(_)
        ));
        assert!(matches!(
            HttpBackend::map_status(StatusCode::TOO_MANY_REQUESTS, ""),
            BackendError::Connection(_)
        ));
        assert!(matches!(
            HttpBackend::map_status(StatusCode::UNPROCESSABLE_ENTITY, ""),
            BackendError::Inference(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_connection_error() {
        // Port 9 (discard) is essentially never listening locally.
        let backend = HttpBackend::with_timeout(
            BackendKind::HeavyModel,
            "http://127.0.0.1:9",
            Duration::from_secs(2),
        )
        .unwrap();
        let err = backend.classify("anything").await.unwrap_err();
        assert!(matches!(err, BackendError::Connection(_) | BackendError::Timeout(_)));
        assert!(!backend.health_check().await);
    }
}

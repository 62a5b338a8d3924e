//! HTTP client for a running splitstat server.

use std::time::Duration;

use serde::de::DeserializeOwned;
use splitstat_core::{
    ErrorResponse, HealthResponse, ReasonRequest, RecordEventRequest, Test, TestConfig,
    TestListResponse, TestResults, TransitionResponse,
};
use thiserror::Error;

/// Errors talking to the server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport or decoding failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Server is unhealthy: {0}")]
    Unhealthy(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Handle to a splitstat server.
#[derive(Debug, Clone)]
pub struct EngineClient {
    base_url: String,
    client: reqwest::Client,
}

impl EngineClient {
    /// Connect to a server at `url` (e.g. `http://localhost:9200`).
    ///
    /// No request is made; use [`EngineClient::health_check`] to check that the server is up.
    pub fn connect(url: &str, timeout: Duration) -> Result<Self, ClientError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ClientError::InvalidUrl(format!(
                "URL must start with http:// or https://: {}",
                url
            )));
        }

        let base_url = url.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health_check(&self) -> Result<HealthResponse, ClientError> {
        let response = self.client.get(self.url("/health")).send().await?;
        let health: HealthResponse = decode(response).await?;

        if health.status == "healthy" {
            Ok(health)
        } else {
            Err(ClientError::Unhealthy(health.status))
        }
    }

    pub async fn list_tests(&self) -> Result<TestListResponse, ClientError> {
        let response = self.client.get(self.url("/tests")).send().await?;
        decode(response).await
    }

    pub async fn create_test(&self, config: &TestConfig) -> Result<Test, ClientError> {
        let response = self
            .client
            .post(self.url("/tests"))
            .json(config)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn get_test(&self, test_id: &str) -> Result<Test, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/tests/{}", test_id)))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn start_test(&self, test_id: &str) -> Result<TransitionResponse, ClientError> {
        self.transition(test_id, "start", None).await
    }

    pub async fn pause_test(
        &self,
        test_id: &str,
        reason: Option<&str>,
    ) -> Result<TransitionResponse, ClientError> {
        self.transition(test_id, "pause", reason).await
    }

    pub async fn resume_test(&self, test_id: &str) -> Result<TransitionResponse, ClientError> {
        self.transition(test_id, "resume", None).await
    }

    pub async fn cancel_test(
        &self,
        test_id: &str,
        reason: Option<&str>,
    ) -> Result<TransitionResponse, ClientError> {
        self.transition(test_id, "cancel", reason).await
    }

    /// Send one event. The server accepts every event, so only transport errors surface.
    pub async fn record_event(
        &self,
        test_id: &str,
        event: &RecordEventRequest,
    ) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/tests/{}/events", test_id)))
            .json(event)
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    /// Run an analysis on the server and return it.
    pub async fn results(&self, test_id: &str) -> Result<TestResults, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/tests/{}/results", test_id)))
            .send()
            .await?;
        decode(response).await
    }

    /// Stop a running test and return its final analysis.
    pub async fn stop_test(
        &self,
        test_id: &str,
        reason: Option<&str>,
    ) -> Result<TestResults, ClientError> {
        let body = ReasonRequest {
            reason: reason.map(str::to_string),
        };
        let response = self
            .client
            .post(self.url(&format!("/tests/{}/stop", test_id)))
            .json(&body)
            .send()
            .await?;
        decode(response).await
    }

    async fn transition(
        &self,
        test_id: &str,
        action: &str,
        reason: Option<&str>,
    ) -> Result<TransitionResponse, ClientError> {
        let body = ReasonRequest {
            reason: reason.map(str::to_string),
        };
        let response = self
            .client
            .post(self.url(&format!("/tests/{}/{}", test_id, action)))
            .json(&body)
            .send()
            .await?;
        decode(response).await
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let response = ensure_success(response).await?;
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = EngineClient::connect("http://localhost:9200/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9200");
        assert_eq!(client.url("/tests"), "http://localhost:9200/tests");
    }

    #[test]
    fn test_api_error_display() {
        let err = ClientError::Api {
            status: 409,
            message: "Test test_1 is completed, cannot stop".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Server returned 409: Test test_1 is completed, cannot stop"
        );
    }
}

use serde::{Deserialize, Serialize};

use crate::model::{Payload, Test, TestStatus};

/// Body of `POST /tests`.
pub use crate::model::TestConfig as CreateTestRequest;

/// Health check response from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    /// Create a healthy response.
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// Body of `POST /tests/{id}/events`.
///
/// `event_type` stays a string so that unknown types are dropped rather than rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEventRequest {
    pub variant_id: String,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<Payload>,
}

impl RecordEventRequest {
    pub fn new(variant_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            variant_id: variant_id.into(),
            event_type: event_type.into(),
            event_data: None,
        }
    }

    pub fn with_revenue(mut self, revenue: f64) -> Self {
        let mut data = self.event_data.take().unwrap_or_default();
        data.insert("revenue".to_string(), serde_json::Value::from(revenue));
        self.event_data = Some(data);
        self
    }
}

/// Body of `POST /tests/{id}/stop`, `/pause` and `/cancel`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasonRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReasonRequest {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

/// Response to a lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub success: bool,
    pub test_id: String,
    pub status: TestStatus,
}

impl TransitionResponse {
    pub fn success(test_id: impl Into<String>, status: TestStatus) -> Self {
        Self {
            success: true,
            test_id: test_id.into(),
            status,
        }
    }
}

/// Response of `GET /tests`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestListResponse {
    pub active: Vec<Test>,
    pub completed: Vec<Test>,
}

/// Response of `GET /tests/{id}/assignment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentResponse {
    pub test_id: String,
    pub user_id: String,
    pub variant_id: String,
}

/// Error body returned with any 4xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

use thiserror::Error;

use crate::model::{MetricType, TestStatus};

/// Errors surfaced by the engine's lifecycle commands.
///
/// Statistical underpower is not an error: it is reported through sentinel
/// p-values on [`crate::stats::Significance`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Invalid test setup.
    #[error("Invalid test configuration: {0}")]
    Configuration(String),

    /// Operation attempted in the wrong lifecycle state.
    #[error("Test {test_id} is {status}, cannot {operation}")]
    InvalidState {
        test_id: String,
        status: TestStatus,
        operation: &'static str,
    },

    /// Unknown test id.
    #[error("Test not found: {0}")]
    NotFound(String),

    /// Unknown variant id within a known test.
    #[error("Variant {variant_id} not found in test {test_id}")]
    VariantNotFound { test_id: String, variant_id: String },

    /// No significance test is defined for this metric.
    #[error("Unsupported metric for significance testing: {0}")]
    UnsupportedMetric(MetricType),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

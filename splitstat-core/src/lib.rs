//! Statistical A/B testing engine for splitstat.
//!
//! This crate holds the test/variant model, the statistical analyzer (power
//! analysis, significance tests, confidence intervals) and the [`ABTestEngine`]
//! that drives test lifecycles. The server and CLI crates share its wire types.

pub mod engine;
pub mod error;
pub mod model;
pub mod protocol;
pub mod report;
pub mod stats;

// Re-export main types for convenience
pub use engine::{
    ABTestEngine, InMemoryRepository, SharedTest, TestRepository, TestResults, VariantResult,
    EARLY_STOPPING_SIGNIFICANCE, MANUAL_STOP, MAX_DURATION_REACHED,
};
pub use error::EngineError;
pub use model::{
    EventType, MetricType, Payload, Test, TestConfig, TestDefaults, TestStatus, TestType, Variant,
    VariantConfig,
};
pub use protocol::{
    AssignmentResponse, CreateTestRequest, ErrorResponse, HealthResponse, ReasonRequest,
    RecordEventRequest, TestListResponse, TransitionResponse,
};
pub use report::{ReportError, Reporter, TerminalReporter};
pub use stats::{Significance, SignificanceTest, StatisticalAnalyzer};

//! splitstat: statistically rigorous A/B testing
//!
//! This library backs the `splitstat` binary: configuration, the command-line
//! interface and an HTTP client for a running splitstat server.

pub mod cli;
pub mod client;
pub mod config;

// Re-export core types for convenience
pub use splitstat_core::protocol;
pub use splitstat_core::{
    ABTestEngine, Reporter, StatisticalAnalyzer, TerminalReporter, TestConfig, TestResults,
};
pub use splitstat_server::{build_router, run_server_async, serve};

// Re-export main types from this crate
pub use cli::{Cli, Command};
pub use client::{ClientError, EngineClient};
pub use config::Config;

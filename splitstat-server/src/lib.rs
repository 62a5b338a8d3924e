//! HTTP API for the splitstat engine.
//!
//! Exposes an [`ABTestEngine`](splitstat_core::ABTestEngine) over JSON endpoints so
//! that product code can create tests, stream events and read results. Event
//! ingestion is fire-and-forget; lifecycle commands report errors as 4xx responses.

mod error;
mod server;

pub use error::ApiError;
pub use server::{build_router, run_server_async, serve};

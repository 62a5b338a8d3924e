use thiserror::Error;

use crate::engine::TestResults;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Reporter: Send + Sync {
    fn report(&self, results: &TestResults) -> Result<(), ReportError>;
}

mod terminal;
pub use terminal::TerminalReporter;

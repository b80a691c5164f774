//! Error types for probe runs.

use thiserror::Error;

/// Errors that abort a probe run.
///
/// Per-exchange problems (bad JSON, closed pipe, missing `result`) never show
/// up here; they become failed test results instead.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to spawn MCP server '{command}': {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    #[error("MCP server did not exit within {timeout_ms}ms of termination request")]
    TeardownTimeout { timeout_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

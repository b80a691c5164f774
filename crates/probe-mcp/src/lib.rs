//! Black-box conformance probe for stdio MCP servers.
//!
//! Spawns a server as a child process, walks it through a fixed session of
//! newline-delimited JSON-RPC 2.0 exchanges (`initialize`, `tools/list`,
//! `tools/call`, `resources/list`), and reports a pass/fail verdict per
//! exchange.

pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod report;
pub mod session;
pub mod suite;

pub use config::{ConfigOverrides, ProbeConfig, ServerConfig, SuiteConfig};
pub use error::ProbeError;
pub use report::{Summary, TestResult};
pub use session::{NoResponse, Reply, StdioSession};
pub use suite::{TestCase, run_cases, run_suite, run_test, standard_suite};

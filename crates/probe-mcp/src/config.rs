//! Configuration for a probe run.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > TOML file > defaults

use crate::error::ProbeError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// MCP protocol version sent in `initialize`.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Tool invoked by the `tools/call` exchange.
pub const DEFAULT_TOOL: &str = "getStatus";

/// Environment variable overriding the server command.
pub const SERVER_ENV: &str = "MCP_PROBE_SERVER";

/// Environment variable overriding the tool name.
pub const TOOL_ENV: &str = "MCP_PROBE_TOOL";

fn default_command() -> String {
    "./ckb".to_string()
}

fn default_args() -> Vec<String> {
    vec!["mcp".to_string(), "--stdio".to_string()]
}

fn default_teardown_timeout() -> u64 {
    5000
}

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}

fn default_client_name() -> String {
    "test-client".to_string()
}

fn default_client_version() -> String {
    "1.0.0".to_string()
}

fn default_tool() -> String {
    DEFAULT_TOOL.to_string()
}

/// Top-level probe configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub suite: SuiteConfig,
}

/// How to launch the server under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Command to run (default: "./ckb").
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments placing the server in stdio mode (default: ["mcp", "--stdio"]).
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Environment variables to set for the server process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Bounded wait for the server to exit at teardown, in milliseconds.
    #[serde(default = "default_teardown_timeout")]
    pub teardown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            env: HashMap::new(),
            teardown_timeout_ms: default_teardown_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }
}

/// Values the exchanges send to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteConfig {
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default = "default_tool")]
    pub tool: String,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            protocol_version: default_protocol_version(),
            client_name: default_client_name(),
            client_version: default_client_version(),
            tool: default_tool(),
        }
    }
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub tool: Option<String>,
    pub protocol_version: Option<String>,
    pub teardown_timeout_ms: Option<u64>,
}

impl ProbeConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// An explicitly named config file must exist and parse.
    pub fn load(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, ProbeError> {
        Self::load_with_env(path, overrides, |key| std::env::var(key).ok())
    }

    /// Like [`ProbeConfig::load`], reading environment variables through `env`.
    pub fn load_with_env(
        path: Option<&Path>,
        overrides: ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ProbeError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(command) = env(SERVER_ENV) {
            config.server.command = command;
        }
        if let Some(tool) = env(TOOL_ENV) {
            config.suite.tool = tool;
        }

        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ProbeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProbeError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| ProbeError::Config(format!("Failed to parse {}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(command) = overrides.command {
            self.server.command = command;
        }
        if let Some(args) = overrides.args {
            self.server.args = args;
        }
        if let Some(ms) = overrides.teardown_timeout_ms {
            self.server.teardown_timeout_ms = ms;
        }
        if let Some(tool) = overrides.tool {
            self.suite.tool = tool;
        }
        if let Some(version) = overrides.protocol_version {
            self.suite.protocol_version = version;
        }
    }

    fn validate(&self) -> Result<(), ProbeError> {
        if self.server.command.trim().is_empty() {
            return Err(ProbeError::Config("server command is empty".into()));
        }
        if self.suite.tool.trim().is_empty() {
            return Err(ProbeError::Config("tool name is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_ckb_invocation() {
        let config = ProbeConfig::default();
        assert_eq!(config.server.command, "./ckb");
        assert_eq!(config.server.args, vec!["mcp", "--stdio"]);
        assert_eq!(config.server.teardown_timeout(), Duration::from_secs(5));
        assert_eq!(config.suite.protocol_version, "2024-11-05");
        assert_eq!(config.suite.tool, "getStatus");
    }

    #[test]
    fn parse_partial_file_keeps_defaults() {
        let toml_str = r#"
[server]
command = "/usr/local/bin/ckb"
teardown_timeout_ms = 1500

[suite]
tool = "doctor"
"#;
        let config = ProbeConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.server.command, "/usr/local/bin/ckb");
        assert_eq!(config.server.args, vec!["mcp", "--stdio"]);
        assert_eq!(config.server.teardown_timeout_ms, 1500);
        assert_eq!(config.suite.tool, "doctor");
        assert_eq!(config.suite.client_name, "test-client");
    }

    #[test]
    fn parse_env_vars() {
        let toml_str = r#"
[server]
command = "ckb"
env = { CKB_LOG = "debug" }
"#;
        let config = ProbeConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.server.env["CKB_LOG"], "debug");
    }

    #[test]
    fn overrides_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\ncommand = \"from-file\"\nargs = [\"serve\"]").unwrap();

        let config = ProbeConfig::load(
            Some(file.path()),
            ConfigOverrides {
                args: Some(vec!["mcp".into(), "--stdio".into(), "--preset".into(), "core".into()]),
                teardown_timeout_ms: Some(250),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.server.args.len(), 4);
        assert_eq!(config.server.teardown_timeout_ms, 250);
    }

    fn env_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_wins_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\ncommand = \"from-file\"\n[suite]\ntool = \"doctor\"").unwrap();

        let config = ProbeConfig::load_with_env(
            Some(file.path()),
            ConfigOverrides::default(),
            env_from(&[(SERVER_ENV, "/opt/ckb/bin/ckb"), (TOOL_ENV, "getArchitecture")]),
        )
        .unwrap();
        assert_eq!(config.server.command, "/opt/ckb/bin/ckb");
        assert_eq!(config.suite.tool, "getArchitecture");
    }

    #[test]
    fn cli_wins_over_env() {
        let config = ProbeConfig::load_with_env(
            None,
            ConfigOverrides {
                command: Some("./ckb-dev".into()),
                tool: Some("getStatus".into()),
                ..Default::default()
            },
            env_from(&[(SERVER_ENV, "/opt/ckb/bin/ckb"), (TOOL_ENV, "doctor")]),
        )
        .unwrap();
        assert_eq!(config.server.command, "./ckb-dev");
        assert_eq!(config.suite.tool, "getStatus");
    }

    #[test]
    fn file_applies_when_env_is_unset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\ncommand = \"from-file\"").unwrap();

        let config =
            ProbeConfig::load_with_env(Some(file.path()), ConfigOverrides::default(), |_| None)
                .unwrap();
        assert_eq!(config.server.command, "from-file");
        assert_eq!(config.suite.tool, DEFAULT_TOOL);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ProbeConfig::load(
            Some(Path::new("/nonexistent/mcp-probe.toml")),
            ConfigOverrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ProbeError::Config(_)));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\ncommand = ").unwrap();
        let err = ProbeConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = ProbeConfig::load(
            None,
            ConfigOverrides {
                command: Some("  ".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ProbeError::Config(_)));
    }
}

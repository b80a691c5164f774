//! The fixed MCP session the probe drives.
//!
//! Each exchange is a [`TestCase`] descriptor; [`run_test`] executes one and
//! [`run_suite`] runs them all in order against a freshly spawned server.
//! A case passes when its response carries a `result`. The `inspect` hook only
//! describes what came back and never changes the verdict.

use crate::config::{ProbeConfig, SuiteConfig};
use crate::error::ProbeError;
use crate::report::{Summary, TestResult};
use crate::session::{Reply, StdioSession};
use serde::Deserialize;
use serde_json::{Value, json};

/// Describes a result payload for the diagnostic log.
pub type Inspect = fn(&Value) -> Vec<String>;

/// One request/response exchange in the session.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: Option<Value>,
    pub inspect: Inspect,
}

/// The four exchanges, in session order.
pub fn standard_suite(config: &SuiteConfig) -> Vec<TestCase> {
    vec![
        TestCase {
            name: "Initialize",
            id: 1,
            method: "initialize",
            params: Some(json!({
                "protocolVersion": config.protocol_version,
                "capabilities": {},
                "clientInfo": {
                    "name": config.client_name,
                    "version": config.client_version,
                }
            })),
            inspect: inspect_initialize,
        },
        TestCase {
            name: "List Tools",
            id: 2,
            method: "tools/list",
            params: Some(json!({})),
            inspect: inspect_tools,
        },
        TestCase {
            name: "Call Tool",
            id: 3,
            method: "tools/call",
            params: Some(json!({
                "name": config.tool,
                "arguments": {},
            })),
            inspect: inspect_tool_call,
        },
        TestCase {
            name: "List Resources",
            id: 4,
            method: "resources/list",
            params: Some(json!({})),
            inspect: inspect_resources,
        },
    ]
}

/// Run one exchange and judge it.
pub async fn run_test(session: &mut StdioSession, case: &TestCase) -> TestResult {
    tracing::info!(
        test = case.name,
        id = case.id,
        method = case.method,
        "Running test"
    );

    let response = match session
        .send_request(case.id, case.method, case.params.clone())
        .await
    {
        Reply::Received(response) => response,
        Reply::NoResponse(reason) => {
            tracing::warn!(test = case.name, %reason, "Test failed");
            return TestResult::fail(case.name, reason.to_string());
        }
    };

    match (&response.result, &response.error) {
        (Some(result), _) => {
            let detail = (case.inspect)(result);
            for observation in &detail {
                tracing::info!(test = case.name, %observation, "Observed");
            }
            TestResult::pass(case.name, detail)
        }
        (None, Some(err)) => {
            let reason = format!("JSON-RPC error {}: {}", err.code, err.message);
            tracing::warn!(test = case.name, code = err.code, %reason, "Test failed");
            TestResult::fail(case.name, reason)
        }
        (None, None) => TestResult::fail(case.name, "response has no result"),
    }
}

/// Spawn the configured server, run every case in order, then tear down.
///
/// Test failures are recorded in the summary. Only spawn failure and a
/// server that outlives the teardown wait are returned as errors.
pub async fn run_suite(config: &ProbeConfig) -> Result<Summary, ProbeError> {
    run_cases(config, &standard_suite(&config.suite)).await
}

/// Like [`run_suite`] with an explicit case list.
pub async fn run_cases(config: &ProbeConfig, cases: &[TestCase]) -> Result<Summary, ProbeError> {
    let mut session = StdioSession::spawn(&config.server)?;

    let mut results = Vec::with_capacity(cases.len());
    for case in cases {
        results.push(run_test(&mut session, case).await);
    }

    session.shutdown(config.server.teardown_timeout()).await?;
    Ok(Summary::new(results))
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct InitializeResult {
    protocol_version: Option<String>,
    server_info: ServerInfo,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ServerInfo {
    name: Option<String>,
    version: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ToolsListResult {
    tools: Vec<ToolEntry>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ToolEntry {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ToolCallResult {
    content: Option<Value>,
    is_error: bool,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ResourcesListResult {
    resources: Vec<Value>,
    resource_templates: Vec<Value>,
}

/// Lenient decode: a payload of the wrong shape reads as all defaults.
fn decode<T: for<'de> Deserialize<'de> + Default>(result: &Value) -> T {
    T::deserialize(result).unwrap_or_default()
}

fn or_unknown(field: Option<String>) -> String {
    field.unwrap_or_else(|| "<unknown>".to_string())
}

fn inspect_initialize(result: &Value) -> Vec<String> {
    let init: InitializeResult = decode(result);
    vec![
        format!("Protocol Version: {}", or_unknown(init.protocol_version)),
        format!(
            "Server: {} {}",
            or_unknown(init.server_info.name),
            or_unknown(init.server_info.version)
        ),
    ]
}

fn inspect_tools(result: &Value) -> Vec<String> {
    let list: ToolsListResult = decode(result);
    let mut lines = vec![format!("Found {} tools", list.tools.len())];
    lines.extend(list.tools.into_iter().map(|tool| {
        format!(
            "- {}: {}",
            or_unknown(tool.name),
            tool.description.unwrap_or_default()
        )
    }));
    lines
}

fn inspect_tool_call(result: &Value) -> Vec<String> {
    let call: ToolCallResult = decode(result);
    let mut lines = vec!["Tool executed successfully".to_string()];
    if call.content.is_some() {
        lines.push("Response has content".to_string());
    }
    if call.is_error {
        lines.push("Tool reported isError".to_string());
    }
    lines
}

fn inspect_resources(result: &Value) -> Vec<String> {
    let list: ResourcesListResult = decode(result);
    vec![
        format!("Found {} static resources", list.resources.len()),
        format!("Found {} resource templates", list.resource_templates.len()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_order_and_ids() {
        let cases = standard_suite(&SuiteConfig::default());
        let shape: Vec<_> = cases.iter().map(|c| (c.id, c.method)).collect();
        assert_eq!(
            shape,
            vec![
                (1, "initialize"),
                (2, "tools/list"),
                (3, "tools/call"),
                (4, "resources/list"),
            ]
        );
    }

    #[test]
    fn initialize_params_carry_client_info() {
        let cases = standard_suite(&SuiteConfig::default());
        let params = cases[0].params.as_ref().unwrap();
        assert_eq!(params["protocolVersion"], "2024-11-05");
        assert!(params["capabilities"].as_object().unwrap().is_empty());
        assert_eq!(params["clientInfo"]["name"], "test-client");
        assert_eq!(params["clientInfo"]["version"], "1.0.0");
    }

    #[test]
    fn call_tool_uses_configured_tool() {
        let config = SuiteConfig {
            tool: "doctor".into(),
            ..Default::default()
        };
        let cases = standard_suite(&config);
        let params = cases[2].params.as_ref().unwrap();
        assert_eq!(params["name"], "doctor");
        assert!(params["arguments"].as_object().unwrap().is_empty());
    }

    #[test]
    fn inspect_initialize_reports_server() {
        let lines = inspect_initialize(&json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {"name": "ckb", "version": "7.4.0"}
        }));
        assert_eq!(lines[0], "Protocol Version: 2024-11-05");
        assert_eq!(lines[1], "Server: ckb 7.4.0");
    }

    #[test]
    fn inspect_tools_tolerates_missing_fields() {
        let lines = inspect_tools(&json!({
            "tools": [
                {"name": "getStatus", "description": "Get CKB system status"},
                {"name": "doctor"},
                {}
            ]
        }));
        assert_eq!(lines[0], "Found 3 tools");
        assert_eq!(lines[1], "- getStatus: Get CKB system status");
        assert_eq!(lines[2], "- doctor: ");
        assert_eq!(lines[3], "- <unknown>: ");
    }

    #[test]
    fn inspect_tools_on_empty_result() {
        assert_eq!(inspect_tools(&json!({})), vec!["Found 0 tools"]);
        assert_eq!(inspect_tools(&Value::Null), vec!["Found 0 tools"]);
    }

    #[test]
    fn inspect_tool_call_notes_content() {
        let lines = inspect_tool_call(&json!({
            "content": [{"type": "text", "text": "ok"}]
        }));
        assert!(lines.contains(&"Response has content".to_string()));
        assert_eq!(inspect_tool_call(&json!({})).len(), 1);
    }

    #[test]
    fn inspect_resources_defaults_to_empty() {
        let lines = inspect_resources(&json!({"resources": [{"uri": "ckb://status"}]}));
        assert_eq!(lines[0], "Found 1 static resources");
        assert_eq!(lines[1], "Found 0 resource templates");
    }
}

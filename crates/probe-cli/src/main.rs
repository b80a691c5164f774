//! mcp-probe CLI — drives a stdio MCP server through a handshake session.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use probe_mcp::{ConfigOverrides, ProbeConfig, run_suite};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "mcp-probe",
    version,
    about = "Test an MCP server over stdio: initialize, list tools, call a tool, list resources"
)]
struct Cli {
    /// Server binary to launch (overrides MCP_PROBE_SERVER and the config file)
    #[arg(long)]
    server: Option<String>,

    /// Tool to invoke with tools/call
    #[arg(long)]
    tool: Option<String>,

    /// MCP protocol version sent in initialize
    #[arg(long)]
    protocol_version: Option<String>,

    /// How long to wait for the server to exit at teardown, in milliseconds
    #[arg(long)]
    teardown_timeout_ms: Option<u64>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Enable verbose/debug logging (includes the server's stderr)
    #[arg(long)]
    verbose: bool,

    /// Server arguments (default: mcp --stdio)
    #[arg(last = true)]
    args: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.without_time().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let overrides = ConfigOverrides {
        command: cli.server,
        args: (!cli.args.is_empty()).then_some(cli.args),
        tool: cli.tool,
        protocol_version: cli.protocol_version,
        teardown_timeout_ms: cli.teardown_timeout_ms,
    };
    let config = ProbeConfig::load(cli.config.as_deref(), overrides)
        .context("Failed to load configuration")?;

    tracing::info!(
        command = %config.server.command,
        args = %config.server.args.join(" "),
        tool = %config.suite.tool,
        "Testing MCP server"
    );

    let summary = run_suite(&config)
        .await
        .with_context(|| format!("Probe of '{}' aborted", config.server.command))?;

    tracing::info!(
        passed = summary.passed(),
        total = summary.total(),
        "Probe finished"
    );
    eprintln!();
    eprintln!("{summary}");

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary.to_json())?);
    }

    Ok(ExitCode::from(summary.exit_code()))
}

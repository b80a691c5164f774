//! Stdio session with the server under test.
//!
//! Spawns a child process and exchanges newline-delimited JSON-RPC records
//! over its stdin/stdout, one request and one response line at a time.

use crate::config::ServerConfig;
use crate::error::ProbeError;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

/// Outcome of a single request/response exchange.
#[derive(Debug, Clone)]
pub enum Reply {
    Received(JsonRpcResponse),
    NoResponse(NoResponse),
}

/// Why an exchange produced no usable response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoResponse {
    /// The server's stdout reached end of stream.
    Closed,
    /// The line was not a decodable JSON-RPC response.
    Malformed(String),
    /// The response carried neither `result` nor `error`.
    Empty,
    /// Writing the request or reading the line failed.
    Io(String),
}

impl fmt::Display for NoResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoResponse::Closed => write!(f, "server closed its output stream"),
            NoResponse::Malformed(e) => write!(f, "malformed response: {e}"),
            NoResponse::Empty => write!(f, "response has neither result nor error"),
            NoResponse::Io(e) => write!(f, "I/O failure: {e}"),
        }
    }
}

/// Exclusive handle on a running server process.
///
/// The child is killed on drop, so an early return or panic mid-session still
/// reaps it. [`StdioSession::shutdown`] is the orderly path.
pub struct StdioSession {
    command: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    stderr_handle: JoinHandle<()>,
}

impl StdioSession {
    /// Spawn the server with all three streams piped.
    pub fn spawn(config: &ServerConfig) -> Result<Self, ProbeError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| ProbeError::SpawnFailed {
            command: config.command.clone(),
            source: e,
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(ProbeError::Io(std::io::Error::other(
                "child stdio was not piped",
            )));
        };

        let stderr_handle = tokio::spawn(drain_stderr(stderr));

        tracing::info!(
            command = %config.command,
            args = ?config.args,
            pid = ?child.id(),
            "Spawned MCP server"
        );

        Ok(Self {
            command: config.command.clone(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            stderr_handle,
        })
    }

    /// Send one request and read exactly one response line.
    ///
    /// Never fails: anything that keeps a usable response from arriving is
    /// reported as [`Reply::NoResponse`].
    pub async fn send_request(
        &mut self,
        id: u64,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Reply {
        let request = JsonRpcRequest::new(id, method, params);
        let line = match request.to_line() {
            Ok(line) => line,
            Err(e) => return self.no_response(id, NoResponse::Malformed(e.to_string())),
        };

        tracing::info!(id, method, request = %line.trim_end(), "Sending request");

        if let Err(e) = self.write_line(&line).await {
            return self.no_response(id, NoResponse::Io(e.to_string()));
        }

        let mut raw = Vec::new();
        match self.stdout.read_until(b'\n', &mut raw).await {
            Ok(0) => return self.no_response(id, NoResponse::Closed),
            Ok(_) => {}
            Err(e) => return self.no_response(id, NoResponse::Io(e.to_string())),
        }
        tracing::info!(
            id,
            response = %String::from_utf8_lossy(&raw).trim_end(),
            "Received response"
        );

        // Invalid UTF-8 is rejected here as a decode error, not an I/O one.
        let response: JsonRpcResponse = match serde_json::from_slice(&raw) {
            Ok(r) => r,
            Err(e) => return self.no_response(id, NoResponse::Malformed(e.to_string())),
        };

        if !response.has_result() && response.error.is_none() {
            return self.no_response(id, NoResponse::Empty);
        }
        if !response.id_matches(id) {
            tracing::warn!(
                expected = id,
                received = ?response.id,
                "Response id does not match request id"
            );
        }

        Reply::Received(response)
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin closed"))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await
    }

    fn no_response(&self, id: u64, reason: NoResponse) -> Reply {
        tracing::error!(id, %reason, "No usable response");
        Reply::NoResponse(reason)
    }

    /// Close stdin, request termination, and wait at most `wait` for exit.
    ///
    /// Returns the exit status when the server could be reaped, or
    /// [`ProbeError::TeardownTimeout`] when it outlived the wait.
    pub async fn shutdown(mut self, wait: Duration) -> Result<Option<ExitStatus>, ProbeError> {
        drop(self.stdin.take());

        if let Err(e) = self.child.start_kill() {
            // Already exited and reaped, nothing left to terminate.
            tracing::debug!(command = %self.command, error = %e, "Terminate request failed");
        }

        let status = match tokio::time::timeout(wait, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                tracing::warn!(command = %self.command, error = %e, "Failed to reap MCP server");
                None
            }
            Err(_) => {
                self.stderr_handle.abort();
                return Err(ProbeError::TeardownTimeout {
                    timeout_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                });
            }
        };

        self.stderr_handle.abort();
        tracing::debug!(command = %self.command, ?status, "MCP server terminated");
        Ok(status)
    }
}

/// Forward the server's stderr to the log until the pipe closes.
///
/// Reads raw bytes so a non-UTF-8 line never ends the drain; closing our end
/// early would hand the server EPIPE on its next diagnostic write.
async fn drain_stderr(stderr: ChildStderr) {
    forward_lines(BufReader::new(stderr)).await;
}

async fn forward_lines<R: AsyncBufRead + Unpin>(mut reader: R) -> usize {
    let mut buf = Vec::new();
    let mut forwarded = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                tracing::debug!(target: "probe_mcp::server_stderr", "{}", line.trim_end());
                forwarded += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading server stderr");
                break;
            }
        }
    }
    forwarded
}

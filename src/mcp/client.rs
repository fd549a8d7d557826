//! MCP client for connecting to MCP servers
//!
//! Supports stdio transport (spawning a subprocess).

use serde::Serialize;
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::protocol::{McpReply, McpRequest, McpResponse, McpTool};
use crate::error::{Error, Result};

/// How long `shutdown` waits for the server to exit after stdin is closed
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// MCP client for communicating with an MCP server
pub struct McpClient {
    /// Server process
    child: Mutex<Child>,
    /// Stdin writer; taken on shutdown so the server sees EOF
    stdin: Mutex<Option<ChildStdin>>,
    /// Stdout reader
    stdout: Mutex<BufReader<ChildStdout>>,
    /// Request ID counter
    next_id: AtomicU64,
    /// Server name
    name: String,
    /// Upper bound for each request/response round trip
    request_timeout: Duration,
}

impl McpClient {
    /// Connect to an MCP server via stdio with arguments
    ///
    /// Spawns the given command as a subprocess, performs the `initialize`
    /// handshake and returns a ready client. If the handshake fails the
    /// half-built client is dropped, which kills the child process.
    pub async fn connect_stdio(
        name: &str,
        command: &str,
        args: &[String],
        client_version: &str,
        request_timeout: Duration,
    ) -> Result<Self> {
        debug!("Connecting to MCP server '{}': {} {:?}", name, command, args);

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Connection(format!("Failed to spawn MCP server '{}' ({}): {}", name, command, e)))?;

        let stdin = child.stdin.take()
            .ok_or_else(|| Error::Connection("Failed to capture MCP server stdin".to_string()))?;
        let stdout = child.stdout.take()
            .ok_or_else(|| Error::Connection("Failed to capture MCP server stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let server = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %server, "stderr: {}", line);
                }
            });
        }

        let client = McpClient {
            child: Mutex::new(child),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(BufReader::new(stdout)),
            next_id: AtomicU64::new(1),
            name: name.to_string(),
            request_timeout,
        };

        client.initialize(client_version).await.map_err(|e| match e {
            Error::Connection(_) => e,
            other => Error::Connection(format!("MCP handshake with '{}' failed: {}", name, other)),
        })?;

        Ok(client)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Write one newline-delimited JSON-RPC message
    async fn write_message<T: Serialize>(&self, message: &T) -> Result<()> {
        let json = serde_json::to_string(message)?;

        debug!("MCP request -> {}: {}", self.name, json);

        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut()
            .ok_or_else(|| Error::Connection(format!("MCP server '{}' is shut down", self.name)))?;
        stdin.write_all(json.as_bytes()).await
            .map_err(|e| Error::Connection(format!("Failed to write to MCP server: {}", e)))?;
        stdin.write_all(b"\n").await
            .map_err(|e| Error::Connection(format!("Failed to write newline to MCP server: {}", e)))?;
        stdin.flush().await
            .map_err(|e| Error::Connection(format!("Failed to flush MCP server stdin: {}", e)))?;
        Ok(())
    }

    /// Read lines until the response for `id` arrives.
    ///
    /// Notifications and non-JSON lines are skipped. Server requests are
    /// answered inline so the server is never left waiting on us.
    async fn read_response(&self, stdout: &mut BufReader<ChildStdout>, id: u64) -> Result<McpResponse> {
        loop {
            let mut line = String::new();
            let read = stdout.read_line(&mut line).await
                .map_err(|e| Error::Connection(format!("Failed to read from MCP server: {}", e)))?;
            if read == 0 {
                return Err(Error::Connection(format!("MCP server '{}' closed its output", self.name)));
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            debug!("MCP response <- {}: {}", self.name, line);

            match serde_json::from_str::<McpResponse>(line) {
                Ok(message) if message.answers(id) => return Ok(message),
                Ok(message) if message.is_server_request() => {
                    let method = message.method.as_deref().unwrap_or_default();
                    let request_id = message.id.clone().unwrap_or(Value::Null);
                    debug!("Answering server request '{}' from {}", method, self.name);
                    self.write_message(&McpReply::to_server_request(request_id, method)).await?;
                }
                Ok(message) => {
                    debug!("Skipping unrelated MCP message from {}: {:?}", self.name, message.method);
                }
                Err(e) => {
                    debug!("Skipping non-JSON-RPC line from {}: {}", self.name, e);
                }
            }
        }
    }

    /// Send a request and wait for its result.
    ///
    /// The stdout lock is held for the whole round trip, so concurrent
    /// callers are served one at a time and no response is read by the
    /// wrong caller.
    async fn send_request<F>(&self, build: F) -> Result<Value>
    where
        F: FnOnce(u64) -> McpRequest,
    {
        let mut stdout = self.stdout.lock().await;

        let id = self.next_id();
        let request = build(id);
        let method = request.method.clone();

        self.write_message(&request).await?;

        let response = tokio::time::timeout(self.request_timeout, self.read_response(&mut stdout, id))
            .await
            .map_err(|_| Error::Timeout(format!(
                "MCP server '{}' did not answer '{}' within {:?}",
                self.name, method, self.request_timeout
            )))??;

        if let Some(err) = response.error {
            return Err(Error::Protocol(format!(
                "MCP error from {}: {} (code {})",
                self.name, err.message, err.code
            )));
        }

        response.result.ok_or_else(|| {
            Error::Protocol(format!("MCP response to '{}' from {} has no result", method, self.name))
        })
    }

    /// Initialize the MCP connection
    async fn initialize(&self, client_version: &str) -> Result<()> {
        let result = self
            .send_request(|id| McpRequest::initialize(id, env!("CARGO_PKG_NAME"), client_version))
            .await?;
        debug!("MCP server {} initialized: {}", self.name, result);

        self.write_message(&McpRequest::initialized()).await
    }

    /// List available tools from the MCP server
    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let result = self.send_request(McpRequest::list_tools).await?;

        let tools: Vec<McpTool> = match result.get("tools") {
            Some(tools) => serde_json::from_value(tools.clone())
                .map_err(|e| Error::Protocol(format!("Invalid tools/list result from {}: {}", self.name, e)))?,
            None => Vec::new(),
        };

        debug!("MCP server {} has {} tools", self.name, tools.len());
        Ok(tools)
    }

    /// Call a tool on the MCP server, returning the raw `tools/call` result
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        self.send_request(|id| McpRequest::call_tool(id, name, arguments)).await
    }

    /// Close stdin, give the server a moment to exit, then kill it
    pub async fn shutdown(&self) -> Result<()> {
        // Dropping stdin signals EOF to the server
        self.stdin.lock().await.take();

        let mut child = self.child.lock().await;
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("MCP server {} exited with {}", self.name, status);
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => {
                warn!("MCP server {} did not exit in time, killing it", self.name);
                child.kill().await.map_err(Error::Io)
            }
        }
    }

    /// Get the server name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        // kill_on_drop reaps the child if shutdown was never called
        debug!("Dropping MCP client for {}", self.name);
    }
}

//! MCP connector
//!
//! Adapts one MCP server process to the `ToolConnector` lifecycle so the
//! agent can route tool calls to it alongside other connectors.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{info, warn};

use super::client::McpClient;
use super::protocol::McpToolResult;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::tools::{ToolConnector, ToolDescriptor, ToolInvocationResult};

/// Connector that owns one stdio MCP server
pub struct McpConnector {
    name: String,
    command: String,
    args: Vec<String>,
    version: String,
    request_timeout: Duration,
    /// Live connection, present only between a successful `init` and `close`
    client: Option<McpClient>,
    tools: Vec<ToolDescriptor>,
    /// Set once `init` has been attempted; connectors are single-use
    attempted: bool,
}

impl McpConnector {
    /// Create an idle connector
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        McpConnector {
            name: name.into(),
            command: command.into(),
            args,
            version: "1.0.0".to_string(),
            request_timeout: Duration::from_secs(60),
            client: None,
            tools: Vec::new(),
            attempted: false,
        }
    }

    /// Create an idle connector from a configured server entry
    pub fn from_config(server: &ServerConfig) -> Self {
        Self::new(&server.name, &server.command, server.args.clone())
            .with_version(&server.version)
            .with_request_timeout(server.request_timeout)
    }

    /// Set the client version reported during the handshake
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Whether the connector currently holds a live connection
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    async fn connect(&self) -> Result<(McpClient, Vec<ToolDescriptor>)> {
        let client = McpClient::connect_stdio(
            &self.name,
            &self.command,
            &self.args,
            &self.version,
            self.request_timeout,
        )
        .await?;

        let tools = client
            .list_tools()
            .await
            .map_err(|e| Error::Connection(format!("Failed to list tools from '{}': {}", self.name, e)))?;

        Ok((client, tools.into_iter().map(ToolDescriptor::from).collect()))
    }
}

#[async_trait]
impl ToolConnector for McpConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&mut self) -> Result<()> {
        if self.attempted {
            return Err(Error::Connection(format!(
                "Connector '{}' has already been initialized",
                self.name
            )));
        }
        self.attempted = true;

        info!(
            "Connecting to MCP server '{}': {} {}",
            self.name,
            self.command,
            self.args.join(" ")
        );

        // On failure the half-built client is dropped here, killing the child
        let (client, tools) = self.connect().await?;

        info!(
            "Connected to MCP server '{}' with tools: {:?}",
            self.name,
            tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
        );

        self.client = Some(client);
        self.tools = tools;
        Ok(())
    }

    fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    async fn invoke(&self, tool_name: &str, arguments: Map<String, Value>) -> ToolInvocationResult {
        let Some(client) = self.client.as_ref() else {
            let err = Error::ToolInvocation(format!(
                "MCP server '{}' is not connected",
                self.name
            ));
            warn!("{}", err);
            return ToolInvocationResult::failure(err.to_string());
        };

        if !self.has_tool(tool_name) {
            return ToolInvocationResult::failure(format!(
                "Unknown tool '{}' on MCP server '{}'",
                tool_name, self.name
            ));
        }

        let raw = match client.call_tool(tool_name, Value::Object(arguments)).await {
            Ok(raw) => raw,
            Err(e) => {
                let err = Error::ToolInvocation(format!("'{}' on {}: {}", tool_name, self.name, e));
                warn!("{}", err);
                return ToolInvocationResult::failure(err.to_string());
            }
        };

        match serde_json::from_value::<McpToolResult>(raw.clone()) {
            Ok(result) if result.is_error => {
                warn!("MCP tool {} returned error", tool_name);
                ToolInvocationResult::failure(result.text())
            }
            _ => ToolInvocationResult::success(raw),
        }
    }

    async fn close(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        self.tools.clear();

        if let Err(e) = client.shutdown().await {
            warn!("Error closing MCP client '{}': {}", self.name, e);
        } else {
            info!("Closed MCP server '{}'", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_failure_is_connection_error() {
        let mut connector = McpConnector::new(
            "ghost",
            "mcpagent-definitely-not-a-real-binary",
            vec![],
        );

        let err = connector.init().await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert!(!connector.is_connected());
        assert!(connector.tools().is_empty());

        // Single-use: a second init is rejected rather than retried
        assert!(matches!(connector.init().await, Err(Error::Connection(_))));
    }

    #[tokio::test]
    async fn test_invoke_before_init_fails_softly() {
        let connector = McpConnector::new("idle", "true", vec![]);
        let result = connector.invoke("anything", Map::new()).await;
        match result {
            ToolInvocationResult::Failure { error } => {
                assert!(error.starts_with("Tool invocation failed"), "{}", error);
                assert!(error.contains("not connected"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    const SCRIPTED_SERVER: &str = r#"
read line
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"fake","version":"0"}}}'
read line
read line
printf '%s\n' '{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info","data":"warming up"}}'
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo","description":"Echo back","inputSchema":{"type":"object","properties":{"x":{"type":"number"}}}},{"name":"bare"}]}}'
read line
printf '%s\n' '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"echoed"}],"isError":false}}'
read line
printf '%s\n' '{"jsonrpc":"2.0","id":4,"result":{"content":[{"type":"text","text":"symbol not found"}],"isError":true}}'
read line
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scripted_server_lifecycle() {
        let mut connector = McpConnector::new(
            "scripted",
            "sh",
            vec!["-c".to_string(), SCRIPTED_SERVER.to_string()],
        )
        .with_request_timeout(Duration::from_secs(5));

        connector.init().await.unwrap();
        assert!(connector.is_connected());

        let names: Vec<_> = connector.tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "bare"]);
        assert_eq!(connector.tools()[1].description, "No description provided");

        let mut args = Map::new();
        args.insert("x".into(), Value::from(1));
        let ok = connector.invoke("echo", args).await;
        match ok {
            ToolInvocationResult::Success { output } => {
                assert_eq!(output["content"][0]["text"], "echoed");
            }
            other => panic!("expected success, got {:?}", other),
        }

        let failed = connector.invoke("bare", Map::new()).await;
        assert_eq!(failed, ToolInvocationResult::failure("symbol not found"));

        // Unknown tools never reach the server
        let unknown = connector.invoke("nope", Map::new()).await;
        assert!(!unknown.is_success());

        connector.close().await;
        assert!(!connector.is_connected());
        assert!(connector.tools().is_empty());

        // Idempotent
        connector.close().await;
    }

    // Sends a server request reusing the id of the pending tools/list, then
    // a ping; the tool list is only sent if both were answered properly.
    #[cfg(unix)]
    const CHATTY_SERVER: &str = r#"
read line
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"fake","version":"0"}}}'
read line
read line
printf '%s\n' '{"jsonrpc":"2.0","id":2,"method":"roots/list"}'
read refused
printf '%s\n' '{"jsonrpc":"2.0","id":"p1","method":"ping"}'
read pong
case "$refused$pong" in
  *'"error"'*'"id":"p1"'*'"result":{}'*)
    printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo"}]}}' ;;
  *)
    printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[]}}' ;;
esac
read line
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_server_requests_are_answered_not_mistaken_for_responses() {
        let mut connector = McpConnector::new(
            "chatty",
            "sh",
            vec!["-c".to_string(), CHATTY_SERVER.to_string()],
        )
        .with_request_timeout(Duration::from_secs(5));

        connector.init().await.unwrap();
        let names: Vec<_> = connector.tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["echo"]);

        connector.close().await;
    }

    #[cfg(unix)]
    const COUNTING_SERVER: &str = r#"
read line
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"fake","version":"0"}}}'
read line
read line
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo"}]}}'
n=3
while read line; do
  printf '{"jsonrpc":"2.0","id":%d,"result":{"content":[{"type":"text","text":"reply %d"}]}}\n' $n $n
  n=$((n+1))
done
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_concurrent_invocations_each_get_their_response() {
        let mut connector = McpConnector::new(
            "counting",
            "sh",
            vec!["-c".to_string(), COUNTING_SERVER.to_string()],
        )
        .with_request_timeout(Duration::from_secs(5));
        connector.init().await.unwrap();

        let (first, second) = tokio::join!(
            connector.invoke("echo", Map::new()),
            connector.invoke("echo", Map::new())
        );

        let mut texts = Vec::new();
        for result in [first, second] {
            match result {
                ToolInvocationResult::Success { output } => {
                    texts.push(output["content"][0]["text"].as_str().unwrap_or_default().to_string());
                }
                other => panic!("expected success, got {:?}", other),
            }
        }
        texts.sort();
        assert_eq!(texts, vec!["reply 3", "reply 4"]);

        connector.close().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_server_exiting_during_handshake() {
        let mut connector = McpConnector::new(
            "quitter",
            "sh",
            vec!["-c".to_string(), "read line; exit 0".to_string()],
        )
        .with_request_timeout(Duration::from_secs(5));

        let err = connector.init().await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert!(!connector.is_connected());
    }
}

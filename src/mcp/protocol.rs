//! MCP wire protocol types
//!
//! Model Context Protocol messages: JSON-RPC 2.0 over newline-delimited
//! stdio.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolDescriptor;

/// Protocol revision sent during the handshake
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC request (or notification, when `id` is absent) to an MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    /// Create a new MCP request
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        McpRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Create a notification; servers never answer these
    pub fn notification(method: impl Into<String>) -> Self {
        McpRequest {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.into(),
            params: None,
        }
    }

    /// Create an initialize request
    pub fn initialize(id: u64, client_name: &str, client_version: &str) -> Self {
        Self::new(id, "initialize", Some(serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": client_name,
                "version": client_version
            }
        })))
    }

    /// Create the notification that completes the handshake
    pub fn initialized() -> Self {
        Self::notification("notifications/initialized")
    }

    /// Create a tools/list request
    pub fn list_tools(id: u64) -> Self {
        Self::new(id, "tools/list", None)
    }

    /// Create a tools/call request
    pub fn call_tool(id: u64, name: impl Into<String>, arguments: Value) -> Self {
        Self::new(id, "tools/call", Some(serde_json::json!({
            "name": name.into(),
            "arguments": arguments
        })))
    }
}

/// JSON-RPC message read from an MCP server.
///
/// Responses carry an `id` plus `result` or `error`; server-initiated
/// notifications carry a `method` and no `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl McpResponse {
    /// Whether this message answers the request with the given id.
    ///
    /// Server-to-client requests share the id space with ours, so a message
    /// carrying a `method` is never a response.
    pub fn answers(&self, id: u64) -> bool {
        if self.method.is_some() {
            return false;
        }
        match &self.id {
            Some(Value::Number(n)) => n.as_u64() == Some(id),
            Some(Value::String(s)) => s.parse::<u64>().ok() == Some(id),
            _ => false,
        }
    }

    /// A request sent by the server that expects an answer
    pub fn is_server_request(&self) -> bool {
        self.method.is_some() && self.id.is_some()
    }
}

/// JSON-RPC reply from the client to a server-initiated request
#[derive(Debug, Clone, Serialize)]
pub struct McpReply {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

/// JSON-RPC code for an unsupported method
pub const METHOD_NOT_FOUND: i64 = -32601;

impl McpReply {
    /// Answer a server request: `ping` gets an empty result, anything else
    /// is reported as unsupported.
    pub fn to_server_request(id: Value, method: &str) -> Self {
        let (result, error) = match method {
            "ping" => (Some(serde_json::json!({})), None),
            other => (
                None,
                Some(McpError {
                    code: METHOD_NOT_FOUND,
                    message: format!("Method not supported by client: {}", other),
                    data: None,
                }),
            ),
        };
        McpReply {
            jsonrpc: "2.0".to_string(),
            id,
            result,
            error,
        }
    }
}

/// MCP error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Tool definition from an MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    /// Tool name
    pub name: String,
    /// Tool description
    #[serde(default)]
    pub description: Option<String>,
    /// Input schema (JSON Schema)
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Option<Value>,
}

impl From<McpTool> for ToolDescriptor {
    fn from(tool: McpTool) -> Self {
        ToolDescriptor::new(tool.name, tool.description, tool.input_schema)
    }
}

/// Content block returned by a tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
}

/// Result of a tools/call response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolResult {
    #[serde(default)]
    pub content: Vec<McpContent>,
    #[serde(rename = "structuredContent", default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl McpToolResult {
    /// Join all text content blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

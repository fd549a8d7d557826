//! Core connector trait and tool types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent::types::{FunctionDefinition, ToolDefinition};
use crate::error::Result;

const DEFAULT_DESCRIPTION: &str = "No description provided";

/// Metadata advertising one invocable tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, unique within its connector
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema describing accepted parameters
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Create a descriptor, filling in defaults for a missing description or schema
    pub fn new(name: impl Into<String>, description: Option<String>, input_schema: Option<Value>) -> Self {
        let description = description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
        let input_schema = match input_schema {
            Some(Value::Object(obj)) => Value::Object(obj),
            _ => serde_json::json!({ "type": "object", "properties": {} }),
        };
        ToolDescriptor {
            name: name.into(),
            description,
            input_schema,
        }
    }

    /// Convert to the function-tool shape chat backends expect
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: self.input_schema.clone(),
            },
        }
    }
}

/// Outcome of invoking a tool on a connector
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocationResult {
    /// The tool ran; `output` is its structured result
    Success { output: Value },
    /// The tool could not be run or reported an error
    Failure { error: String },
}

impl ToolInvocationResult {
    /// Create a successful result
    pub fn success(output: Value) -> Self {
        ToolInvocationResult::Success { output }
    }

    /// Create a failed result
    pub fn failure(error: impl Into<String>) -> Self {
        ToolInvocationResult::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolInvocationResult::Success { .. })
    }

    /// Serialize the relevant half for the model: the output on success,
    /// `{"error": ...}` on failure. String outputs are passed through verbatim.
    pub fn to_content(&self) -> String {
        match self {
            ToolInvocationResult::Success { output: Value::String(s) } => s.clone(),
            ToolInvocationResult::Success { output } => output.to_string(),
            ToolInvocationResult::Failure { error } => {
                serde_json::json!({ "error": error }).to_string()
            }
        }
    }
}

/// An owned handle to one external tool-providing process
///
/// Lifecycle: idle -> `init` -> connected -> `close` -> disconnected.
/// Connectors are single-use; `init` after a failed or completed
/// connection is not supported.
#[async_trait]
pub trait ToolConnector: Send + Sync {
    /// Connector name (used in logs)
    fn name(&self) -> &str;

    /// Connect to the tool process and retrieve its descriptors
    async fn init(&mut self) -> Result<()>;

    /// Descriptors retrieved at init; empty before init
    fn tools(&self) -> &[ToolDescriptor];

    /// Invoke a tool. Never fails: every error becomes `Failure`.
    async fn invoke(&self, tool_name: &str, arguments: Map<String, Value>) -> ToolInvocationResult;

    /// Best-effort shutdown. Idempotent; errors are logged, not returned.
    async fn close(&mut self);

    /// Whether this connector exposes a tool with the given name
    fn has_tool(&self, tool_name: &str) -> bool {
        self.tools().iter().any(|t| t.name == tool_name)
    }
}

//! Type definitions for the agent module

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message providing context and instructions
    System,
    /// User message
    User,
    /// Assistant (AI) response
    Assistant,
    /// Tool/function result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id; may be empty if the backend omitted it
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// Arguments as an (unvalidated) JSON string
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        ToolCallRequest {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the arguments into a JSON object.
    ///
    /// Blank arguments are an empty object. Anything that is not valid JSON,
    /// or is valid JSON but not an object, is an `ArgumentParse` error.
    pub fn parse_arguments(&self) -> Result<Map<String, Value>> {
        if self.arguments.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&self.arguments) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(Error::ArgumentParse(format!(
                "expected a JSON object for '{}', got {}",
                self.name, other
            ))),
            Err(e) => Err(Error::ArgumentParse(format!(
                "malformed JSON for '{}': {}",
                self.name, e
            ))),
        }
    }
}

/// One turn of the transcript
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// System instructions
    System { content: String },
    /// User input (also used for injected retrieval context)
    User { content: String },
    /// Model output: optional text and the tool calls it requested
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCallRequest>,
    },
    /// Result of one tool call
    Tool { tool_call_id: String, content: String },
}

impl Message {
    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        let content = content.into();
        Message::Assistant {
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls,
        }
    }

    /// Create a new tool result message
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    /// Text content, empty for a content-less assistant turn
    pub fn content(&self) -> &str {
        match self {
            Message::System { content } | Message::User { content } | Message::Tool { content, .. } => content,
            Message::Assistant { content, .. } => content.as_deref().unwrap_or(""),
        }
    }
}

/// What one `advance` produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    /// Assistant text (may be empty)
    pub content: String,
    /// Tool calls requested in this turn, in source order
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>) -> Self {
        ModelResponse {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        ModelResponse {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Backend-agnostic completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// Full transcript
    pub messages: Vec<Message>,
    /// Flattened tool schema
    pub tools: Vec<ToolDefinition>,
}

/// One incremental piece of a streamed completion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatDelta {
    /// Text fragment
    pub content: Option<String>,
    /// Tool-call fragments keyed by call index
    pub tool_calls: Vec<ToolCallFragment>,
}

/// Fragment of one tool call; every field is appended to what came before
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallFragment {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

// ---------------------------------------------------------------------------
// Wire format (OpenAI-compatible chat completions)
// ---------------------------------------------------------------------------

/// Tool definition for function calling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Type of tool (usually "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function definition
    pub function: FunctionDefinition,
}

/// Function definition for tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Name of the function
    pub name: String,
    /// Description of what the function does
    pub description: String,
    /// JSON Schema for function parameters
    pub parameters: Value,
}

/// A message as the chat API expects it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    /// Null for assistant turns that only carry tool calls
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        match message {
            Message::System { content } | Message::User { content } => WireMessage {
                role: message.role(),
                content: Some(content.clone()),
                tool_call_id: None,
                tool_calls: None,
            },
            Message::Assistant { content, tool_calls } => WireMessage {
                role: Role::Assistant,
                content: content.clone(),
                tool_call_id: None,
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls.iter().map(WireToolCall::from).collect())
                },
            },
            Message::Tool { tool_call_id, content } => WireMessage {
                role: Role::Tool,
                content: Some(content.clone()),
                tool_call_id: Some(tool_call_id.clone()),
                tool_calls: None,
            },
        }
    }
}

/// Tool call made by the assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    /// Unique ID for this tool call
    #[serde(default)]
    pub id: String,
    /// Type of tool call (usually "function")
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    /// Function details
    pub function: FunctionCall,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl From<&ToolCallRequest> for WireToolCall {
    fn from(call: &ToolCallRequest) -> Self {
        WireToolCall {
            id: call.id.clone(),
            call_type: default_call_type(),
            function: FunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

impl From<WireToolCall> for ToolCallRequest {
    fn from(call: WireToolCall) -> Self {
        ToolCallRequest {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        }
    }
}

/// Function call details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the function to call
    #[serde(default)]
    pub name: String,
    /// Arguments as JSON string
    #[serde(default)]
    pub arguments: String,
}

/// Request body for `/chat/completions`
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    /// Model to use
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<WireMessage>,
    /// Whether to stream responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Available tools/functions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Tool choice strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

impl ChatCompletionRequest {
    /// Translate a backend-agnostic request; tools are omitted when empty
    pub fn from_request(request: &ChatRequest, stream: bool) -> Self {
        let has_tools = !request.tools.is_empty();
        ChatCompletionRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            stream: if stream { Some(true) } else { None },
            tools: has_tools.then(|| request.tools.clone()),
            tool_choice: has_tools.then(|| "auto".to_string()),
        }
    }
}

/// Response from `/chat/completions`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    /// Model used
    #[serde(default)]
    pub model: String,
    /// Completion choices
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Usage statistics
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// A completion choice
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    /// The generated message
    pub message: WireMessage,
    /// Reason for stopping
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Streaming response chunk
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    /// Delta choices
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// A streaming choice delta
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    /// The delta content
    #[serde(default)]
    pub delta: MessageDelta,
    /// Reason for stopping
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Delta content in streaming response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageDelta {
    /// Content delta
    #[serde(default)]
    pub content: Option<String>,
    /// Tool calls delta
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Tool call delta in streaming
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    /// Index of this tool call
    #[serde(default)]
    pub index: u32,
    /// Tool call ID fragment
    #[serde(default)]
    pub id: Option<String>,
    /// Function delta
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

/// Function delta in streaming
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDelta {
    /// Function name fragment
    #[serde(default)]
    pub name: Option<String>,
    /// Arguments fragment
    #[serde(default)]
    pub arguments: Option<String>,
}

impl From<ChatCompletionChunk> for ChatDelta {
    fn from(chunk: ChatCompletionChunk) -> Self {
        let Some(choice) = chunk.choices.into_iter().next() else {
            return ChatDelta::default();
        };
        let tool_calls = choice
            .delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let (name, arguments) = match tc.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                ToolCallFragment {
                    index: tc.index,
                    id: tc.id,
                    name,
                    arguments,
                }
            })
            .collect();
        ChatDelta {
            content: choice.delta.content,
            tool_calls,
        }
    }
}

//! Conversation management
//!
//! A [`ConversationModel`] owns the transcript for one agent run and turns
//! it into chat backend requests.

use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::client::ChatBackend;
use super::stream::StreamAccumulator;
use super::types::{ChatRequest, Message, ModelResponse, ToolDefinition};
use crate::error::{Error, Result};
use crate::tools::ToolDescriptor;

/// How responses are requested from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// One request, one full response
    #[default]
    Blocking,
    /// Server-sent deltas reduced into one response
    Streaming,
}

/// Transcript plus the backend it is advanced against
pub struct ConversationModel {
    /// Unique conversation ID
    id: Uuid,
    backend: Arc<dyn ChatBackend>,
    /// Model being used
    model: String,
    /// Tool schema advertised on every request
    tools: Vec<ToolDefinition>,
    /// Append-only transcript
    messages: Vec<Message>,
    mode: CompletionMode,
    /// Tool call ids from the last assistant turn still awaiting a result
    pending: Vec<String>,
}

impl ConversationModel {
    /// Create a conversation.
    ///
    /// Empty strings for `system_prompt` or `context` count as absent. The
    /// system prompt comes first, then the context as a user turn.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        model: impl Into<String>,
        system_prompt: Option<&str>,
        tools: &[ToolDescriptor],
        context: Option<&str>,
    ) -> Self {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
            messages.push(Message::system(system));
        }
        if let Some(context) = context.filter(|c| !c.is_empty()) {
            messages.push(Message::user(context));
        }

        ConversationModel {
            id: Uuid::new_v4(),
            backend,
            model: model.into(),
            tools: tools.iter().map(ToolDescriptor::to_definition).collect(),
            messages,
            mode: CompletionMode::default(),
            pending: Vec::new(),
        }
    }

    /// Set the completion mode
    pub fn with_mode(mut self, mode: CompletionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Append the prompt (if any), ask the backend, append its reply.
    ///
    /// On failure no assistant turn is appended and the error is a
    /// `Backend` error.
    pub async fn advance(&mut self, prompt: Option<&str>) -> Result<ModelResponse> {
        if let Some(prompt) = prompt.filter(|p| !p.is_empty()) {
            self.push(Message::user(prompt));
        }

        if !self.pending.is_empty() {
            warn!(
                "Advancing conversation {} with {} tool call(s) still unanswered: {:?}",
                self.id,
                self.pending.len(),
                self.pending
            );
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: self.messages.clone(),
            tools: self.tools.clone(),
        };

        debug!(
            "Advancing conversation {} ({:?}, {} messages, {} tools)",
            self.id,
            self.mode,
            request.messages.len(),
            request.tools.len()
        );

        let response = match self.mode {
            CompletionMode::Blocking => self.backend.complete(&request).await,
            CompletionMode::Streaming => self.stream(&request).await,
        }
        .map_err(|e| match e {
            Error::Backend(_) => e,
            other => Error::Backend(other.to_string()),
        })?;

        self.pending = response.tool_calls.iter().map(|c| c.id.clone()).collect();
        self.push(Message::Assistant {
            content: if response.content.is_empty() {
                None
            } else {
                Some(response.content.clone())
            },
            tool_calls: response.tool_calls.clone(),
        });

        Ok(response)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ModelResponse> {
        let mut deltas = self.backend.complete_stream(request).await?;
        let mut acc = StreamAccumulator::new();
        while let Some(delta) = deltas.next().await {
            acc.apply(delta?);
        }
        Ok(acc.finish())
    }

    /// Append a tool result for `call_id`
    pub fn append_tool_result(&mut self, call_id: &str, content: impl Into<String>) {
        if let Some(pos) = self.pending.iter().position(|id| id == call_id) {
            self.pending.remove(pos);
        }
        self.push(Message::tool(call_id, content));
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The transcript so far
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn mode(&self) -> CompletionMode {
        self.mode
    }

    /// Tool schema advertised to the backend
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Tool call ids from the last assistant turn without a result yet
    pub fn pending_tool_calls(&self) -> &[String] {
        &self.pending
    }
}

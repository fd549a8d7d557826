//! Streaming completion support
//!
//! Server-sent-event line parsing and the reducer that folds a sequence of
//! [`ChatDelta`]s into one [`ModelResponse`].

use std::collections::BTreeMap;

use super::types::{ChatCompletionChunk, ChatDelta, ModelResponse, ToolCallRequest};
use crate::error::{Error, Result};

/// One parsed SSE line
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A `data:` payload carrying a delta
    Delta(ChatDelta),
    /// The `[DONE]` sentinel
    Done,
}

/// Parse one line of an SSE body.
///
/// Blank lines, comments and non-`data` fields yield `Ok(None)`.
pub fn parse_sse_line(line: &str) -> Result<Option<SseEvent>> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim_start();

    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }
    if data.is_empty() {
        return Ok(None);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| Error::Backend(format!("Malformed stream chunk: {}", e)))?;
    Ok(Some(SseEvent::Delta(chunk.into())))
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Pure reducer over streamed deltas
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    tool_calls: BTreeMap<u32, PartialToolCall>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta into the accumulated state
    pub fn apply(&mut self, delta: ChatDelta) {
        if let Some(text) = delta.content {
            self.content.push_str(&text);
        }
        for fragment in delta.tool_calls {
            let entry = self.tool_calls.entry(fragment.index).or_default();
            if let Some(id) = fragment.id {
                entry.id.push_str(&id);
            }
            if let Some(name) = fragment.name {
                entry.name.push_str(&name);
            }
            if let Some(arguments) = fragment.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    /// Finalize into a response; tool calls come out in ascending index order
    pub fn finish(self) -> ModelResponse {
        ModelResponse {
            content: self.content,
            tool_calls: self
                .tool_calls
                .into_values()
                .map(|partial| ToolCallRequest::new(partial.id, partial.name, partial.arguments))
                .collect(),
        }
    }
}

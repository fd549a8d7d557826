//! Agent module - conversation, chat backends and the tool-calling loop
//!
//! This module handles all LLM-facing functionality:
//! - OpenAI-compatible chat client, blocking or streamed
//! - Transcript management and streamed-delta reduction
//! - The bounded request/act/observe loop and its trace
//! - The orchestrator that owns connectors for one run

pub mod agentic_loop;
mod client;
mod conversation;
mod orchestrator;
mod stream;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use agentic_loop::{
    AgentLoopOutput, LoopCallback, LoopConfig, LoopOutcome, LoopStep, LoopTrace, NoOpCallback,
    ToolAction, ToolObservation,
};
pub use client::{ChatBackend, DeltaStream, OpenAiClient};
pub use conversation::{CompletionMode, ConversationModel};
pub use orchestrator::{Agent, AgentOptions, AgentState};
pub use stream::{parse_sse_line, SseEvent, StreamAccumulator};
pub use types::*;

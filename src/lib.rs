//! # mcpagent
//!
//! A tool-calling LLM agent that drives external tool servers over the
//! Model Context Protocol and grounds its prompts in retrieved context.
//!
//! ## Features
//!
//! - **MCP over stdio:** spawn tool servers, discover and invoke their tools
//! - **OpenAI-compatible backends:** blocking or streamed chat completions with retries
//! - **Bounded agent loop:** request, act, observe, with a per-run tool-call budget
//! - **Retrieval:** embed a directory of documents and inject the closest ones as context

pub mod agent;
pub mod config;
pub mod error;
pub mod market;
pub mod mcp;
pub mod memory;
pub mod tools;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");

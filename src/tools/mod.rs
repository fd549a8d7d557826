//! Tools module - connector abstraction and name routing
//!
//! Tools live in external processes. Each process is owned by a
//! `ToolConnector`; the `ToolRegistry` maps tool names to the connector
//! that serves them.
//!
//! ## Adding a New Connector
//!
//! 1. Implement the `ToolConnector` trait (see `crate::mcp::McpConnector`)
//! 2. Hand it to `crate::agent::Agent::new` alongside the other connectors

mod registry;
mod traits;

// Core trait and types
pub use traits::{ToolConnector, ToolDescriptor, ToolInvocationResult};

// Registry
pub use registry::ToolRegistry;

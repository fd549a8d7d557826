//! MCP (Model Context Protocol) module
//!
//! Connects the agent to external tool providers that implement the Model
//! Context Protocol over stdio.
//!
//! ## Architecture
//!
//! - **client**: MCP client for spawning and talking to one server process
//! - **protocol**: Wire protocol types (JSON-RPC based)
//! - **connector**: Adapts an MCP server to the `ToolConnector` lifecycle
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mcpagent::mcp::McpConnector;
//! use mcpagent::tools::ToolConnector;
//!
//! # async fn example() -> mcpagent::Result<()> {
//! let mut fetch = McpConnector::new("fetch", "uvx", vec!["mcp-server-fetch".into()]);
//! fetch.init().await?;
//!
//! let mut args = serde_json::Map::new();
//! args.insert("url".into(), "https://example.com".into());
//! let result = fetch.invoke("fetch", args).await;
//! println!("{}", result.to_content());
//!
//! fetch.close().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod connector;
mod protocol;

pub use client::McpClient;
pub use connector::McpConnector;
pub use protocol::{McpContent, McpError, McpRequest, McpResponse, McpTool, McpToolResult, PROTOCOL_VERSION};

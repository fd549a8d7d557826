//! Configuration types module

pub mod provider;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Agent configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Chat completion backend
    #[serde(default)]
    pub provider: provider::ProviderConfig,

    /// Embedding service
    #[serde(default)]
    pub embedding: provider::EmbeddingConfig,

    /// Knowledge index source
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Tool servers, in registration order
    #[serde(default = "default_servers")]
    pub servers: Vec<ServerConfig>,

    /// Logging
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            agent: AgentConfig::default(),
            provider: provider::ProviderConfig::default(),
            embedding: provider::EmbeddingConfig::default(),
            knowledge: KnowledgeConfig::default(),
            servers: default_servers(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, the config file and the environment
    pub fn from_env() -> crate::error::Result<Self> {
        crate::config::load_config()
    }
}

/// Agent-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// System prompt; empty means none
    #[serde(default)]
    pub system_prompt: String,
    /// Tool-call batches per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Request streamed completions
    #[serde(default)]
    pub stream: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            system_prompt: String::new(),
            max_iterations: default_max_iterations(),
            stream: false,
        }
    }
}

fn default_max_iterations() -> u32 {
    10
}

/// Where retrieval documents come from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Directory of text files; retrieval is skipped when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Documents injected as context
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        KnowledgeConfig {
            dir: None,
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

/// One MCP tool server launched over stdio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Name used in logs
    pub name: String,
    /// Executable to launch
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Client version reported in the handshake
    #[serde(default = "default_client_version")]
    pub version: String,
    /// Upper bound for each request to the server
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: &[&str]) -> Self {
        ServerConfig {
            name: name.into(),
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            version: default_client_version(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_client_version() -> String {
    "1.0.0".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

/// The fetch and filesystem servers
pub fn default_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig::new("fetch", "uvx", &["mcp-server-fetch"]),
        ServerConfig::new(
            "file",
            "npx",
            &["-y", "@modelcontextprotocol/server-filesystem", "."],
        ),
    ]
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "mcpagent=info".to_string()
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.agent.max_iterations, 10);
        assert!(!config.agent.stream);
        assert_eq!(config.knowledge.top_k, 3);
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert_eq!(config.servers.len(), 2);
    }

    #[test]
    fn test_default_servers() {
        let servers = default_servers();
        assert_eq!(servers[0].name, "fetch");
        assert_eq!(servers[0].command, "uvx");
        assert_eq!(servers[1].args.last().map(String::as_str), Some("."));
        assert_eq!(servers[1].request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_server_timeout_is_human_readable() {
        let server: ServerConfig = toml::from_str(
            r#"
            name = "stock"
            command = "node"
            args = ["mcp-stock-server.js"]
            request_timeout = "90s"
            "#,
        )
        .unwrap();
        assert_eq!(server.request_timeout, Duration::from_secs(90));
        assert_eq!(server.version, "1.0.0");
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}

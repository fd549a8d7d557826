//! Configuration module - Modular configuration management
//!
//! - types/mod.rs: Core configuration types (Config, AgentConfig, ServerConfig, etc.)
//! - types/provider.rs: Chat backend and embedding service configuration
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{
    default_servers, AgentConfig, Config, KnowledgeConfig, LogConfig, LogFormat, ServerConfig,
};

// Re-export provider types
pub use types::provider::{EmbeddingConfig, ProviderConfig};

// Re-export IO and utilities
pub use io::{
    apply_env_overrides, apply_overrides_from, load_config, load_config_from_path,
    read_config_snapshot, save_config, ConfigSnapshot,
};
pub use paths::{config_dir, config_path};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};

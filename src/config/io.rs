//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use secrecy::SecretString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::types::Config;
use crate::error::{Error, Result};

/// A snapshot of the configuration file
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// Path to the config file
    pub path: PathBuf,
    /// Whether the file exists
    pub exists: bool,
    /// Parsed configuration
    pub config: Option<Config>,
    /// Problems reading or parsing the file
    pub issues: Vec<String>,
}

/// Load configuration with layered precedence:
/// 1. Config file if it exists, otherwise defaults
/// 2. Environment variable overrides (includes `.env`)
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        debug!("Loading config from {}", config_path.display());
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().is_some_and(|ext| ext == "json") {
        // Parse as JSON5 (more lenient than strict JSON)
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads `.env` first, then overlays any set variables. Env vars have the
/// highest precedence: defaults < file < env.
pub fn apply_env_overrides(config: &mut Config) {
    dotenvy::dotenv().ok();
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides using `lookup` as the variable source
pub fn apply_overrides_from<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    // Chat backend
    if let Some(api_key) = var("OPENAI_API_KEY") {
        config.provider.api_key = SecretString::from(api_key);
    }
    if let Some(url) = var("OPENAI_BASE_URL") {
        config.provider.base_url = url;
    }
    if let Some(model) = var("AGENT_MODEL") {
        config.provider.model = model;
    }

    // Embedding service
    if let Some(url) = var("EMBEDDING_BASE_URL") {
        config.embedding.base_url = Some(url);
    }
    if let Some(key) = var("EMBEDDING_KEY") {
        config.embedding.api_key = SecretString::from(key);
    }
    if let Some(model) = var("EMBEDDING_MODEL") {
        config.embedding.model = model;
    }

    // Knowledge
    if let Some(dir) = var("KNOWLEDGE_DIR") {
        config.knowledge.dir = Some(PathBuf::from(dir));
    }

    // Agent
    if let Some(value) = var("AGENT_MAX_ITERATIONS") {
        match value.trim().parse() {
            Ok(v) => config.agent.max_iterations = v,
            Err(_) => warn!("Ignoring AGENT_MAX_ITERATIONS={:?}: not a number", value),
        }
    }
    if let Some(value) = var("AGENT_STREAM") {
        config.agent.stream = matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes");
    }

    // Logging
    if let Some(value) = var("LOG_FORMAT") {
        match value.parse() {
            Ok(format) => config.log.format = format,
            Err(e) => warn!("Ignoring LOG_FORMAT: {}", e),
        }
    }
}

/// Save configuration to a file (TOML for `.toml`, JSON otherwise)
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}

/// Read a configuration file into a snapshot
pub fn read_config_snapshot(path: &Path) -> ConfigSnapshot {
    if !path.exists() {
        return ConfigSnapshot {
            path: path.to_path_buf(),
            exists: false,
            config: None,
            issues: vec!["Configuration file does not exist; defaults apply".to_string()],
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigSnapshot {
            path: path.to_path_buf(),
            exists: true,
            config: Some(config),
            issues: Vec::new(),
        },
        Err(e) => ConfigSnapshot {
            path: path.to_path_buf(),
            exists: true,
            config: None,
            issues: vec![e.to_string()],
        },
    }
}

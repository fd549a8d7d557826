//! Configuration validation
//!
//! Validates configuration and reports issues.

use secrecy::ExposeSecret;
use std::collections::HashSet;
use std::fmt;

use super::types::Config;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_agent_config(config, result);
    result = validate_provider_config(config, result);
    result = validate_retrieval_config(config, result);
    result = validate_servers(config, result);

    result
}

fn check_url(raw: &str) -> Result<(), String> {
    let parsed = url::Url::parse(raw).map_err(|e| e.to_string())?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}

fn validate_agent_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.agent.max_iterations == 0 {
        result = result.with_error(
            ValidationIssue::new("agent.max_iterations", "Must be at least 1")
                .with_suggestion("The default is 10"),
        );
    }
    result
}

fn validate_provider_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.provider.model.trim().is_empty() {
        result = result.with_error(
            ValidationIssue::new("provider.model", "No model configured")
                .with_suggestion("Set AGENT_MODEL or provider.model"),
        );
    }

    if let Err(e) = check_url(&config.provider.base_url) {
        result = result.with_error(
            ValidationIssue::new(
                "provider.base_url",
                format!("Invalid URL '{}': {}", config.provider.base_url, e),
            )
            .with_suggestion("Use an http(s) URL such as https://api.openai.com/v1"),
        );
    }

    if config.provider.api_key.expose_secret().is_empty() {
        result = result.with_warning(
            ValidationIssue::new(
                "provider.api_key",
                "No API key configured. Only keyless OpenAI-compatible servers will work.",
            )
            .with_suggestion("Set the OPENAI_API_KEY environment variable"),
        );
    }

    result
}

fn validate_retrieval_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if let Some(ref base_url) = config.embedding.base_url {
        if let Err(e) = check_url(base_url) {
            result = result.with_error(ValidationIssue::new(
                "embedding.base_url",
                format!("Invalid URL '{}': {}", base_url, e),
            ));
        }
        if config.embedding.api_key.expose_secret().is_empty() {
            result = result.with_warning(
                ValidationIssue::new("embedding.api_key", "Embedding service configured without a key")
                    .with_suggestion("Set the EMBEDDING_KEY environment variable"),
            );
        }
    }

    if let Some(ref dir) = config.knowledge.dir {
        if !dir.is_dir() {
            result = result.with_warning(
                ValidationIssue::new(
                    "knowledge.dir",
                    format!("Knowledge directory does not exist: {}", dir.display()),
                )
                .with_suggestion("Create the directory or unset KNOWLEDGE_DIR"),
            );
        }
        if config.embedding.base_url.is_none() {
            result = result.with_warning(
                ValidationIssue::new(
                    "embedding.base_url",
                    "Knowledge directory set but no embedding service; retrieval will fail",
                )
                .with_suggestion("Set the EMBEDDING_BASE_URL environment variable"),
            );
        }
        if config.knowledge.top_k == 0 {
            result = result.with_warning(ValidationIssue::new(
                "knowledge.top_k",
                "top_k is 0, no context will be injected",
            ));
        }
    }

    result
}

fn validate_servers(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let mut seen = HashSet::new();

    for (i, server) in config.servers.iter().enumerate() {
        let path = format!("servers[{}]", i);

        if server.name.trim().is_empty() {
            result = result.with_error(ValidationIssue::new(format!("{}.name", path), "Server name is empty"));
        } else if !seen.insert(server.name.as_str()) {
            result = result.with_error(
                ValidationIssue::new(
                    format!("{}.name", path),
                    format!("Duplicate server name '{}'", server.name),
                )
                .with_suggestion("Give every server a unique name"),
            );
        }

        if server.command.trim().is_empty() {
            result = result.with_error(ValidationIssue::new(
                format!("{}.command", path),
                "Server command is empty",
            ));
        } else if which::which(&server.command).is_err() {
            result = result.with_warning(
                ValidationIssue::new(
                    format!("{}.command", path),
                    format!("'{}' was not found on PATH", server.command),
                )
                .with_suggestion(format!("Install '{}' or fix the command", server.command)),
            );
        }
    }

    result
}

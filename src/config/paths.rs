//! Configuration paths
//!
//! `MCPAGENT_CONFIG_DIR` and `MCPAGENT_CONFIG` override the platform
//! defaults.

use std::path::PathBuf;

const APP_DIR: &str = "mcpagent";
const CONFIG_FILE: &str = "config.toml";

/// Get the configuration directory
pub fn config_dir() -> PathBuf {
    resolve_dir(std::env::var("MCPAGENT_CONFIG_DIR").ok())
}

/// Get the main configuration file path
pub fn config_path() -> PathBuf {
    resolve_path(std::env::var("MCPAGENT_CONFIG").ok(), config_dir)
}

fn resolve_dir(override_dir: Option<String>) -> PathBuf {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }

    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .map(|base| base.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR)))
}

fn resolve_path(override_path: Option<String>, dir: impl FnOnce() -> PathBuf) -> PathBuf {
    match override_path.filter(|p| !p.is_empty()) {
        Some(path) => PathBuf::from(path),
        None => dir().join(CONFIG_FILE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dir_is_app_scoped() {
        let dir = resolve_dir(None);
        let name = dir.file_name().and_then(|n| n.to_str());
        assert!(
            matches!(name, Some("mcpagent") | Some(".mcpagent")),
            "unexpected config dir {}",
            dir.display()
        );
    }

    #[test]
    fn test_overrides_win() {
        assert_eq!(resolve_dir(Some("/etc/agent".into())), PathBuf::from("/etc/agent"));
        assert_eq!(
            resolve_path(Some("/tmp/agent.json".into()), || PathBuf::from("/unused")),
            PathBuf::from("/tmp/agent.json")
        );
        // Empty overrides are ignored
        assert_eq!(resolve_dir(Some(String::new())), resolve_dir(None));
    }

    #[test]
    fn test_default_path_is_config_toml_in_dir() {
        let path = resolve_path(None, || PathBuf::from("/home/u/.config/mcpagent"));
        assert_eq!(path, PathBuf::from("/home/u/.config/mcpagent/config.toml"));
    }
}

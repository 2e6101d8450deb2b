//! Config file locations

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Project-level config file name
pub const PROJECT_CONFIG_FILE: &str = "repolens.toml";

/// `~/.config/repolens/config.toml` (platform equivalent)
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("repolens").join("config.toml"))
}

pub fn project_config_path(dir: &Path) -> PathBuf {
    dir.join(PROJECT_CONFIG_FILE)
}

const EXAMPLE_CONFIG: &str = r#"# repolens user configuration

[limits]
# max_file_bytes = 5242880
# max_files = 10000
# max_total_bytes = 524288000

[timeouts]
# overall_secs = 600
# fetch_secs = 120
# per_file_ms = 5000
# narrative_secs = 30

[llm]
# Backend: "groq" (default), "openai" or "ollama" (local, no key)
# backend = "groq"
# model = "llama-3.1-8b-instant"
# enabled = true
# Keys are read from GROQ_API_KEY / OPENAI_API_KEY

[storage]
# data_dir = "/path/to/results"
# work_dir = "/path/to/scratch"
"#;

/// Create the user config directory and an example config if missing.
pub fn init_user_config() -> Result<PathBuf> {
    let config_path =
        user_config_path().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    if !config_path.exists() {
        std::fs::write(&config_path, EXAMPLE_CONFIG)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
    }

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_user_config_path_shape() {
        if let Some(p) = user_config_path() {
            assert!(p.ends_with("repolens/config.toml"));
        }
    }

    #[test]
    fn test_example_config_parses_to_defaults() {
        let parsed: Config = toml::from_str(EXAMPLE_CONFIG).expect("should parse example config");
        assert_eq!(parsed, Config::default());
    }
}

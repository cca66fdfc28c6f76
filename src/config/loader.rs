//! # Configuration Loader
//!
//! Unified configuration loading from files, environment, and defaults.
//! Implements layered configuration with precedence rules.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, FileFormat};
use validator::Validate;

use crate::domain::error::{Error, Result};

use super::types::Config;

/// Embedded default configuration from `config/default.toml`.
/// This is the single source of truth for default values in the binary.
/// Works from any working directory because it's compiled into the binary.
const DEFAULT_CONFIG_TOML: &str = include_str!("../../config/default.toml");

/// Returns the embedded default config TOML for testing purposes.
pub fn get_default_config_toml() -> &'static str {
    DEFAULT_CONFIG_TOML
}

/// Load only embedded defaults without a user config file or environment
/// variables. Useful for testing that embedded defaults are correctly set.
pub async fn load_embedded_defaults_only() -> Result<Config> {
    let config = ConfigBuilder::builder()
        .add_source(config::File::from_str(
            DEFAULT_CONFIG_TOML,
            FileFormat::Toml,
        ))
        .build()
        .map_err(|e| Error::config(format!("failed to build configuration: {e}")))?;

    let config: Config = config
        .try_deserialize()
        .map_err(|e| Error::config(format!("failed to deserialize configuration: {e}")))?;

    config
        .validate()
        .map_err(|e| Error::config(format!("configuration validation failed: {e}")))?;

    Ok(config)
}

/// Configuration loader for TOML-based application settings.
///
/// Handles loading configuration from embedded defaults, an optional XDG
/// user file, and `CLAUDE_RAG_`-prefixed environment variables.
#[derive(Debug, Clone, Copy)]
pub struct ConfigLoader;

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader instance with default settings.
    pub fn new() -> Self {
        Self
    }

    /// Load configuration from embedded defaults, the XDG user file (if
    /// present), and environment variables.
    ///
    /// Merges configuration sources in order of increasing precedence:
    /// 1. Embedded TOML defaults
    /// 2. `$XDG_CONFIG_HOME/claude-rag-engine/config.toml`, if present
    /// 3. `CLAUDE_RAG_`-prefixed environment variables, `__`-separated
    pub async fn load(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::builder().add_source(config::File::from_str(
            DEFAULT_CONFIG_TOML,
            FileFormat::Toml,
        ));

        if let Some(dir) = dirs::config_dir() {
            let user_config_path = dir.join("claude-rag-engine").join("config.toml");
            if user_config_path.exists() {
                builder = builder.add_source(config::File::from(user_config_path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CLAUDE_RAG")
                .separator("__")
                .try_parsing(true),
        );

        self.build(builder).await
    }

    /// Load configuration from embedded defaults, a specific file, and
    /// environment variables (same precedence as [`Self::load`] but with an
    /// explicit file path instead of the XDG default location).
    pub async fn load_with_file(&self, path: &Path) -> Result<Config> {
        let mut builder = ConfigBuilder::builder()
            .add_source(config::File::from_str(
                DEFAULT_CONFIG_TOML,
                FileFormat::Toml,
            ))
            .add_source(config::File::from(path).required(false));

        builder = builder.add_source(
            Environment::with_prefix("CLAUDE_RAG")
                .separator("__")
                .try_parsing(true),
        );

        self.build(builder).await
    }

    async fn build(&self, builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Config> {
        let config = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build configuration: {e}")))?;

        let config: Config = config
            .try_deserialize()
            .map_err(|e| Error::config(format!("failed to deserialize configuration: {e}")))?;

        config
            .validate()
            .map_err(|e| Error::config(format!("configuration validation failed: {e}")))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedded_defaults_parse_and_validate() {
        let config = load_embedded_defaults_only().await.unwrap();
        assert_eq!(config.query.default_limit, 10);
        assert_eq!(config.embedding.provider, "fastembed");
    }

    #[tokio::test]
    async fn environment_override_takes_precedence_over_defaults() {
        std::env::set_var("CLAUDE_RAG_QUERY__ALPHA", "0.3");
        let loaded = ConfigLoader::new().load().await.unwrap();
        std::env::remove_var("CLAUDE_RAG_QUERY__ALPHA");
        assert!((loaded.query.alpha - 0.3).abs() < f32::EPSILON);
    }
}

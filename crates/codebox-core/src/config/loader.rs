//! Configuration loader for YAML files and environment overrides
//!
//! Resolution order: built-in defaults, then the optional YAML file, then
//! `CODEBOX_*` environment variables. Callers apply their own flags on top
//! and call `validate()` last.

use crate::config::types::*;
use crate::errors::CodeboxError;
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const ENV_IMAGE: &str = "CODEBOX_IMAGE";
pub const ENV_TIMEOUT_SECS: &str = "CODEBOX_TIMEOUT_SECS";
pub const ENV_MEMORY_MB: &str = "CODEBOX_MEMORY_MB";
pub const ENV_CPUS: &str = "CODEBOX_CPUS";
pub const ENV_ENGINE_HOST: &str = "CODEBOX_ENGINE_HOST";
pub const ENV_WORKSPACE_DIR: &str = "CODEBOX_WORKSPACE_DIR";

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from an optional file, applying environment overrides.
    /// A missing path means defaults plus environment.
    pub async fn load(path: Option<&Path>) -> Result<CodeboxConfig, CodeboxError> {
        let mut config = match path {
            Some(path) => Self::read_file(path).await?,
            None => CodeboxConfig::default(),
        };
        Self::apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<CodeboxConfig, CodeboxError> {
        let config = Self::read_file(path.as_ref()).await?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<CodeboxConfig, CodeboxError> {
        let config = Self::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    async fn read_file(path: &Path) -> Result<CodeboxConfig, CodeboxError> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            CodeboxError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        log::debug!("Loaded configuration file {}", path.display());
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<CodeboxConfig, CodeboxError> {
        // serde_yaml rejects an empty document, treat it as all-defaults
        if content.trim().is_empty() {
            return Ok(CodeboxConfig::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `CODEBOX_*` environment variables on top of `config`.
    pub fn apply_env_overrides(config: &mut CodeboxConfig) -> Result<(), CodeboxError> {
        if let Some(image) = non_empty_var(ENV_IMAGE) {
            log::debug!("{} overrides sandbox image", ENV_IMAGE);
            config.sandbox.image = image;
        }
        if let Some(value) = non_empty_var(ENV_TIMEOUT_SECS) {
            config.limits.timeout_secs = parse_var(ENV_TIMEOUT_SECS, &value)?;
        }
        if let Some(value) = non_empty_var(ENV_MEMORY_MB) {
            config.limits.memory_mb = parse_var(ENV_MEMORY_MB, &value)?;
        }
        if let Some(value) = non_empty_var(ENV_CPUS) {
            config.limits.cpus = parse_var(ENV_CPUS, &value)?;
        }
        if let Some(host) = non_empty_var(ENV_ENGINE_HOST) {
            config.engine.host = Some(host);
        }
        if let Some(dir) = non_empty_var(ENV_WORKSPACE_DIR) {
            config.sandbox.workspace_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, CodeboxError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| {
        CodeboxError::config(format!("Invalid value '{}' for {}: {}", value, key, e))
    })
}

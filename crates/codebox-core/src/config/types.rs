//! Configuration type definitions
//!
//! Every section has defaults, so an empty YAML document (or no file at all)
//! yields a usable configuration. Limits are always populated; there is no
//! "unlimited" setting.

use crate::errors::CodeboxError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CodeboxConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Engine address (`unix:///var/run/docker.sock`, `tcp://host:2375`).
    /// Local defaults are used when unset.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_engine_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxConfig {
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_mount_path")]
    pub mount_path: String,
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// Parent directory for per-request workspaces. System temp dir if unset.
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,
    #[serde(default = "default_true")]
    pub pull_missing_image: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,
    #[serde(default = "default_cpus")]
    pub cpus: f64,
    #[serde(default = "default_pids_limit")]
    pub pids_limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Resource limits applied to one sandbox.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimits {
    pub timeout: Duration,
    pub memory_bytes: u64,
    pub cpus: f64,
    pub pids_limit: i64,
}

impl ResourceLimits {
    /// Docker expresses CPU quota in billionths of a CPU.
    pub fn nano_cpus(&self) -> i64 {
        (self.cpus * 1_000_000_000.0).round() as i64
    }
}

fn default_engine_timeout_secs() -> u64 {
    120
}

fn default_image() -> String {
    "python:3.10".to_string()
}

fn default_interpreter() -> String {
    "python".to_string()
}

fn default_mount_path() -> String {
    "/code".to_string()
}

fn default_file_name() -> String {
    "code.py".to_string()
}

fn default_max_source_bytes() -> usize {
    1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_memory_mb() -> u64 {
    256
}

fn default_cpus() -> f64 {
    1.0
}

fn default_pids_limit() -> i64 {
    64
}

fn default_bind_addr() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: None,
            connect_timeout_secs: default_engine_timeout_secs(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            interpreter: default_interpreter(),
            mount_path: default_mount_path(),
            file_name: default_file_name(),
            workspace_dir: None,
            max_source_bytes: default_max_source_bytes(),
            pull_missing_image: true,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            memory_mb: default_memory_mb(),
            cpus: default_cpus(),
            pids_limit: default_pids_limit(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_cors: true,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl SandboxConfig {
    /// Path of the staged file as seen from inside the container.
    pub fn script_path_in_container(&self) -> String {
        format!("{}/{}", self.mount_path.trim_end_matches('/'), self.file_name)
    }

    pub fn entry_command(&self) -> Vec<String> {
        vec![self.interpreter.clone(), self.script_path_in_container()]
    }
}

/// Largest memory limit Docker can represent: it takes the byte count as `i64`.
pub const MAX_MEMORY_MB: u64 = (i64::MAX as u64) / BYTES_PER_MB;

const BYTES_PER_MB: u64 = 1024 * 1024;

impl LimitsConfig {
    pub fn to_resource_limits(&self) -> ResourceLimits {
        ResourceLimits {
            timeout: Duration::from_secs(self.timeout_secs),
            memory_bytes: self.memory_mb.saturating_mul(BYTES_PER_MB),
            cpus: self.cpus,
            pids_limit: self.pids_limit,
        }
    }
}

impl CodeboxConfig {
    pub fn validate(&self) -> Result<(), CodeboxError> {
        let image = &self.sandbox.image;
        match image.rsplit_once(':') {
            Some((name, tag)) if !name.is_empty() && !tag.is_empty() && !tag.contains('/') => {
                if tag == "latest" {
                    return Err(CodeboxError::config(format!(
                        "Sandbox image '{}' must be pinned to a specific tag, not 'latest'",
                        image
                    )));
                }
            }
            _ => {
                return Err(CodeboxError::config(format!(
                    "Sandbox image '{}' must be of the form name:tag",
                    image
                )));
            }
        }

        if self.sandbox.interpreter.trim().is_empty() {
            return Err(CodeboxError::config("Sandbox interpreter cannot be empty"));
        }
        if !self.sandbox.mount_path.starts_with('/') {
            return Err(CodeboxError::config(format!(
                "Sandbox mount path '{}' must be absolute",
                self.sandbox.mount_path
            )));
        }
        let file_name = &self.sandbox.file_name;
        if file_name.is_empty() || file_name.contains('/') || file_name == "." || file_name == ".." {
            return Err(CodeboxError::config(format!(
                "Sandbox file name '{}' must be a plain file name",
                file_name
            )));
        }
        if self.sandbox.max_source_bytes == 0 {
            return Err(CodeboxError::config("max_source_bytes must be greater than 0"));
        }

        if self.limits.timeout_secs == 0 {
            return Err(CodeboxError::config("Timeout must be greater than 0 seconds"));
        }
        if self.limits.memory_mb < 6 {
            // Docker refuses memory limits below 6MB.
            return Err(CodeboxError::config("Memory limit must be at least 6 MB"));
        }
        if self.limits.memory_mb > MAX_MEMORY_MB {
            return Err(CodeboxError::config(format!(
                "Memory limit of {} MB is larger than the engine accepts ({} MB)",
                self.limits.memory_mb, MAX_MEMORY_MB
            )));
        }
        if !self.limits.cpus.is_finite() || self.limits.cpus <= 0.0 {
            return Err(CodeboxError::config("CPU limit must be a positive number"));
        }
        if self.limits.pids_limit <= 0 {
            return Err(CodeboxError::config("pids_limit must be greater than 0"));
        }

        if self.engine.connect_timeout_secs == 0 {
            return Err(CodeboxError::config(
                "Engine connect timeout must be greater than 0 seconds",
            ));
        }

        Ok(())
    }
}

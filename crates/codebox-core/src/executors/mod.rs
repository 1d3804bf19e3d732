//! Sandboxed execution on top of a container engine.
//!
//! `ContainerEngine` is the seam to the engine daemon. `DockerEngine` talks to
//! Docker through bollard; `SandboxRunner` drives any engine through one
//! create/start/wait/collect/remove cycle per request.

use async_trait::async_trait;
use crate::errors::EngineError;

pub mod docker;
pub mod runner;

pub use docker::DockerEngine;
pub use runner::SandboxRunner;

/// Everything the engine needs to create one sandbox container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    /// Host directory bound read-write at `mount_path`.
    pub host_dir: String,
    pub mount_path: String,
    /// `uid:gid` the program runs as, so what it writes stays removable.
    pub user: Option<String>,
    pub memory_bytes: i64,
    pub nano_cpus: i64,
    pub pids_limit: i64,
}

/// Output collected after the container stopped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub combined: String,
}

impl CapturedOutput {
    pub fn push_stdout(&mut self, chunk: &str) {
        self.stdout.push_str(chunk);
        self.combined.push_str(chunk);
    }

    pub fn push_stderr(&mut self, chunk: &str) {
        self.stderr.push_str(chunk);
        self.combined.push_str(chunk);
    }
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Connectivity check, run before every request.
    async fn ping(&self) -> Result<(), EngineError>;

    async fn image_exists(&self, image: &str) -> Result<bool, EngineError>;

    async fn pull_image(&self, image: &str) -> Result<(), EngineError>;

    /// Returns the engine's container id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    /// Block until the container stops; returns its exit status.
    async fn wait_container(&self, id: &str) -> Result<i64, EngineError>;

    async fn collect_output(&self, id: &str) -> Result<CapturedOutput, EngineError>;

    async fn kill_container(&self, id: &str) -> Result<(), EngineError>;

    /// Force removal, including anonymous volumes.
    async fn remove_container(&self, id: &str) -> Result<(), EngineError>;
}

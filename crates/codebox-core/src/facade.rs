//! Entry point for one execution request.
//!
//! `CodeRunner::run_request` validates the source, stages it, runs it and
//! classifies the outcome. The workspace is closed explicitly once the sandbox
//! is gone; its drop guard covers the paths that never get that far.

use std::sync::Arc;
use std::time::Instant;

use crate::config::{CodeboxConfig, ResourceLimits};
use crate::errors::{CodeboxError, EngineError};
use crate::executors::{ContainerEngine, DockerEngine, SandboxRunner};
use crate::reporter::{classify, ExecutionResult};
use crate::request::ExecutionRequest;
use crate::workspace::WorkspaceManager;

#[derive(Clone)]
pub struct CodeRunner {
    workspaces: WorkspaceManager,
    runner: SandboxRunner,
    limits: ResourceLimits,
    max_source_bytes: usize,
}

impl CodeRunner {
    /// Build a runner around an explicit engine client.
    pub fn new(engine: Arc<dyn ContainerEngine>, config: &CodeboxConfig) -> Self {
        Self {
            workspaces: WorkspaceManager::new(
                config.sandbox.workspace_dir.clone(),
                config.sandbox.file_name.clone(),
            ),
            runner: SandboxRunner::new(engine, config.sandbox.clone()),
            limits: config.limits.to_resource_limits(),
            max_source_bytes: config.sandbox.max_source_bytes,
        }
    }

    /// Build a runner backed by Docker as described by `config.engine`.
    pub fn with_docker(config: &CodeboxConfig) -> Result<Self, EngineError> {
        let engine = DockerEngine::connect(&config.engine)?;
        Ok(Self::new(Arc::new(engine), config))
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn sandbox(&self) -> &SandboxRunner {
        &self.runner
    }

    /// Run `source_text` in a fresh sandbox.
    ///
    /// Returns `Err` only for input that fails validation and for workspace
    /// staging failures. Everything that happens once a sandbox is involved,
    /// engine faults included, comes back as an `ExecutionResult`.
    pub async fn run_request(&self, source_text: &str) -> Result<ExecutionResult, CodeboxError> {
        let request = ExecutionRequest::new(source_text, self.max_source_bytes)?;
        let started = Instant::now();
        log::info!(
            "Request {} received ({} bytes, image {})",
            request.id(),
            request.source_text().len(),
            self.runner.sandbox_config().image
        );

        let workspace = self.workspaces.stage(&request).await?;
        let raw = self.runner.execute(&workspace, &self.limits).await;
        if let Err(e) = workspace.close() {
            log::warn!("Request {}: {}", request.id(), e);
        }

        let result = classify(raw);
        log::info!(
            "Request {} finished as {} in {:?}",
            request.id(),
            result.kind(),
            started.elapsed()
        );
        Ok(result)
    }
}

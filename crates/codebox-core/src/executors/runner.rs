//! One-shot sandbox lifecycle
//!
//! `execute` never returns an error: every failure is folded into a
//! `RawOutcome` so the reporter can classify it. Containers are wrapped in a
//! `SandboxHandle` as soon as they exist; the handle is consumed by
//! `teardown`, and if it is dropped without that (the request future was
//! cancelled) it schedules the removal itself.

use std::sync::Arc;
use std::time::Duration;

use super::{ContainerEngine, ContainerSpec};
use crate::config::{ResourceLimits, SandboxConfig};
use crate::errors::EngineError;
use crate::reporter::RawOutcome;
use crate::workspace::Workspace;

struct SandboxHandle {
    engine: Arc<dyn ContainerEngine>,
    container_id: String,
    released: bool,
}

impl SandboxHandle {
    /// Force-remove the container. Consumes the handle, so it runs once.
    ///
    /// The removal runs as its own task: if the caller is cancelled while it
    /// is in flight, it still completes and `Drop` does not start another.
    async fn teardown(mut self) {
        self.released = true;
        let engine = self.engine.clone();
        let id = std::mem::take(&mut self.container_id);
        let removal = tokio::spawn(async move {
            let removed = engine.remove_container(&id).await;
            (id, removed)
        });
        match removal.await {
            Ok((id, Ok(()))) => log::debug!("Removed container {}", id),
            Ok((id, Err(e))) => log::warn!("Failed to remove container {}: {}", id, e),
            Err(e) => log::warn!("Container removal task failed: {}", e),
        }
    }
}

impl Drop for SandboxHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let engine = self.engine.clone();
        let id = std::mem::take(&mut self.container_id);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                log::warn!("Sandbox {} dropped before teardown, removing in background", id);
                runtime.spawn(async move {
                    if let Err(e) = engine.remove_container(&id).await {
                        log::warn!("Background removal of container {} failed: {}", id, e);
                    }
                });
            }
            Err(_) => log::error!("Sandbox {} leaked: no runtime available to remove it", id),
        }
    }
}

#[derive(Clone)]
pub struct SandboxRunner {
    engine: Arc<dyn ContainerEngine>,
    sandbox: SandboxConfig,
}

impl SandboxRunner {
    pub fn new(engine: Arc<dyn ContainerEngine>, sandbox: SandboxConfig) -> Self {
        Self { engine, sandbox }
    }

    pub fn sandbox_config(&self) -> &SandboxConfig {
        &self.sandbox
    }

    pub fn engine(&self) -> Arc<dyn ContainerEngine> {
        self.engine.clone()
    }

    pub async fn health_check(&self) -> Result<(), EngineError> {
        self.engine.ping().await
    }

    /// Make sure the pinned image is available locally, pulling it if allowed.
    pub async fn ensure_image(&self) -> Result<(), EngineError> {
        let image = &self.sandbox.image;
        if self.engine.image_exists(image).await? {
            return Ok(());
        }
        if !self.sandbox.pull_missing_image {
            return Err(EngineError::ImageUnavailable {
                image: image.clone(),
                message: "image is not present and pulling is disabled".to_string(),
            });
        }
        self.engine.pull_image(image).await
    }

    pub fn container_spec(
        &self,
        workspace: &Workspace,
        limits: &ResourceLimits,
    ) -> Result<ContainerSpec, String> {
        let host_dir = workspace.host_path_str().map_err(|e| e.to_string())?;
        let memory_bytes = i64::try_from(limits.memory_bytes).map_err(|_| {
            format!(
                "Memory limit of {} bytes does not fit the engine's range",
                limits.memory_bytes
            )
        })?;
        Ok(ContainerSpec {
            name: format!("codebox-{}", workspace.request_id().simple()),
            image: self.sandbox.image.clone(),
            cmd: self.sandbox.entry_command(),
            host_dir: host_dir.to_string(),
            mount_path: self.sandbox.mount_path.clone(),
            user: workspace.owner(),
            memory_bytes,
            nano_cpus: limits.nano_cpus(),
            pids_limit: limits.pids_limit,
        })
    }

    pub async fn execute(&self, workspace: &Workspace, limits: &ResourceLimits) -> RawOutcome {
        if let Err(e) = self.health_check().await {
            log::error!("Engine health check failed: {}", e);
            return engine_fault(e);
        }
        if let Err(e) = self.ensure_image().await {
            log::error!("Image {} unavailable: {}", self.sandbox.image, e);
            return engine_fault(e);
        }

        let spec = match self.container_spec(workspace, limits) {
            Ok(spec) => spec,
            Err(message) => {
                log::error!("Cannot build container for {}: {}", workspace.request_id(), message);
                return RawOutcome::EngineFault { message };
            }
        };

        let container_id = match self.engine.create_container(&spec).await {
            Ok(id) => id,
            Err(e) => {
                log::error!("Failed to create container {}: {}", spec.name, e);
                return engine_fault(e);
            }
        };
        let handle = SandboxHandle {
            engine: self.engine.clone(),
            container_id,
            released: false,
        };
        log::debug!("Created container {} ({})", spec.name, handle.container_id);

        let outcome = self.drive(&handle.container_id, limits.timeout).await;
        handle.teardown().await;
        outcome
    }

    async fn drive(&self, id: &str, limit: Duration) -> RawOutcome {
        if let Err(e) = self.engine.start_container(id).await {
            log::error!("Failed to start container {}: {}", id, e);
            return engine_fault(e);
        }

        let exit_code = match tokio::time::timeout(limit, self.engine.wait_container(id)).await {
            Err(_) => {
                log::warn!("Execution timed out for container {}", id);
                if let Err(e) = self.engine.kill_container(id).await {
                    log::warn!("Failed to kill timed out container {}: {}", id, e);
                }
                return RawOutcome::TimedOut { limit };
            }
            Ok(Err(e)) => {
                log::error!("Failed waiting for container {}: {}", id, e);
                return engine_fault(e);
            }
            Ok(Ok(code)) => code,
        };

        match self.engine.collect_output(id).await {
            Ok(output) => RawOutcome::Exited {
                exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
                combined: output.combined,
            },
            Err(e) => {
                log::error!("Failed to read output of container {}: {}", id, e);
                engine_fault(e)
            }
        }
    }
}

fn engine_fault(e: EngineError) -> RawOutcome {
    RawOutcome::EngineFault {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ExecutionRequest;
    use crate::test_utils::{FakeBehavior, FakeEngine};
    use crate::workspace::WorkspaceManager;
    use tempfile::TempDir;

    fn limits(timeout: Duration) -> ResourceLimits {
        ResourceLimits {
            timeout,
            memory_bytes: 64 * 1024 * 1024,
            cpus: 0.5,
            pids_limit: 16,
        }
    }

    async fn staged(source: &str) -> (TempDir, Workspace) {
        let parent = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(Some(parent.path().to_path_buf()), "code.py");
        let request = ExecutionRequest::new(source, 1024).unwrap();
        let workspace = manager.stage(&request).await.unwrap();
        (parent, workspace)
    }

    fn runner(engine: &FakeEngine) -> SandboxRunner {
        SandboxRunner::new(Arc::new(engine.clone()), SandboxConfig::default())
    }

    #[tokio::test]
    async fn test_successful_run_is_torn_down_once() {
        let engine = FakeEngine::new(FakeBehavior::exits(0, "hello\n", ""));
        let (_parent, workspace) = staged("print('hello')").await;

        let outcome = runner(&engine)
            .execute(&workspace, &limits(Duration::from_secs(5)))
            .await;

        match outcome {
            RawOutcome::Exited {
                exit_code, combined, ..
            } => {
                assert_eq!(exit_code, 0);
                assert_eq!(combined, "hello\n");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(engine.created().len(), 1);
        assert_eq!(engine.removed(), engine.created_ids());
    }

    #[tokio::test]
    async fn test_spec_carries_limits_mount_and_command() {
        let engine = FakeEngine::new(FakeBehavior::exits(0, "", ""));
        let (_parent, workspace) = staged("pass").await;

        runner(&engine)
            .execute(&workspace, &limits(Duration::from_secs(5)))
            .await;

        let spec = &engine.created()[0];
        assert_eq!(spec.image, "python:3.10");
        assert_eq!(spec.cmd, vec!["python", "/code/code.py"]);
        assert_eq!(spec.mount_path, "/code");
        assert_eq!(spec.host_dir, workspace.root_path().to_str().unwrap());
        assert_eq!(spec.memory_bytes, 64 * 1024 * 1024);
        assert_eq!(spec.nano_cpus, 500_000_000);
        assert_eq!(spec.pids_limit, 16);
        assert_eq!(engine.staged_sources(), vec!["pass".to_string()]);
    }

    #[tokio::test]
    async fn test_timeout_kills_and_removes() {
        let mut behavior = FakeBehavior::exits(0, "", "");
        behavior.run_for = Duration::from_secs(30);
        let engine = FakeEngine::new(behavior);
        let (_parent, workspace) = staged("import time; time.sleep(30)").await;

        let outcome = runner(&engine)
            .execute(&workspace, &limits(Duration::from_millis(50)))
            .await;

        assert_eq!(
            outcome,
            RawOutcome::TimedOut {
                limit: Duration::from_millis(50)
            }
        );
        assert_eq!(engine.killed(), engine.created_ids());
        assert_eq!(engine.removed(), engine.created_ids());
    }

    #[tokio::test]
    async fn test_finishing_under_the_limit_is_not_a_timeout() {
        let mut behavior = FakeBehavior::exits(3, "", "bad\n");
        behavior.run_for = Duration::from_millis(20);
        let engine = FakeEngine::new(behavior);
        let (_parent, workspace) = staged("raise SystemExit(3)").await;

        let outcome = runner(&engine)
            .execute(&workspace, &limits(Duration::from_secs(5)))
            .await;

        assert!(matches!(outcome, RawOutcome::Exited { exit_code: 3, .. }));
        assert!(engine.killed().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_engine_creates_nothing() {
        let mut behavior = FakeBehavior::exits(0, "", "");
        behavior.unreachable = true;
        let engine = FakeEngine::new(behavior);
        let (_parent, workspace) = staged("print(1)").await;

        let outcome = runner(&engine)
            .execute(&workspace, &limits(Duration::from_secs(5)))
            .await;

        assert!(matches!(outcome, RawOutcome::EngineFault { .. }));
        assert!(engine.created().is_empty());
    }

    #[tokio::test]
    async fn test_missing_image_is_pulled_or_reported() {
        let mut behavior = FakeBehavior::exits(0, "ok", "");
        behavior.image_present = false;
        let engine = FakeEngine::new(behavior.clone());
        let (_parent, workspace) = staged("print('ok')").await;
        let outcome = runner(&engine)
            .execute(&workspace, &limits(Duration::from_secs(5)))
            .await;
        assert!(matches!(outcome, RawOutcome::Exited { exit_code: 0, .. }));
        assert_eq!(engine.pulled(), vec!["python:3.10".to_string()]);

        behavior.pull_fails = true;
        let engine = FakeEngine::new(behavior);
        let outcome = runner(&engine)
            .execute(&workspace, &limits(Duration::from_secs(5)))
            .await;
        match outcome {
            RawOutcome::EngineFault { message } => assert!(message.contains("python:3.10")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(engine.created().is_empty());
    }

    #[tokio::test]
    async fn test_start_failure_still_tears_down() {
        let mut behavior = FakeBehavior::exits(0, "", "");
        behavior.start_fails = true;
        let engine = FakeEngine::new(behavior);
        let (_parent, workspace) = staged("print(1)").await;

        let outcome = runner(&engine)
            .execute(&workspace, &limits(Duration::from_secs(5)))
            .await;

        assert!(matches!(outcome, RawOutcome::EngineFault { .. }));
        assert_eq!(engine.removed(), engine.created_ids());
    }

    #[tokio::test]
    async fn test_cancelled_execution_removes_container_in_background() {
        let mut behavior = FakeBehavior::exits(0, "", "");
        behavior.run_for = Duration::from_secs(30);
        let engine = FakeEngine::new(behavior);
        let (_parent, workspace) = staged("while True: pass").await;
        let runner = runner(&engine);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            runner.execute(&workspace, &limits(Duration::from_secs(60))),
        )
        .await;
        assert!(cancelled.is_err());

        for _ in 0..50 {
            if !engine.removed().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(engine.removed(), engine.created_ids());
    }

    #[tokio::test]
    async fn test_fault_after_start_still_tears_down() {
        for (wait_fails, logs_fails) in [(true, false), (false, true)] {
            let mut behavior = FakeBehavior::exits(0, "never seen", "");
            behavior.wait_fails = wait_fails;
            behavior.logs_fails = logs_fails;
            let engine = FakeEngine::new(behavior);
            let (_parent, workspace) = staged("print(1)").await;

            let outcome = runner(&engine)
                .execute(&workspace, &limits(Duration::from_secs(5)))
                .await;

            match outcome {
                RawOutcome::EngineFault { message } => assert!(message.contains("stream broke")),
                other => panic!("unexpected outcome {:?}", other),
            }
            assert_eq!(engine.created().len(), 1);
            assert_eq!(engine.removed(), engine.created_ids());
            assert!(engine.killed().is_empty());
        }
    }

    #[tokio::test]
    async fn test_cancelled_during_teardown_removes_once() {
        let mut behavior = FakeBehavior::exits(0, "", "");
        behavior.remove_takes = Duration::from_millis(200);
        let engine = FakeEngine::new(behavior);
        let (_parent, workspace) = staged("print(1)").await;
        let runner = runner(&engine);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            runner.execute(&workspace, &limits(Duration::from_secs(5))),
        )
        .await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(engine.created_ids().len(), 1);
        assert_eq!(engine.removed(), engine.created_ids());
    }

    #[tokio::test]
    async fn test_oversized_memory_limit_creates_nothing() {
        let engine = FakeEngine::new(FakeBehavior::exits(0, "", ""));
        let (_parent, workspace) = staged("print(1)").await;
        let mut limits = limits(Duration::from_secs(5));
        limits.memory_bytes = u64::MAX;

        let outcome = runner(&engine).execute(&workspace, &limits).await;

        match outcome {
            RawOutcome::EngineFault { message } => assert!(message.contains("Memory limit")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(engine.created().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_container_runs_as_workspace_owner() {
        let engine = FakeEngine::new(FakeBehavior::exits(0, "", ""));
        let (_parent, workspace) = staged("pass").await;

        runner(&engine)
            .execute(&workspace, &limits(Duration::from_secs(5)))
            .await;

        assert_eq!(engine.created()[0].user, workspace.owner());
        assert!(workspace.owner().is_some());
    }
}

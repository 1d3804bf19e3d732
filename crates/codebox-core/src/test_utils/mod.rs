//! In-memory container engine for exercising the runner and façade without a
//! Docker daemon.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::errors::EngineError;
use crate::executors::{CapturedOutput, ContainerEngine, ContainerSpec};

/// How the fake engine behaves for every container it runs.
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    pub unreachable: bool,
    pub image_present: bool,
    pub pull_fails: bool,
    pub start_fails: bool,
    pub wait_fails: bool,
    pub logs_fails: bool,
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub run_for: Duration,
    /// How long `remove_container` takes before it is recorded.
    pub remove_takes: Duration,
}

impl FakeBehavior {
    pub fn exits(exit_code: i64, stdout: &str, stderr: &str) -> Self {
        Self {
            unreachable: false,
            image_present: true,
            pull_fails: false,
            start_fails: false,
            wait_fails: false,
            logs_fails: false,
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            run_for: Duration::ZERO,
            remove_takes: Duration::ZERO,
        }
    }

    pub fn unreachable() -> Self {
        let mut behavior = Self::exits(0, "", "");
        behavior.unreachable = true;
        behavior
    }
}

#[derive(Debug, Default)]
struct FakeState {
    created: Vec<(String, ContainerSpec)>,
    staged_sources: Vec<String>,
    pulled: Vec<String>,
    killed: Vec<String>,
    removed: Vec<String>,
}

#[derive(Clone)]
pub struct FakeEngine {
    behavior: FakeBehavior,
    state: Arc<Mutex<FakeState>>,
}

impl FakeEngine {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    pub fn created(&self) -> Vec<ContainerSpec> {
        let state = self.state.lock().unwrap();
        state.created.iter().map(|(_, spec)| spec.clone()).collect()
    }

    pub fn created_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.created.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Contents of the workspace files, read when each container was created.
    pub fn staged_sources(&self) -> Vec<String> {
        self.state.lock().unwrap().staged_sources.clone()
    }

    pub fn pulled(&self) -> Vec<String> {
        self.state.lock().unwrap().pulled.clone()
    }

    pub fn killed(&self) -> Vec<String> {
        self.state.lock().unwrap().killed.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    fn check_reachable(&self) -> Result<(), EngineError> {
        if self.behavior.unreachable {
            return Err(EngineError::Unreachable(
                "connection refused (fake engine)".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.check_reachable()
    }

    async fn image_exists(&self, image: &str) -> Result<bool, EngineError> {
        self.check_reachable()?;
        let pulled = self.state.lock().unwrap().pulled.iter().any(|p| p == image);
        Ok(self.behavior.image_present || pulled)
    }

    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        self.check_reachable()?;
        if self.behavior.pull_fails {
            return Err(EngineError::ImageUnavailable {
                image: image.to_string(),
                message: "manifest unknown".to_string(),
            });
        }
        self.state.lock().unwrap().pulled.push(image.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        self.check_reachable()?;
        let mut sources = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&spec.host_dir) {
            for entry in entries.flatten() {
                if let Ok(content) = std::fs::read_to_string(entry.path()) {
                    sources.push(content);
                }
            }
        }

        let mut state = self.state.lock().unwrap();
        let id = format!("fake-{}", state.created.len());
        state.created.push((id.clone(), spec.clone()));
        state.staged_sources.extend(sources);
        Ok(id)
    }

    async fn start_container(&self, _id: &str) -> Result<(), EngineError> {
        self.check_reachable()?;
        if self.behavior.start_fails {
            return Err(EngineError::Other("cannot start container".to_string()));
        }
        Ok(())
    }

    async fn wait_container(&self, _id: &str) -> Result<i64, EngineError> {
        tokio::time::sleep(self.behavior.run_for).await;
        if self.behavior.wait_fails {
            return Err(EngineError::Other("wait stream broke".to_string()));
        }
        Ok(self.behavior.exit_code)
    }

    async fn collect_output(&self, _id: &str) -> Result<CapturedOutput, EngineError> {
        if self.behavior.logs_fails {
            return Err(EngineError::Other("log stream broke".to_string()));
        }
        let mut output = CapturedOutput::default();
        output.push_stdout(&self.behavior.stdout);
        output.push_stderr(&self.behavior.stderr);
        Ok(output)
    }

    async fn kill_container(&self, id: &str) -> Result<(), EngineError> {
        self.state.lock().unwrap().killed.push(id.to_string());
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        tokio::time::sleep(self.behavior.remove_takes).await;
        self.state.lock().unwrap().removed.push(id.to_string());
        Ok(())
    }
}

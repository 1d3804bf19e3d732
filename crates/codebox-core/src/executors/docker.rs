use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    CreateImageOptions as BollardCreateImageOptionsQuery,
    KillContainerOptions as BollardKillContainerOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::StreamExt;
use std::default::Default;

use super::{CapturedOutput, ContainerEngine, ContainerSpec};
use crate::config::EngineConfig;
use crate::errors::EngineError;

/// Docker-backed engine. Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Build a client from config. This does not contact the daemon; use
    /// `ping` for that.
    pub fn connect(config: &EngineConfig) -> Result<Self, EngineError> {
        let timeout = config.connect_timeout_secs;
        let docker = match config.host.as_deref() {
            None => Docker::connect_with_local_defaults(),
            Some(host) if host.starts_with("tcp://") || host.starts_with("http://") => {
                let addr = host.replacen("tcp://", "http://", 1);
                Docker::connect_with_http(&addr, timeout, API_DEFAULT_VERSION)
            }
            Some(host) => Docker::connect_with_socket(host, timeout, API_DEFAULT_VERSION),
        }
        .map_err(|e| EngineError::Unreachable(e.to_string()))?;

        Ok(Self { docker })
    }
}

fn host_config(spec: &ContainerSpec) -> HostConfig {
    HostConfig {
        binds: Some(vec![format!("{}:{}:rw", spec.host_dir, spec.mount_path)]),
        memory: Some(spec.memory_bytes),
        // Same value as memory: no swap on top of the ceiling
        memory_swap: Some(spec.memory_bytes),
        nano_cpus: Some(spec.nano_cpus),
        pids_limit: Some(spec.pids_limit),
        network_mode: Some("none".to_string()),
        cap_drop: Some(vec!["ALL".to_string()]),
        security_opt: Some(vec!["no-new-privileges:true".to_string()]),
        auto_remove: Some(false),
        ..Default::default()
    }
}

fn container_body(spec: &ContainerSpec) -> ContainerCreateBody {
    ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: Some(spec.cmd.clone()),
        user: spec.user.clone(),
        working_dir: Some(spec.mount_path.clone()),
        network_disabled: Some(true),
        host_config: Some(host_config(spec)),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Unreachable(e.to_string()))
    }

    async fn image_exists(&self, image: &str) -> Result<bool, EngineError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(EngineError::BollardError(e)),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        log::info!("Pulling image {}", image);
        let pull_options = Some(BollardCreateImageOptionsQuery {
            from_image: Some(image.to_string()),
            ..Default::default()
        });

        let mut pull_stream = self.docker.create_image(pull_options, None, None);
        while let Some(result) = pull_stream.next().await {
            if let Err(e) = result {
                return Err(EngineError::ImageUnavailable {
                    image: image.to_string(),
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(spec.name.clone()),
            ..Default::default()
        });

        let container = self
            .docker
            .create_container(options, container_body(spec))
            .await?;
        Ok(container.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<BollardStartContainerOptionsQuery>)
            .await?;
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, EngineError> {
        // The first item carries the exit status.
        let mut wait_stream = self
            .docker
            .wait_container(id, None::<BollardWaitContainerOptionsQuery>);

        match wait_stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit status as an error
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(EngineError::BollardError(e)),
            None => Err(EngineError::Other(
                "Container wait stream ended unexpectedly".to_string(),
            )),
        }
    }

    async fn collect_output(&self, id: &str) -> Result<CapturedOutput, EngineError> {
        let mut output_stream = self.docker.logs(
            id,
            Some(BollardLogsOptionsQuery {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut output = CapturedOutput::default();
        while let Some(log_result) = output_stream.next().await {
            match log_result? {
                LogOutput::StdOut { message } => {
                    output.push_stdout(&String::from_utf8_lossy(&message))
                }
                LogOutput::StdErr { message } => {
                    output.push_stderr(&String::from_utf8_lossy(&message))
                }
                _ => {}
            }
        }
        Ok(output)
    }

    async fn kill_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .kill_container(id, None::<BollardKillContainerOptionsQuery>)
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .remove_container(
                id,
                Some(BollardRemoveContainerOptionsQuery {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }
}

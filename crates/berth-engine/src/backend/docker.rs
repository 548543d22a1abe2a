//! Docker-compatible engine backend over the engine's HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use bollard::API_DEFAULT_VERSION;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, RestartContainerOptions, StartContainerOptions, StopContainerOptions,
    UpdateContainerOptions,
};
use bollard::models::{ContainerInspectResponse, ImageInspect};

use super::{EngineApi, EngineResult};
use crate::error::EngineError;

/// Engine backend driving a Docker daemon through `bollard`.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Builds a client for `host`, or for the local defaults
    /// (`DOCKER_HOST`, then the platform socket) when unset.
    ///
    /// `unix://` and bare absolute paths select a socket; `tcp://` and
    /// `http://` select plain HTTP.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` for an unsupported address scheme
    /// or a client that cannot be constructed.
    pub fn connect(host: Option<&str>, timeout: Duration) -> Result<Self, EngineError> {
        let timeout_secs = timeout.as_secs();
        let docker = match host {
            None => Docker::connect_with_local_defaults().map(|d| d.with_timeout(timeout)),
            Some(addr) if addr.starts_with("unix://") || addr.starts_with('/') => {
                let path = addr.strip_prefix("unix://").unwrap_or(addr);
                Docker::connect_with_socket(path, timeout_secs, API_DEFAULT_VERSION)
            }
            Some(addr) if addr.starts_with("tcp://") || addr.starts_with("http://") => {
                Docker::connect_with_http(addr, timeout_secs, API_DEFAULT_VERSION)
            }
            Some(addr) => {
                return Err(EngineError::Unavailable {
                    cause: format!("unsupported engine address {addr:?}"),
                });
            }
        }
        .map_err(|e| EngineError::Unavailable {
            cause: e.to_string(),
        })?;

        tracing::debug!(host = host.unwrap_or("local defaults"), "docker client configured");
        Ok(Self { docker })
    }
}

#[async_trait]
impl EngineApi for DockerEngine {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn ping(&self) -> EngineResult<()> {
        let _ = self.docker.ping().await?;
        Ok(())
    }

    async fn list_container_ids(&self, all: bool) -> EngineResult<Vec<String>> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await?;
        Ok(summaries.into_iter().filter_map(|s| s.id).collect())
    }

    async fn create_container(&self, name: &str, config: Config<String>) -> EngineResult<String> {
        let options = CreateContainerOptions {
            name: name.to_owned(),
            ..Default::default()
        };
        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            tracing::warn!(container = %response.id, %warning, "engine warning on create");
        }
        Ok(response.id)
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerInspectResponse> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
    }

    async fn inspect_image(&self, image: &str) -> EngineResult<ImageInspect> {
        self.docker.inspect_image(image).await
    }

    async fn update_container(
        &self,
        id: &str,
        options: UpdateContainerOptions<String>,
    ) -> EngineResult<()> {
        self.docker.update_container(id, options).await
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
    }

    async fn stop_container(&self, id: &str) -> EngineResult<()> {
        self.docker
            .stop_container(id, None::<StopContainerOptions>)
            .await
    }

    async fn restart_container(&self, id: &str) -> EngineResult<()> {
        self.docker
            .restart_container(id, None::<RestartContainerOptions>)
            .await
    }

    async fn remove_container(&self, id: &str, force: bool) -> EngineResult<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await
    }
}

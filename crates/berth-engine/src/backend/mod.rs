//! Container engine abstraction.
//!
//! Backends speak the engine's native shapes and errors. Classification into
//! [`EngineError`] happens one layer up, in the client.

pub mod docker;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use berth_common::config::{EngineBackendKind, EngineConfig};
use bollard::container::{Config, UpdateContainerOptions};
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerInspectResponse, ImageInspect};

use crate::error::EngineError;

/// Engine-native result.
pub type EngineResult<T> = std::result::Result<T, BollardError>;

/// Low-level container engine operations.
///
/// Each method is a single engine round trip. Implementors report failures
/// the way a Docker-compatible daemon does: status-coded server errors for
/// refused requests and I/O errors when the engine is unreachable.
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Checks that the engine answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is unreachable.
    async fn ping(&self) -> EngineResult<()>;

    /// Lists container IDs, only running ones unless `all` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine refuses or cannot be reached.
    async fn list_container_ids(&self, all: bool) -> EngineResult<Vec<String>>;

    /// Creates a container and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns 409 for a taken name and 404 for an unknown image.
    async fn create_container(&self, name: &str, config: Config<String>) -> EngineResult<String>;

    /// Returns the full engine record for a container.
    ///
    /// # Errors
    ///
    /// Returns 404 when no container matches `id`.
    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerInspectResponse>;

    /// Returns the engine record for an image, by ID or reference.
    ///
    /// # Errors
    ///
    /// Returns 404 when the engine holds no such image.
    async fn inspect_image(&self, image: &str) -> EngineResult<ImageInspect>;

    /// Changes resource settings of an existing container.
    ///
    /// # Errors
    ///
    /// Returns 404 when no container matches `id`.
    async fn update_container(
        &self,
        id: &str,
        options: UpdateContainerOptions<String>,
    ) -> EngineResult<()>;

    /// Starts a container. Starting a running container succeeds unchanged.
    ///
    /// # Errors
    ///
    /// Returns 404 when no container matches `id`.
    async fn start_container(&self, id: &str) -> EngineResult<()>;

    /// Stops a container. Stopping a stopped container succeeds unchanged.
    ///
    /// # Errors
    ///
    /// Returns 404 when no container matches `id`.
    async fn stop_container(&self, id: &str) -> EngineResult<()>;

    /// Restarts a container.
    ///
    /// # Errors
    ///
    /// Returns 404 when no container matches `id`.
    async fn restart_container(&self, id: &str) -> EngineResult<()>;

    /// Removes a container, stopping it first when `force` is set.
    ///
    /// # Errors
    ///
    /// Returns 404 when absent and 409 when running without `force`.
    async fn remove_container(&self, id: &str, force: bool) -> EngineResult<()>;
}

/// Builds the backend selected by the configuration.
///
/// Connecting does not contact the engine; the first request does.
///
/// # Errors
///
/// Returns `EngineError::Unavailable` when the engine address is unusable.
pub fn connect(config: &EngineConfig) -> Result<Arc<dyn EngineApi>, EngineError> {
    match config.backend {
        EngineBackendKind::Docker => {
            let timeout = Duration::from_secs(config.timeout_secs);
            let engine = docker::DockerEngine::connect(config.host.as_deref(), timeout)?;
            Ok(Arc::new(engine))
        }
        EngineBackendKind::Memory => Ok(Arc::new(memory::MemoryEngine::new())),
    }
}

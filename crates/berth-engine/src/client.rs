//! Engine client: lifecycle operations over an [`EngineApi`].
//!
//! Every operation that changes a container is followed by a fresh inspect,
//! so callers always receive what the engine reports afterwards rather than
//! a locally patched value.

use std::sync::Arc;

use berth_common::config::EngineConfig;
use berth_common::request::{ContainerSpec, ContainerUpdate};
use berth_common::types::{ContainerState, OperationResult};
use bollard::models::ImageInspect;

use crate::backend::{self, EngineApi};
use crate::error::{EngineError, EngineVerb, Subject};
use crate::translate;

/// State changes that leave the container in place.
#[derive(Debug, Clone, Copy)]
enum Transition {
    Start,
    Stop,
    Restart,
}

impl Transition {
    const fn verb(self) -> EngineVerb {
        match self {
            Self::Start => EngineVerb::Start,
            Self::Stop => EngineVerb::Stop,
            Self::Restart => EngineVerb::Restart,
        }
    }
}

/// Outcome of normalizing one listed container.
#[derive(Debug, Clone)]
pub struct ListEntry {
    /// Engine ID from the listing.
    pub id: String,
    /// Normalized state, or why it could not be read.
    pub state: Result<ContainerState, EngineError>,
}

/// Issues lifecycle operations against one engine.
#[derive(Clone)]
pub struct EngineClient {
    api: Arc<dyn EngineApi>,
}

impl std::fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineClient")
            .field("backend", &self.api.name())
            .finish()
    }
}

impl EngineClient {
    /// Wraps an existing backend.
    #[must_use]
    pub fn new(api: Arc<dyn EngineApi>) -> Self {
        Self { api }
    }

    /// Builds the backend named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` when the engine address is unusable.
    pub fn connect(config: &EngineConfig) -> Result<Self, EngineError> {
        let api = backend::connect(config)?;
        tracing::info!(backend = api.name(), "engine client ready");
        Ok(Self::new(api))
    }

    /// Backend name, for logs and health output.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.api.name()
    }

    /// Checks that the engine answers.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` when it does not.
    pub async fn ping(&self) -> Result<(), EngineError> {
        self.api
            .ping()
            .await
            .map_err(|e| EngineError::from_engine(EngineVerb::Ping, Subject::Engine, &e))
    }

    /// Lists containers and normalizes each, keeping per-container outcomes.
    ///
    /// # Errors
    ///
    /// Fails only when the listing itself fails.
    pub async fn list_entries(&self, all: bool) -> Result<Vec<ListEntry>, EngineError> {
        let ids = self
            .api
            .list_container_ids(all)
            .await
            .map_err(|e| EngineError::from_engine(EngineVerb::List, Subject::Engine, &e))?;

        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let state = self.get(&id).await;
            entries.push(ListEntry { id, state });
        }
        Ok(entries)
    }

    /// Lists containers, only running ones unless `all` is set.
    ///
    /// A container removed between the listing and its inspect is skipped.
    /// Any other per-container failure fails the whole listing.
    ///
    /// # Errors
    ///
    /// Returns the listing failure or the first per-container failure.
    pub async fn list(&self, all: bool) -> Result<Vec<ContainerState>, EngineError> {
        let mut states = Vec::new();
        for entry in self.list_entries(all).await? {
            match entry.state {
                Ok(state) => states.push(state),
                Err(EngineError::NotFound { .. }) => {
                    tracing::debug!(container = %entry.id, "container vanished while listing");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(states)
    }

    /// Creates a container from a validated spec and returns its state.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateName` when the engine reports the name taken and
    /// `ImageNotFound` when the image does not resolve.
    pub async fn create(&self, spec: &ContainerSpec) -> Result<ContainerState, EngineError> {
        let image = spec.image_reference();
        let subject = Subject::NewContainer {
            name: &spec.name,
            image: &image,
        };
        let config = translate::create_config(spec);
        let id = self
            .api
            .create_container(&spec.name, config)
            .await
            .map_err(|e| EngineError::from_engine(EngineVerb::Create, subject, &e))?;
        tracing::info!(container = %id, name = %spec.name, image = %image, "container created");
        self.get(&id).await
    }

    /// Returns the normalized state of one container, with its image
    /// resolved through the engine's image record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no container matches `id`.
    pub async fn get(&self, id: &str) -> Result<ContainerState, EngineError> {
        let record = self
            .api
            .inspect_container(id)
            .await
            .map_err(|e| EngineError::from_engine(EngineVerb::Inspect, Subject::Container(id), &e))?;
        let image = match record.image.as_deref().filter(|i| !i.is_empty()) {
            Some(image_id) => self.image_record(image_id).await?,
            None => None,
        };
        Ok(translate::normalize(record, image.as_ref()))
    }

    /// Image record for a container's image; `None` once the image is gone.
    async fn image_record(&self, image_id: &str) -> Result<Option<ImageInspect>, EngineError> {
        match self.api.inspect_image(image_id).await {
            Ok(image) => Ok(Some(image)),
            Err(e) => match EngineError::from_engine(EngineVerb::Inspect, Subject::Image(image_id), &e)
            {
                EngineError::ImageNotFound { .. } => {
                    tracing::debug!(image = %image_id, "image record gone, reporting image ID");
                    Ok(None)
                }
                other => Err(other),
            },
        }
    }

    /// Applies the fields present in `update` and returns the new state.
    ///
    /// An empty update makes no engine change.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no container matches `id`.
    pub async fn update(
        &self,
        id: &str,
        update: &ContainerUpdate,
    ) -> Result<ContainerState, EngineError> {
        if update.is_empty() {
            return self.get(id).await;
        }
        self.api
            .update_container(id, translate::update_options(update))
            .await
            .map_err(|e| EngineError::from_engine(EngineVerb::Update, Subject::Container(id), &e))?;
        tracing::info!(container = %id, "container updated");
        self.get(id).await
    }

    /// Starts a container. Starting a running container is not an error.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no container matches `id`.
    pub async fn start(&self, id: &str) -> Result<ContainerState, EngineError> {
        self.transition(id, Transition::Start).await
    }

    /// Stops a container. Stopping a stopped container is not an error.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no container matches `id`.
    pub async fn stop(&self, id: &str) -> Result<ContainerState, EngineError> {
        self.transition(id, Transition::Stop).await
    }

    /// Restarts a container.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no container matches `id`.
    pub async fn restart(&self, id: &str) -> Result<ContainerState, EngineError> {
        self.transition(id, Transition::Restart).await
    }

    /// Removes a container; `force` stops a running one first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no container matches `id`, and
    /// `OperationFailed` for a running container without `force`.
    pub async fn delete(&self, id: &str, force: bool) -> Result<OperationResult, EngineError> {
        self.api
            .remove_container(id, force)
            .await
            .map_err(|e| EngineError::from_engine(EngineVerb::Remove, Subject::Container(id), &e))?;
        tracing::info!(container = %id, force, "container deleted");
        Ok(OperationResult {
            message: format!("Container {id} successfully deleted"),
        })
    }

    /// Applies a state change. The engine reports a redundant start or stop
    /// as success.
    async fn transition(
        &self,
        id: &str,
        transition: Transition,
    ) -> Result<ContainerState, EngineError> {
        let verb = transition.verb();
        let outcome = match transition {
            Transition::Start => self.api.start_container(id).await,
            Transition::Stop => self.api.stop_container(id).await,
            Transition::Restart => self.api.restart_container(id).await,
        };
        outcome.map_err(|e| EngineError::from_engine(verb, Subject::Container(id), &e))?;
        tracing::info!(container = %id, %verb, "container transitioned");
        self.get(id).await
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::memory::MemoryEngine;

    use super::*;

    #[tokio::test]
    async fn empty_update_touches_nothing() {
        let client = EngineClient::new(Arc::new(MemoryEngine::new()));
        let created = client
            .create(&ContainerSpec::new("web-1", "nginx"))
            .await
            .unwrap();
        let same = client
            .update(created.id.as_str(), &ContainerUpdate::default())
            .await
            .unwrap();
        assert_eq!(created, same);
    }

    #[tokio::test]
    async fn redundant_start_returns_state() {
        let client = EngineClient::new(Arc::new(MemoryEngine::new()));
        let created = client
            .create(&ContainerSpec::new("web-1", "nginx"))
            .await
            .unwrap();
        let first = client.start(created.id.as_str()).await.unwrap();
        let second = client.start(created.id.as_str()).await.unwrap();
        assert_eq!(first.status, "running");
        assert_eq!(second, first);

        let stopped = client.stop(created.id.as_str()).await.unwrap();
        let again = client.stop(created.id.as_str()).await.unwrap();
        assert_eq!(again, stopped);
    }

    #[test]
    fn transitions_map_to_their_own_verbs() {
        assert_eq!(Transition::Start.verb(), EngineVerb::Start);
        assert_eq!(Transition::Stop.verb(), EngineVerb::Stop);
        assert_eq!(Transition::Restart.verb(), EngineVerb::Restart);
    }

    #[tokio::test]
    async fn untagged_image_resolves_to_latest() {
        let client = EngineClient::new(Arc::new(MemoryEngine::new()));
        let created = client
            .create(&ContainerSpec::new("web-1", "nginx"))
            .await
            .unwrap();
        assert_eq!(created.image, "nginx:latest");
        assert_eq!(created.tag.as_deref(), Some("latest"));
    }

    #[test]
    fn debug_names_backend_only() {
        let client = EngineClient::new(Arc::new(MemoryEngine::new()));
        assert_eq!(format!("{client:?}"), "EngineClient { backend: \"memory\" }");
    }
}

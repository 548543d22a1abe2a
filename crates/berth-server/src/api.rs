//! Lifecycle API router.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::{Router, middleware};
use berth_engine::{EngineClient, EngineError, EngineVerb};
use tower_http::trace::TraceLayer;

use crate::auth::{self, AuthGate};
use crate::error::ApiError;
use crate::handlers::{self, containers, system};
use crate::trace::request_id_middleware;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Long-lived engine client.
    pub engine: EngineClient,
    /// Credential verifier.
    pub gate: Arc<dyn AuthGate>,
    /// Deadline around each engine call.
    pub call_timeout: Duration,
}

impl AppState {
    /// Runs one engine call under the service deadline.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Timeout` when the deadline elapses, or the engine
    /// failure otherwise.
    pub async fn call<T, F>(&self, verb: EngineVerb, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| ApiError::Timeout {
                verb,
                after: self.call_timeout,
            })?
            .map_err(ApiError::from)
    }
}

/// Creates the router: `/health` at the root and every identity-gated
/// route under `api_prefix`.
#[must_use]
pub fn create_router(state: AppState, api_prefix: &str) -> Router {
    let gated = Router::new()
        .route(
            "/containers",
            get(containers::list_containers).post(containers::create_container),
        )
        .route(
            "/containers/:id",
            get(containers::get_container)
                .put(containers::update_container)
                .delete(containers::delete_container),
        )
        .route("/containers/:id/start", post(containers::start_container))
        .route("/containers/:id/stop", post(containers::stop_container))
        .route("/containers/:id/restart", post(containers::restart_container))
        .route("/system", get(system::system_info))
        .route("/system/cpu", get(system::cpu_info))
        .route("/system/memory", get(system::memory_info))
        .route("/system/disk", get(system::disk_info))
        .route("/system/network", get(system::network_info))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_identity,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .nest(api_prefix, gated)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Request handlers.

pub mod containers;
pub mod system;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use serde::Serialize;

use crate::api::AppState;
use crate::error::ApiError;

/// Liveness report.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` when the service answers.
    pub status: &'static str,
    /// Engine backend name.
    pub engine: &'static str,
    /// Whether the engine answered a ping.
    pub engine_reachable: bool,
}

/// Unauthenticated liveness check; reports engine reachability without
/// failing when the engine is down.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let reachable = tokio::time::timeout(state.call_timeout, state.engine.ping())
        .await
        .is_ok_and(|ping| ping.is_ok());
    Json(HealthResponse {
        status: "ok",
        engine: state.engine.backend_name(),
        engine_reachable: reachable,
    })
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid("body", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid("query", rejection.body_text())
    }
}

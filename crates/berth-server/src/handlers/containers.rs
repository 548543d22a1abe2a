//! Container lifecycle handlers.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use berth_common::request::{ContainerSpec, ContainerUpdate};
use berth_common::types::{ContainerState, OperationResult};
use berth_engine::EngineVerb;
use serde::Deserialize;

use crate::api::AppState;
use crate::auth::Identity;
use crate::error::Result;

/// Query for `GET /containers`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Include stopped containers.
    #[serde(default, alias = "all_containers")]
    pub all: bool,
}

/// Query for `DELETE /containers/:id`.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    /// Stop a running container before removing it.
    #[serde(default)]
    pub force: bool,
}

/// `GET /containers`
pub async fn list_containers(
    State(state): State<AppState>,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<ContainerState>>> {
    let Query(query) = query?;
    let containers = state
        .call(EngineVerb::List, state.engine.list(query.all))
        .await?;
    Ok(Json(containers))
}

/// `POST /containers`
pub async fn create_container(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: std::result::Result<Json<ContainerSpec>, JsonRejection>,
) -> Result<Json<ContainerState>> {
    let Json(spec) = body?;
    spec.validate()?;
    tracing::info!(subject = %identity.subject, name = %spec.name, "create requested");
    let created = state
        .call(EngineVerb::Create, state.engine.create(&spec))
        .await?;
    Ok(Json(created))
}

/// `GET /containers/:id`
pub async fn get_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContainerState>> {
    let container = state
        .call(EngineVerb::Inspect, state.engine.get(&id))
        .await?;
    Ok(Json(container))
}

/// `PUT /containers/:id`
pub async fn update_container(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    body: std::result::Result<Json<ContainerUpdate>, JsonRejection>,
) -> Result<Json<ContainerState>> {
    let Json(update) = body?;
    update.validate()?;
    tracing::info!(subject = %identity.subject, container = %id, "update requested");
    let updated = state
        .call(EngineVerb::Update, state.engine.update(&id, &update))
        .await?;
    Ok(Json(updated))
}

/// `DELETE /containers/:id`
pub async fn delete_container(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    query: std::result::Result<Query<DeleteQuery>, QueryRejection>,
) -> Result<Json<OperationResult>> {
    let Query(query) = query?;
    tracing::info!(subject = %identity.subject, container = %id, force = query.force, "delete requested");
    let result = state
        .call(EngineVerb::Remove, state.engine.delete(&id, query.force))
        .await?;
    Ok(Json(result))
}

/// `POST /containers/:id/start`
pub async fn start_container(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<ContainerState>> {
    tracing::info!(subject = %identity.subject, container = %id, "start requested");
    let container = state
        .call(EngineVerb::Start, state.engine.start(&id))
        .await?;
    Ok(Json(container))
}

/// `POST /containers/:id/stop`
pub async fn stop_container(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<ContainerState>> {
    tracing::info!(subject = %identity.subject, container = %id, "stop requested");
    let container = state
        .call(EngineVerb::Stop, state.engine.stop(&id))
        .await?;
    Ok(Json(container))
}

/// `POST /containers/:id/restart`
pub async fn restart_container(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<ContainerState>> {
    tracing::info!(subject = %identity.subject, container = %id, "restart requested");
    let container = state
        .call(EngineVerb::Restart, state.engine.restart(&id))
        .await?;
    Ok(Json(container))
}

//! Lifecycle tests for the engine client against the in-process engine.
//!
//! Covered scenarios:
//! 1. Create translates and re-reads full state
//! 2. Lookup failures are typed
//! 3. Updates merge rather than replace
//! 4. Transitions and deletion
//! 5. Engine-side conflicts (duplicate name, unknown image)
//! 6. Engine outage

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::collections::BTreeMap;
use std::sync::Arc;

use berth_common::request::{
    CommandInput, ContainerSpec, ContainerUpdate, PortTarget, VolumeTarget,
};
use berth_common::types::CpuAllocation;
use berth_engine::backend::memory::MemoryEngine;
use berth_engine::{EngineClient, EngineError};

fn client() -> (Arc<MemoryEngine>, EngineClient) {
    let engine = Arc::new(MemoryEngine::new());
    (Arc::clone(&engine), EngineClient::new(engine))
}

fn web_spec() -> ContainerSpec {
    let mut spec = ContainerSpec::new("web-1", "nginx");
    spec.tag = Some("1.25".into());
    spec.cpu_allocation = Some("medium".into());
    spec
}

// ── Create ───────────────────────────────────────────────────────────

#[tokio::test]
async fn create_returns_normalized_state() {
    let (_, client) = client();
    let state = client.create(&web_spec()).await.expect("create");

    assert_eq!(state.name, "web-1");
    assert_eq!(state.image, "nginx:1.25");
    assert_eq!(state.tag.as_deref(), Some("1.25"));
    assert_eq!(state.status, "created");
    assert_eq!(state.cpu_allocation, CpuAllocation::Medium);
    assert_eq!(state.restart_policy, "unless-stopped");
    assert!(!state.privileged);
    assert!(state.created.is_some());
    assert!(state.network.contains_key("bridge"));
}

#[tokio::test]
async fn create_applies_defaults_and_command() {
    let (_, client) = client();
    let mut spec = ContainerSpec::new("worker", "alpine");
    spec.command = Some(CommandInput::Line("sleep 3600".into()));
    spec.environment = Some(BTreeMap::from([
        ("B".to_owned(), "2".to_owned()),
        ("A".to_owned(), "1".to_owned()),
    ]));
    spec.ports = Some(BTreeMap::from([("8080".to_owned(), PortTarget::Port(18080))]));

    let state = client.create(&spec).await.expect("create");
    assert_eq!(state.cpu_allocation, CpuAllocation::Low);
    assert_eq!(state.command.as_deref(), Some("sleep 3600"));
    assert_eq!(state.environment, vec!["A=1", "B=2"]);
    assert_eq!(state.image, "alpine:latest");
    assert_eq!(state.tag.as_deref(), Some("latest"));
    assert_eq!(state.ports["8080/tcp"].host_port, "18080");
}

#[tokio::test]
async fn unknown_cpu_tier_falls_back_to_medium() {
    let (_, client) = client();
    let mut spec = web_spec();
    spec.cpu_allocation = Some("turbo".into());
    let state = client.create(&spec).await.expect("create");
    assert_eq!(state.cpu_allocation, CpuAllocation::Medium);
}

// ── Lookup ───────────────────────────────────────────────────────────

#[tokio::test]
async fn get_unknown_container_is_not_found() {
    let (_, client) = client();
    let err = client.get("does-not-exist").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { id } if id == "does-not-exist"));
}

#[tokio::test]
async fn get_accepts_name() {
    let (_, client) = client();
    let created = client.create(&web_spec()).await.unwrap();
    let fetched = client.get("web-1").await.unwrap();
    assert_eq!(fetched.id, created.id);
}

// ── Update ───────────────────────────────────────────────────────────

#[tokio::test]
async fn update_changes_only_present_fields() {
    let (_, client) = client();
    let created = client.create(&web_spec()).await.unwrap();

    let update = ContainerUpdate {
        cpu_allocation: None,
        restart_policy: Some("always".into()),
    };
    let updated = client.update(created.id.as_str(), &update).await.unwrap();

    assert_eq!(updated.restart_policy, "always");
    assert_eq!(updated.cpu_allocation, CpuAllocation::Medium);
    assert_eq!(updated.image, created.image);
    assert_eq!(updated.name, created.name);
}

#[tokio::test]
async fn restart_policy_update_keeps_ports_volumes_and_environment() {
    let (_, client) = client();
    let mut spec = web_spec();
    spec.ports = Some(BTreeMap::from([("80".to_owned(), PortTarget::Port(8080))]));
    spec.volumes = Some(BTreeMap::from([(
        "/srv/www".to_owned(),
        VolumeTarget::Path("/usr/share/nginx/html".into()),
    )]));
    spec.environment = Some(BTreeMap::from([("TZ".to_owned(), "UTC".to_owned())]));
    let created = client.create(&spec).await.unwrap();
    assert_eq!(created.ports["80/tcp"].host_port, "8080");
    assert_eq!(created.volumes.len(), 1);
    assert_eq!(created.environment, vec!["TZ=UTC"]);

    let update = ContainerUpdate {
        cpu_allocation: None,
        restart_policy: Some("on-failure:3".into()),
    };
    let updated = client.update(created.id.as_str(), &update).await.unwrap();

    assert_eq!(updated.restart_policy, "on-failure");
    assert_eq!(updated.ports, created.ports);
    assert_eq!(updated.volumes, created.volumes);
    assert_eq!(updated.environment, created.environment);
    assert_eq!(updated.cpu_allocation, created.cpu_allocation);
}

#[tokio::test]
async fn update_cpu_tier() {
    let (_, client) = client();
    let created = client.create(&web_spec()).await.unwrap();
    let update = ContainerUpdate {
        cpu_allocation: Some("high".into()),
        restart_policy: None,
    };
    let updated = client.update(created.id.as_str(), &update).await.unwrap();
    assert_eq!(updated.cpu_allocation, CpuAllocation::High);
    assert_eq!(updated.restart_policy, "unless-stopped");
}

#[tokio::test]
async fn update_unknown_container_is_not_found() {
    let (_, client) = client();
    let update = ContainerUpdate {
        cpu_allocation: Some("low".into()),
        restart_policy: None,
    };
    let err = client.update("ghost", &update).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

// ── Transitions ──────────────────────────────────────────────────────

#[tokio::test]
async fn start_stop_restart_report_engine_status() {
    let (_, client) = client();
    let id = client.create(&web_spec()).await.unwrap().id;

    assert_eq!(client.start(id.as_str()).await.unwrap().status, "running");
    assert_eq!(client.stop(id.as_str()).await.unwrap().status, "exited");
    assert_eq!(client.stop(id.as_str()).await.unwrap().status, "exited");
    assert_eq!(client.restart(id.as_str()).await.unwrap().status, "running");
}

#[tokio::test]
async fn list_filters_stopped_unless_all() {
    let (_, client) = client();
    let running = client.create(&web_spec()).await.unwrap();
    let _ = client.start(running.id.as_str()).await.unwrap();
    let _ = client
        .create(&ContainerSpec::new("idle", "alpine"))
        .await
        .unwrap();

    let only_running = client.list(false).await.unwrap();
    assert_eq!(only_running.len(), 1);
    assert_eq!(only_running[0].name, "web-1");

    let everything = client.list(true).await.unwrap();
    let names: Vec<&str> = everything.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["web-1", "idle"]);
}

// ── Delete ───────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let (_, client) = client();
    let id = client.create(&web_spec()).await.unwrap().id;

    let result = client.delete(id.as_str(), false).await.unwrap();
    assert_eq!(result.message, format!("Container {id} successfully deleted"));

    let err = client.get(id.as_str()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn delete_absent_container_is_not_found() {
    let (_, client) = client();
    let err = client.delete("ghost", true).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn delete_running_requires_force() {
    let (engine, client) = client();
    let id = client.create(&web_spec()).await.unwrap().id;
    let _ = client.start(id.as_str()).await.unwrap();

    let err = client.delete(id.as_str(), false).await.unwrap_err();
    assert!(matches!(err, EngineError::OperationFailed { .. }));
    assert_eq!(engine.container_count().await, 1);

    let _ = client.delete(id.as_str(), true).await.unwrap();
    assert_eq!(engine.container_count().await, 0);
}

// ── Engine conflicts ─────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_name_is_reported_by_engine() {
    let (engine, client) = client();
    let _ = client.create(&web_spec()).await.unwrap();
    let err = client.create(&web_spec()).await.unwrap_err();
    assert!(matches!(err, EngineError::DuplicateName { name } if name == "web-1"));
    assert_eq!(engine.container_count().await, 1);
}

#[tokio::test]
async fn unknown_image_is_reported_by_engine() {
    let client = EngineClient::new(Arc::new(MemoryEngine::with_images(["nginx:1.25"])));
    let err = client
        .create(&ContainerSpec::new("db", "postgres"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ImageNotFound { image } if image == "postgres"));
    assert!(client.create(&web_spec()).await.is_ok());
}

// ── Outage ───────────────────────────────────────────────────────────

#[tokio::test]
async fn offline_engine_is_unavailable_and_nothing_changes() {
    let (engine, client) = client();
    let before = client.create(&web_spec()).await.unwrap();
    let id = before.id.clone();
    engine.set_online(false);

    assert!(matches!(
        client.ping().await.unwrap_err(),
        EngineError::Unavailable { .. }
    ));
    assert!(matches!(
        client.list(true).await.unwrap_err(),
        EngineError::Unavailable { .. }
    ));
    let mut other = web_spec();
    other.name = "web-2".into();
    assert!(matches!(
        client.create(&other).await.unwrap_err(),
        EngineError::Unavailable { .. }
    ));
    assert!(matches!(
        client.get(id.as_str()).await.unwrap_err(),
        EngineError::Unavailable { .. }
    ));
    let update = ContainerUpdate {
        cpu_allocation: Some("high".into()),
        restart_policy: Some("always".into()),
    };
    assert!(matches!(
        client.update(id.as_str(), &update).await.unwrap_err(),
        EngineError::Unavailable { .. }
    ));
    assert!(matches!(
        client.start(id.as_str()).await.unwrap_err(),
        EngineError::Unavailable { .. }
    ));
    assert!(matches!(
        client.stop(id.as_str()).await.unwrap_err(),
        EngineError::Unavailable { .. }
    ));
    assert!(matches!(
        client.restart(id.as_str()).await.unwrap_err(),
        EngineError::Unavailable { .. }
    ));
    assert!(matches!(
        client.delete(id.as_str(), true).await.unwrap_err(),
        EngineError::Unavailable { .. }
    ));

    engine.set_online(true);
    assert_eq!(engine.container_count().await, 1);
    assert_eq!(client.get(id.as_str()).await.unwrap(), before);
}

//! In-process engine backend.
//!
//! Keeps container records in memory and answers with the same status codes
//! a Docker daemon uses, so the client and the HTTP surface can be exercised
//! without a daemon. Nothing is executed.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bollard::container::{Config, UpdateContainerOptions};
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerConfig, ContainerInspectResponse, ContainerState as EngineStatus,
    ContainerStateStatusEnum, EndpointSettings, ImageInspect, MountPoint, MountPointTypeEnum,
    NetworkSettings,
};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::{EngineApi, EngineResult};

const DEFAULT_NETWORK: &str = "bridge";
const FIRST_EPHEMERAL_PORT: u16 = 32768;
const BRIDGE_SUBNET: Ipv4Addr = Ipv4Addr::new(172, 17, 0, 0);
const BRIDGE_GATEWAY: Ipv4Addr = Ipv4Addr::new(172, 17, 0, 1);
const FIRST_HOST_OFFSET: u32 = 2;
const LAST_HOST_OFFSET: u32 = 65_534;

#[derive(Debug)]
struct Inventory {
    containers: Vec<ContainerInspectResponse>,
    images: Vec<ImageInspect>,
    next_host_port: u16,
    next_address: u32,
}

impl Inventory {
    /// Resolves an ID, a name (with or without the leading `/`) or a unique
    /// ID prefix to a position.
    fn position(&self, key: &str) -> EngineResult<usize> {
        if key.is_empty() {
            return Err(not_found(key));
        }
        if let Some(idx) = self
            .containers
            .iter()
            .position(|c| c.id.as_deref() == Some(key))
        {
            return Ok(idx);
        }
        let bare = key.trim_start_matches('/');
        if let Some(idx) = self
            .containers
            .iter()
            .position(|c| c.name.as_deref().map(|n| n.trim_start_matches('/')) == Some(bare))
        {
            return Ok(idx);
        }
        let matches: Vec<usize> = self
            .containers
            .iter()
            .enumerate()
            .filter(|(_, c)| c.id.as_deref().is_some_and(|id| id.starts_with(key)))
            .map(|(idx, _)| idx)
            .collect();
        match matches.as_slice() {
            [idx] => Ok(*idx),
            _ => Err(not_found(key)),
        }
    }

    /// Finds an image by ID or by reference; untagged references mean `:latest`.
    fn image(&self, key: &str) -> Option<&ImageInspect> {
        let qualified = qualify_reference(key);
        self.images.iter().find(|image| {
            image.id.as_deref() == Some(key)
                || image
                    .repo_tags
                    .iter()
                    .flatten()
                    .any(|tag| *tag == qualified)
        })
    }

    /// Records the image a container is created from and returns its ID.
    fn pull(&mut self, reference: &str) -> String {
        let qualified = qualify_reference(reference);
        if let Some(id) = self.image(&qualified).and_then(|image| image.id.clone()) {
            return id;
        }
        let id = format!("sha256:{}", digest(qualified.as_bytes()));
        self.images.push(ImageInspect {
            id: Some(id.clone()),
            repo_tags: Some(vec![qualified]),
            ..Default::default()
        });
        id
    }

    /// Next address on the bridge subnet, wrapping before the broadcast
    /// address.
    fn allocate_address(&mut self) -> Ipv4Addr {
        let offset = self.next_address;
        self.next_address = if offset >= LAST_HOST_OFFSET {
            FIRST_HOST_OFFSET
        } else {
            offset + 1
        };
        Ipv4Addr::from(u32::from(BRIDGE_SUBNET) + offset)
    }

    fn allocate_host_port(&mut self) -> u16 {
        let port = self.next_host_port;
        self.next_host_port = self.next_host_port.checked_add(1).unwrap_or(FIRST_EPHEMERAL_PORT);
        port
    }

    /// Marks a container running and publishes its configured ports.
    fn run(&mut self, idx: usize) {
        let mut bindings = self.containers[idx]
            .host_config
            .as_ref()
            .and_then(|h| h.port_bindings.clone())
            .unwrap_or_default();
        for binding in bindings.values_mut().flatten().flatten() {
            if binding.host_port.as_deref().is_none_or(str::is_empty) {
                binding.host_port = Some(self.allocate_host_port().to_string());
            }
            if binding.host_ip.as_deref().is_none_or(str::is_empty) {
                binding.host_ip = Some("0.0.0.0".to_owned());
            }
        }
        let address = self.allocate_address().to_string();
        let container = &mut self.containers[idx];
        set_status(container, ContainerStateStatusEnum::RUNNING);
        let network = container.network_settings.get_or_insert_with(NetworkSettings::default);
        network.ports = Some(bindings);
        for endpoint in network.networks.iter_mut().flat_map(HashMap::values_mut) {
            endpoint.ip_address = Some(address.clone());
            endpoint.gateway = Some(BRIDGE_GATEWAY.to_string());
        }
    }

    /// Marks a container exited and withdraws its published ports.
    fn halt(&mut self, idx: usize) {
        let container = &mut self.containers[idx];
        set_status(container, ContainerStateStatusEnum::EXITED);
        if let Some(network) = container.network_settings.as_mut() {
            network.ports = None;
            for endpoint in network.networks.iter_mut().flat_map(HashMap::values_mut) {
                endpoint.ip_address = Some(String::new());
                endpoint.gateway = Some(String::new());
            }
        }
    }
}

/// Engine backend holding containers in process memory.
#[derive(Debug)]
pub struct MemoryEngine {
    inventory: RwLock<Inventory>,
    images: Option<HashSet<String>>,
    online: AtomicBool,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Creates an empty engine that accepts any image reference.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inventory: RwLock::new(Inventory {
                containers: Vec::new(),
                images: Vec::new(),
                next_host_port: FIRST_EPHEMERAL_PORT,
                next_address: FIRST_HOST_OFFSET,
            }),
            images: None,
            online: AtomicBool::new(true),
        }
    }

    /// Creates an empty engine that only knows the given image references.
    /// An untagged reference also matches its `:latest` entry.
    #[must_use]
    pub fn with_images<I, S>(images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            images: Some(images.into_iter().map(Into::into).collect()),
            ..Self::new()
        }
    }

    /// Simulates the engine going away or coming back. While offline every
    /// call fails with a refused connection and nothing changes.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of containers currently held.
    pub async fn container_count(&self) -> usize {
        self.inventory.read().await.containers.len()
    }

    fn ensure_online(&self) -> EngineResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "memory engine is offline",
            )
            .into())
        }
    }

    fn image_known(&self, reference: &str) -> bool {
        self.images.as_ref().is_none_or(|images| {
            images.contains(reference) || images.contains(&qualify_reference(reference))
        })
    }
}

#[async_trait]
impl EngineApi for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> EngineResult<()> {
        self.ensure_online()
    }

    async fn list_container_ids(&self, all: bool) -> EngineResult<Vec<String>> {
        self.ensure_online()?;
        let inventory = self.inventory.read().await;
        Ok(inventory
            .containers
            .iter()
            .filter(|c| all || is_running(c))
            .filter_map(|c| c.id.clone())
            .collect())
    }

    async fn create_container(&self, name: &str, config: Config<String>) -> EngineResult<String> {
        self.ensure_online()?;
        let mut inventory = self.inventory.write().await;

        let slashed = format!("/{name}");
        if let Some(existing) = inventory
            .containers
            .iter()
            .find(|c| c.name.as_deref() == Some(slashed.as_str()))
        {
            return Err(server_error(
                409,
                format!(
                    "Conflict. The container name \"{slashed}\" is already in use by container \"{}\". \
                     You have to remove (or rename) that container to be able to reuse that name.",
                    existing.id.as_deref().unwrap_or_default()
                ),
            ));
        }

        let image = config.image.clone().unwrap_or_default();
        if !self.image_known(&image) {
            return Err(server_error(404, format!("No such image: {image}")));
        }

        let image_id = inventory.pull(&image);
        let id = digest(uuid::Uuid::new_v4().as_bytes());
        let host = config.host_config.unwrap_or_default();
        let mounts: Vec<MountPoint> = host
            .binds
            .iter()
            .flatten()
            .map(String::as_str)
            .map(mount_point)
            .collect();
        let network_mode = host
            .network_mode
            .clone()
            .filter(|mode| !mode.is_empty())
            .unwrap_or_else(|| DEFAULT_NETWORK.to_owned());
        let endpoint = EndpointSettings {
            network_id: Some(digest(network_mode.as_bytes())),
            ip_address: Some(String::new()),
            gateway: Some(String::new()),
            mac_address: Some(String::new()),
            ..Default::default()
        };

        inventory.containers.push(ContainerInspectResponse {
            id: Some(id.clone()),
            name: Some(slashed),
            created: Some(chrono::Utc::now().to_rfc3339()),
            image: Some(image_id),
            state: Some(EngineStatus {
                status: Some(ContainerStateStatusEnum::CREATED),
                running: Some(false),
                ..Default::default()
            }),
            config: Some(ContainerConfig {
                image: Some(image),
                env: config.env,
                cmd: config.cmd,
                labels: config.labels,
                exposed_ports: config.exposed_ports,
                ..Default::default()
            }),
            host_config: Some(host),
            mounts: Some(mounts),
            network_settings: Some(NetworkSettings {
                networks: Some(HashMap::from([(network_mode, endpoint)])),
                ..Default::default()
            }),
            ..Default::default()
        });
        tracing::debug!(container = %id, name, "memory engine created container");
        Ok(id)
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerInspectResponse> {
        self.ensure_online()?;
        let inventory = self.inventory.read().await;
        let idx = inventory.position(id)?;
        Ok(inventory.containers[idx].clone())
    }

    async fn inspect_image(&self, image: &str) -> EngineResult<ImageInspect> {
        self.ensure_online()?;
        let inventory = self.inventory.read().await;
        inventory
            .image(image)
            .cloned()
            .ok_or_else(|| server_error(404, format!("No such image: {image}")))
    }

    async fn update_container(
        &self,
        id: &str,
        options: UpdateContainerOptions<String>,
    ) -> EngineResult<()> {
        self.ensure_online()?;
        let mut inventory = self.inventory.write().await;
        let idx = inventory.position(id)?;
        let host = inventory.containers[idx]
            .host_config
            .get_or_insert_with(Default::default);
        if let Some(shares) = options.cpu_shares {
            host.cpu_shares = Some(i64::try_from(shares).unwrap_or(i64::MAX));
        }
        if let Some(policy) = options.restart_policy {
            host.restart_policy = Some(policy);
        }
        Ok(())
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        self.ensure_online()?;
        let mut inventory = self.inventory.write().await;
        let idx = inventory.position(id)?;
        if !is_running(&inventory.containers[idx]) {
            inventory.run(idx);
        }
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> EngineResult<()> {
        self.ensure_online()?;
        let mut inventory = self.inventory.write().await;
        let idx = inventory.position(id)?;
        if is_running(&inventory.containers[idx]) {
            inventory.halt(idx);
        }
        Ok(())
    }

    async fn restart_container(&self, id: &str) -> EngineResult<()> {
        self.ensure_online()?;
        let mut inventory = self.inventory.write().await;
        let idx = inventory.position(id)?;
        if is_running(&inventory.containers[idx]) {
            inventory.halt(idx);
        }
        inventory.run(idx);
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> EngineResult<()> {
        self.ensure_online()?;
        let mut inventory = self.inventory.write().await;
        let idx = inventory.position(id)?;
        if is_running(&inventory.containers[idx]) && !force {
            let full_id = inventory.containers[idx].id.clone().unwrap_or_default();
            return Err(server_error(
                409,
                format!(
                    "You cannot remove a running container {full_id}. \
                     Stop the container before attempting removal or force remove"
                ),
            ));
        }
        let _ = inventory.containers.remove(idx);
        Ok(())
    }
}

fn server_error(status_code: u16, message: String) -> BollardError {
    BollardError::DockerResponseServerError {
        status_code,
        message,
    }
}

fn not_found(key: &str) -> BollardError {
    server_error(404, format!("No such container: {key}"))
}

/// Appends `:latest` when the last path segment carries neither a tag nor a
/// digest.
fn qualify_reference(reference: &str) -> String {
    let last = reference.rsplit('/').next().unwrap_or(reference);
    if last.contains(':') || last.contains('@') {
        reference.to_owned()
    } else {
        format!("{reference}:latest")
    }
}

fn digest(input: &[u8]) -> String {
    format!("{:x}", Sha256::digest(input))
}

fn is_running(container: &ContainerInspectResponse) -> bool {
    container.state.as_ref().and_then(|s| s.status.as_ref())
        == Some(&ContainerStateStatusEnum::RUNNING)
}

fn set_status(container: &mut ContainerInspectResponse, status: ContainerStateStatusEnum) {
    let running = status == ContainerStateStatusEnum::RUNNING;
    let state = container.state.get_or_insert_with(EngineStatus::default);
    state.status = Some(status);
    state.running = Some(running);
}

/// Parses a `source:destination[:ro|rw]` bind string into a mount record.
fn mount_point(bind: &str) -> MountPoint {
    let mut parts = bind.splitn(3, ':');
    let source = parts.next().unwrap_or_default().to_owned();
    let destination = parts.next().unwrap_or_default().to_owned();
    let mode = parts.next().unwrap_or_default().to_owned();
    let named_volume = !source.starts_with('/');
    MountPoint {
        typ: Some(if named_volume {
            MountPointTypeEnum::VOLUME
        } else {
            MountPointTypeEnum::BIND
        }),
        name: named_volume.then(|| source.clone()),
        rw: Some(mode != "ro"),
        source: Some(source),
        destination: Some(destination),
        mode: Some(mode),
        ..Default::default()
    }
}

//! Translation between engine-agnostic shapes and engine wire shapes.
//!
//! Everything here is pure and infallible. Inputs are expected to have passed
//! [`ContainerSpec::validate`]; entries that would not have are dropped
//! rather than reported, and missing engine fields fall back to empty values.

use std::collections::{BTreeMap, HashMap};

use berth_common::constants::{
    CPU_SHARES_FALLBACK, CPU_SHARES_MEDIUM, DEFAULT_RESTART_POLICY, LABEL_ICON_URL,
    LABEL_WEB_UI_PREFIX,
};
use berth_common::request::{
    ContainerSpec, ContainerUpdate, RestartPolicyKind, RestartPolicySpec, VolumeTarget,
    normalize_port_key,
};
use berth_common::types::{
    ContainerId, ContainerState, CpuAllocation, DeviceInfo, HostBinding, NetworkAttachment,
    VolumeMount, WebUi,
};
use bollard::container::{Config, UpdateContainerOptions};
use bollard::models::{
    ContainerInspectResponse, DeviceMapping, EndpointSettings, HostConfig, ImageInspect,
    MountPoint, PortBinding, PortMap, RestartPolicy, RestartPolicyNameEnum,
};

// ── CPU allocation ───────────────────────────────────────────────────

/// Maps a tier name to CPU shares; unknown names get the engine default.
#[must_use]
pub fn tier_to_shares(tier: &str) -> i64 {
    CpuAllocation::parse(tier).map_or(CPU_SHARES_FALLBACK, CpuAllocation::shares)
}

/// Classifies a share value into a tier.
///
/// Not the inverse of [`tier_to_shares`] except on 512, 1024 and 2048.
#[must_use]
pub const fn shares_to_tier(shares: i64) -> CpuAllocation {
    CpuAllocation::from_shares(shares)
}

/// Shares reported for a container; only an absent value falls back to
/// 1024. A reported 0 is classified as is.
#[must_use]
pub fn effective_shares(shares: Option<i64>) -> i64 {
    shares.unwrap_or(CPU_SHARES_MEDIUM)
}

// ── Output formatting ────────────────────────────────────────────────

/// Reduces each port to its first host binding; unbound ports are omitted.
#[must_use]
pub fn format_ports(ports: Option<&PortMap>) -> BTreeMap<String, HostBinding> {
    ports
        .into_iter()
        .flatten()
        .filter_map(|(port, bindings)| {
            let first = bindings.as_ref()?.first()?;
            Some((
                port.clone(),
                HostBinding {
                    host_ip: first.host_ip.clone().unwrap_or_default(),
                    host_port: first.host_port.clone().unwrap_or_default(),
                },
            ))
        })
        .collect()
}

/// Maps engine mount records; `readonly` is the negation of the engine's
/// `RW` flag and defaults to `false` when the flag is missing.
#[must_use]
pub fn format_volumes(mounts: Option<&[MountPoint]>) -> Vec<VolumeMount> {
    mounts
        .unwrap_or_default()
        .iter()
        .map(|mount| VolumeMount {
            source: mount.source.clone().unwrap_or_default(),
            destination: mount.destination.clone().unwrap_or_default(),
            kind: mount.typ.as_ref().map(ToString::to_string).unwrap_or_default(),
            readonly: mount.rw.is_some_and(|rw| !rw),
        })
        .collect()
}

/// Joins command tokens with single spaces; no tokens means no command.
#[must_use]
pub fn format_command(cmd: Option<&[String]>) -> Option<String> {
    match cmd {
        Some(tokens) if !tokens.is_empty() => Some(tokens.join(" ")),
        _ => None,
    }
}

/// Passes the engine's `KEY=VALUE` list through unchanged.
#[must_use]
pub fn format_environment(env: Option<&[String]>) -> Vec<String> {
    env.map(<[String]>::to_vec).unwrap_or_default()
}

/// Maps engine device records.
#[must_use]
pub fn format_devices(devices: Option<&[DeviceMapping]>) -> Vec<DeviceInfo> {
    devices
        .unwrap_or_default()
        .iter()
        .map(|device| DeviceInfo {
            path_on_host: device.path_on_host.clone().unwrap_or_default(),
            path_in_container: device.path_in_container.clone().unwrap_or_default(),
            cgroup_permissions: device.cgroup_permissions.clone().unwrap_or_default(),
        })
        .collect()
}

/// Maps per-network endpoint settings.
#[must_use]
pub fn format_networks(
    networks: Option<&HashMap<String, EndpointSettings>>,
) -> BTreeMap<String, NetworkAttachment> {
    networks
        .into_iter()
        .flatten()
        .map(|(name, endpoint)| {
            (
                name.clone(),
                NetworkAttachment {
                    network_id: endpoint.network_id.clone().unwrap_or_default(),
                    ip_address: endpoint.ip_address.clone().unwrap_or_default(),
                    gateway: endpoint.gateway.clone().unwrap_or_default(),
                    mac_address: endpoint.mac_address.clone().unwrap_or_default(),
                },
            )
        })
        .collect()
}

/// Splits the tag off an image reference at the last `:`.
///
/// A registry port is indistinguishable from a tag here:
/// `registry.local:5000/app` yields `5000/app`.
#[must_use]
pub fn extract_tag(reference: &str) -> Option<String> {
    reference.rsplit_once(':').map(|(_, tag)| tag.to_owned())
}

// ── Input translation ────────────────────────────────────────────────

/// Emits `KEY=VALUE` strings in key order.
#[must_use]
pub fn environment_list(env: &BTreeMap<String, String>) -> Vec<String> {
    env.iter().map(|(key, value)| format!("{key}={value}")).collect()
}

/// Builds engine port bindings keyed by `port/protocol`.
#[must_use]
pub fn port_bindings(spec: &ContainerSpec) -> PortMap {
    spec.ports
        .iter()
        .flatten()
        .filter_map(|(key, target)| {
            let key = normalize_port_key(key).ok()?;
            let (host_ip, host_port) = target.binding().ok()?;
            let binding = PortBinding {
                host_ip: Some(host_ip).filter(|ip| !ip.is_empty()),
                host_port: Some(host_port),
            };
            Some((key, Some(vec![binding])))
        })
        .collect()
}

/// Builds `source:destination[:ro]` bind strings.
#[must_use]
pub fn binds(volumes: &BTreeMap<String, VolumeTarget>) -> Vec<String> {
    volumes
        .iter()
        .map(|(source, target)| {
            let suffix = if target.read_only() { ":ro" } else { "" };
            format!("{source}:{}{suffix}", target.destination())
        })
        .collect()
}

/// Parses `host[:container[:permissions]]`; the container path defaults to
/// the host path and permissions to `rwm`.
#[must_use]
pub fn device_mapping(device: &str) -> DeviceMapping {
    let mut parts = device.splitn(3, ':');
    let host = parts.next().unwrap_or_default().to_owned();
    let container = parts
        .next()
        .filter(|p| !p.is_empty())
        .map_or_else(|| host.clone(), str::to_owned);
    let permissions = parts.next().filter(|p| !p.is_empty()).unwrap_or("rwm");
    DeviceMapping {
        path_on_host: Some(host),
        path_in_container: Some(container),
        cgroup_permissions: Some(permissions.to_owned()),
    }
}

/// Converts a parsed restart policy into the engine's shape.
#[must_use]
pub fn restart_policy(policy: RestartPolicySpec) -> RestartPolicy {
    let name = match policy.kind {
        RestartPolicyKind::No => RestartPolicyNameEnum::NO,
        RestartPolicyKind::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicyKind::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
        RestartPolicyKind::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
    };
    RestartPolicy {
        name: Some(name),
        maximum_retry_count: policy.max_retries,
    }
}

fn parse_restart_policy(value: &str) -> RestartPolicy {
    let parsed = RestartPolicySpec::parse(value)
        .or_else(|_| RestartPolicySpec::parse(DEFAULT_RESTART_POLICY))
        .unwrap_or(RestartPolicySpec {
            kind: RestartPolicyKind::UnlessStopped,
            max_retries: None,
        });
    restart_policy(parsed)
}

/// Informational metadata carried as container labels.
#[must_use]
pub fn metadata_labels(spec: &ContainerSpec) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    if let Some(url) = &spec.icon_url {
        let _ = labels.insert(LABEL_ICON_URL.to_owned(), url.clone());
    }
    if let Some(web_ui) = &spec.web_ui {
        for (key, value) in [
            ("protocol", web_ui.protocol.clone()),
            ("host", web_ui.host.clone()),
            ("port", web_ui.port.to_string()),
            ("path", web_ui.path.clone()),
        ] {
            let _ = labels.insert(format!("{LABEL_WEB_UI_PREFIX}{key}"), value);
        }
    }
    labels
}

/// Builds the full engine create configuration for a validated spec.
#[must_use]
pub fn create_config(spec: &ContainerSpec) -> Config<String> {
    let ports = port_bindings(spec);
    let exposed_ports: HashMap<String, HashMap<(), ()>> = ports
        .keys()
        .map(|key| (key.clone(), HashMap::new()))
        .collect();
    let devices: Vec<DeviceMapping> = spec
        .devices
        .iter()
        .flatten()
        .map(String::as_str)
        .map(device_mapping)
        .collect();
    let binds = spec.volumes.as_ref().map(binds).unwrap_or_default();
    let labels = metadata_labels(spec);

    let host_config = HostConfig {
        privileged: Some(spec.privileged()),
        cpu_shares: Some(tier_to_shares(spec.cpu_allocation())),
        restart_policy: Some(parse_restart_policy(spec.restart_policy())),
        devices: Some(devices).filter(|d| !d.is_empty()),
        port_bindings: Some(ports).filter(|p| !p.is_empty()),
        binds: Some(binds).filter(|b| !b.is_empty()),
        network_mode: spec.network.clone(),
        ..Default::default()
    };

    Config {
        image: Some(spec.image_reference()),
        cmd: spec.command.as_ref().and_then(|c| c.tokens()),
        env: Some(environment_list(
            spec.environment.as_ref().unwrap_or(&BTreeMap::new()),
        )),
        labels: Some(labels).filter(|l| !l.is_empty()),
        exposed_ports: Some(exposed_ports).filter(|p| !p.is_empty()),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// Builds engine update options carrying only the fields present.
#[must_use]
pub fn update_options(update: &ContainerUpdate) -> UpdateContainerOptions<String> {
    UpdateContainerOptions {
        cpu_shares: update
            .cpu_allocation
            .as_deref()
            .map(|tier| isize::try_from(tier_to_shares(tier)).unwrap_or(isize::MAX)),
        restart_policy: update.restart_policy.as_deref().map(parse_restart_policy),
        ..Default::default()
    }
}

// ── Normalization ────────────────────────────────────────────────────

fn web_ui_from_labels(labels: &HashMap<String, String>) -> Option<WebUi> {
    let get = |key: &str| labels.get(&format!("{LABEL_WEB_UI_PREFIX}{key}")).cloned();
    Some(WebUi {
        protocol: get("protocol")?,
        host: get("host")?,
        port: get("port")?.parse().ok()?,
        path: get("path").unwrap_or_default(),
    })
}

/// Resolves the image reference and tag reported for a container.
///
/// The image record's first repository tag wins. Without one the image ID
/// is reported with no tag, and without an ID the configured reference.
#[must_use]
pub fn resolve_image(
    image: Option<&ImageInspect>,
    image_id: Option<String>,
    configured: Option<String>,
) -> (String, Option<String>) {
    if let Some(reference) = image
        .and_then(|i| i.repo_tags.as_ref())
        .and_then(|tags| tags.first())
    {
        return (reference.clone(), extract_tag(reference));
    }
    match (image_id.filter(|id| !id.is_empty()), configured) {
        (Some(id), _) => (id, None),
        (None, Some(reference)) => {
            let tag = extract_tag(&reference);
            (reference, tag)
        }
        (None, None) => (String::new(), None),
    }
}

/// Normalizes an engine inspect record into the stable read model.
///
/// `image` is the engine's record for the container's image, when it still
/// exists. Published ports come from the live network settings; a container
/// that has never run has none, so its configured bindings are reported
/// instead.
#[must_use]
pub fn normalize(
    inspect: ContainerInspectResponse,
    image: Option<&ImageInspect>,
) -> ContainerState {
    let config = inspect.config.unwrap_or_default();
    let host = inspect.host_config.unwrap_or_default();
    let network = inspect.network_settings.unwrap_or_default();
    let labels = config.labels.unwrap_or_default();

    let (image, tag) = resolve_image(image, inspect.image, config.image);
    let live_ports = format_ports(network.ports.as_ref());
    let ports = if live_ports.is_empty() {
        format_ports(host.port_bindings.as_ref())
    } else {
        live_ports
    };

    ContainerState {
        id: ContainerId::new(inspect.id.unwrap_or_default()),
        name: inspect
            .name
            .map(|n| n.trim_start_matches('/').to_owned())
            .unwrap_or_default(),
        status: inspect
            .state
            .and_then(|s| s.status)
            .map(|s| s.to_string())
            .unwrap_or_default(),
        image,
        tag,
        created: inspect.created,
        ports,
        volumes: format_volumes(inspect.mounts.as_deref()),
        devices: format_devices(host.devices.as_deref()),
        environment: format_environment(config.env.as_deref()),
        privileged: host.privileged.unwrap_or(false),
        restart_policy: host
            .restart_policy
            .and_then(|p| p.name)
            .map(|n| n.to_string())
            .unwrap_or_default(),
        cpu_allocation: shares_to_tier(effective_shares(host.cpu_shares)),
        network: format_networks(network.networks.as_ref()),
        command: format_command(config.cmd.as_deref()),
        icon_url: labels.get(LABEL_ICON_URL).cloned(),
        web_ui: web_ui_from_labels(&labels),
    }
}

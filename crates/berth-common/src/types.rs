//! Domain primitive types and the normalized container read model.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{CPU_SHARES_HIGH, CPU_SHARES_LOW, CPU_SHARES_MEDIUM};

/// Engine-assigned identifier for a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Coarse CPU allocation class mapped onto engine CPU shares.
///
/// `shares()` and `from_shares()` are only inverse on the three canonical
/// share values. Shares written by other tools are bucketed: `<= 512` is
/// `Low`, `<= 1024` is `Medium`, anything above is `High`. A container
/// configured elsewhere with 700 shares reads back as `Medium` and would be
/// rewritten to 1024 if its tier were re-applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuAllocation {
    /// 512 shares.
    Low,
    /// 1024 shares (engine default).
    Medium,
    /// 2048 shares.
    High,
}

impl CpuAllocation {
    /// Canonical share value for this tier.
    #[must_use]
    pub const fn shares(self) -> i64 {
        match self {
            Self::Low => CPU_SHARES_LOW,
            Self::Medium => CPU_SHARES_MEDIUM,
            Self::High => CPU_SHARES_HIGH,
        }
    }

    /// Classifies an engine share value into a tier.
    #[must_use]
    pub const fn from_shares(shares: i64) -> Self {
        if shares <= CPU_SHARES_LOW {
            Self::Low
        } else if shares <= CPU_SHARES_MEDIUM {
            Self::Medium
        } else {
            Self::High
        }
    }

    /// Parses a tier name, ignoring ASCII case.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for CpuAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Informational web UI descriptor. Never enforced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebUi {
    /// `http` or `https`.
    pub protocol: String,
    /// Host address.
    pub host: String,
    /// Port number.
    pub port: u16,
    /// URL path.
    pub path: String,
}

/// Host side of a published container port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostBinding {
    /// Host interface address (empty means all interfaces).
    #[serde(rename = "HostIp")]
    pub host_ip: String,
    /// Host port.
    #[serde(rename = "HostPort")]
    pub host_port: String,
}

/// A resolved volume mount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Host path or volume name.
    pub source: String,
    /// Path inside the container.
    pub destination: String,
    /// Mount type (`bind`, `volume`, `tmpfs`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Whether the mount is read-only.
    pub readonly: bool,
}

/// A resolved host device mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device path on the host.
    pub path_on_host: String,
    /// Device path inside the container.
    pub path_in_container: String,
    /// Cgroup permissions (`rwm` subset).
    pub cgroup_permissions: String,
}

/// Attachment of a container to one engine network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    /// Engine network ID.
    pub network_id: String,
    /// Endpoint IPv4 address.
    pub ip_address: String,
    /// Gateway address.
    pub gateway: String,
    /// Endpoint MAC address.
    pub mac_address: String,
}

/// Normalized, engine-agnostic view of a container.
///
/// Always a snapshot: the engine is the source of truth, and every mutation
/// is followed by a fresh read rather than a local patch of this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    /// Engine-assigned identity.
    pub id: ContainerId,
    /// Container name without the engine's leading slash.
    pub name: String,
    /// Engine-reported lifecycle status (`created`, `running`, `exited`, ...).
    pub status: String,
    /// Resolved image reference.
    pub image: String,
    /// Tag parsed from `image`, split on the last colon.
    pub tag: Option<String>,
    /// Creation timestamp as reported by the engine.
    pub created: Option<String>,
    /// Published ports, first host binding per container port.
    pub ports: BTreeMap<String, HostBinding>,
    /// Volume mounts.
    pub volumes: Vec<VolumeMount>,
    /// Device mappings.
    pub devices: Vec<DeviceInfo>,
    /// Raw `KEY=VALUE` environment list.
    pub environment: Vec<String>,
    /// Whether the container runs privileged.
    pub privileged: bool,
    /// Restart policy name.
    pub restart_policy: String,
    /// Tier derived from the engine's CPU shares.
    pub cpu_allocation: CpuAllocation,
    /// Network attachments keyed by network name.
    pub network: BTreeMap<String, NetworkAttachment>,
    /// Command as a single display string.
    pub command: Option<String>,
    /// Informational icon URL.
    pub icon_url: Option<String>,
    /// Informational web UI descriptor.
    pub web_ui: Option<WebUi>,
}

/// Result of an operation that leaves no container state to return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Operation result message.
    pub message: String,
}

//! Global configuration model for the Berth lifecycle service.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_API_PREFIX, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_ENGINE_TIMEOUT_SECS,
    DEFAULT_LISTEN_ADDR,
};
use crate::error::{BerthError, Result};

/// Which engine backend the service drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackendKind {
    /// A Docker-compatible daemon.
    #[default]
    Docker,
    /// The in-process engine, for local development.
    Memory,
}

impl fmt::Display for EngineBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Engine connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Backend kind.
    pub backend: EngineBackendKind,
    /// Engine address (`unix:///var/run/docker.sock`, `tcp://host:2375`).
    /// Local defaults apply when unset.
    pub host: Option<String>,
    /// Per-request timeout inside the engine client, in seconds.
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackendKind::default(),
            host: None,
            timeout_secs: DEFAULT_ENGINE_TIMEOUT_SECS,
        }
    }
}

/// Credential sources for the bearer token gate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// File of `subject:sha256-hex` lines.
    pub tokens_file: Option<PathBuf>,
    /// A single plaintext token granted to the `admin` subject.
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
}

impl AuthConfig {
    /// Whether at least one credential source is configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.tokens_file.is_some() || self.api_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Root configuration for the lifecycle service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BerthConfig {
    /// Socket address the HTTP surface binds to.
    pub listen_addr: String,
    /// Prefix for all versioned routes.
    pub api_prefix: String,
    /// Deadline applied by the service around each engine call, in seconds.
    pub call_timeout_secs: u64,
    /// Engine connection settings.
    pub engine: EngineConfig,
    /// Credential sources.
    pub auth: AuthConfig,
}

impl Default for BerthConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            engine: EngineConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl BerthConfig {
    /// Deadline around a single engine call.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Rejects configurations the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Config` when no credential source is set, the
    /// prefix is malformed, or a timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if !self.auth.has_credentials() {
            return Err(BerthError::Config {
                message: "no credential source configured; set a tokens file or an API token"
                    .into(),
            });
        }
        if !self.api_prefix.starts_with('/') || self.api_prefix.ends_with('/') {
            return Err(BerthError::Config {
                message: format!(
                    "api prefix {:?} must start with '/' and not end with one",
                    self.api_prefix
                ),
            });
        }
        if self.call_timeout_secs == 0 || self.engine.timeout_secs == 0 {
            return Err(BerthError::Config {
                message: "timeouts must be at least one second".into(),
            });
        }
        Ok(())
    }
}

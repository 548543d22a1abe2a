//! Request payloads accepted at the service boundary and their validation.
//!
//! Payloads are deliberately forgiving in shape (a command may be a string or
//! a token list, a port binding may be a number or `ip:port`) and strict in
//! content: [`ContainerSpec::validate`] and [`ContainerUpdate::validate`]
//! report every offending field at once.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CPU_ALLOCATION, DEFAULT_RESTART_POLICY, MAX_IMAGE_LENGTH, MAX_NAME_LENGTH,
    MAX_TAG_LENGTH,
};
use crate::error::{BerthError, FieldError, Result};
use crate::types::WebUi;

/// Container command, accepted as one string or as explicit tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandInput {
    /// A single command line, split on whitespace.
    Line(String),
    /// Pre-split argument vector.
    Tokens(Vec<String>),
}

impl CommandInput {
    /// Normalizes the command into a token list.
    ///
    /// Returns `None` when no tokens remain, so the image default applies.
    /// Quoting is not interpreted: `sh -c "a b"` yields four tokens. Callers
    /// that need exact arguments send a token list.
    #[must_use]
    pub fn tokens(&self) -> Option<Vec<String>> {
        let tokens: Vec<String> = match self {
            Self::Line(line) => line.split_whitespace().map(str::to_owned).collect(),
            Self::Tokens(tokens) => tokens.clone(),
        };
        if tokens.is_empty() { None } else { Some(tokens) }
    }
}

/// Host side of a port mapping: `8080`, `"8080"`, `"127.0.0.1:8080"`, or `""`
/// for an engine-chosen port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortTarget {
    /// Host port number on all interfaces.
    Port(u16),
    /// `port` or `ip:port`.
    Text(String),
}

impl PortTarget {
    /// Splits the target into `(host_ip, host_port)`.
    ///
    /// # Errors
    ///
    /// Returns a message when the port part is not a valid port number.
    pub fn binding(&self) -> std::result::Result<(String, String), String> {
        match self {
            Self::Port(0) => Err("host port must be between 1 and 65535".into()),
            Self::Port(port) => Ok((String::new(), port.to_string())),
            Self::Text(text) => {
                let text = text.trim();
                let (ip, port) = text.rsplit_once(':').unwrap_or(("", text));
                if port.is_empty() {
                    return Ok((ip.to_owned(), String::new()));
                }
                match port.parse::<u16>() {
                    Ok(p) if p > 0 => Ok((ip.to_owned(), p.to_string())),
                    _ => Err(format!("invalid host port {port:?}")),
                }
            }
        }
    }
}

/// Normalizes a container port key to `port/protocol`, defaulting to `tcp`.
///
/// # Errors
///
/// Returns a message when the port or protocol is invalid.
pub fn normalize_port_key(key: &str) -> std::result::Result<String, String> {
    let (port, proto) = key.trim().split_once('/').unwrap_or((key.trim(), "tcp"));
    let proto = proto.to_ascii_lowercase();
    if !matches!(proto.as_str(), "tcp" | "udp" | "sctp") {
        return Err(format!("unsupported protocol {proto:?}"));
    }
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(format!("{p}/{proto}")),
        _ => Err(format!("invalid container port {port:?}")),
    }
}

/// Kind of a requested mount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// Host path bind mount.
    #[default]
    Bind,
    /// Named engine volume.
    Volume,
}

/// Container side of a volume mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VolumeTarget {
    /// Plain container path, mounted read-write.
    Path(String),
    /// Detailed mapping.
    Detailed {
        /// Path inside the container.
        bind: String,
        /// `ro` or `rw`.
        #[serde(default)]
        mode: Option<String>,
        /// Read-only flag; wins over `mode` when both are given.
        #[serde(default)]
        read_only: Option<bool>,
        /// Mount type.
        #[serde(default, rename = "type")]
        kind: Option<MountKind>,
    },
}

impl VolumeTarget {
    /// Path inside the container.
    #[must_use]
    pub fn destination(&self) -> &str {
        match self {
            Self::Path(path) | Self::Detailed { bind: path, .. } => path,
        }
    }

    /// Whether the mount is read-only.
    #[must_use]
    pub fn read_only(&self) -> bool {
        match self {
            Self::Path(_) => false,
            Self::Detailed {
                mode, read_only, ..
            } => read_only.unwrap_or_else(|| mode.as_deref() == Some("ro")),
        }
    }

    /// Requested mount kind.
    #[must_use]
    pub fn kind(&self) -> MountKind {
        match self {
            Self::Path(_) => MountKind::Bind,
            Self::Detailed { kind, .. } => kind.unwrap_or_default(),
        }
    }
}

/// Restart policy names understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestartPolicyKind {
    /// Never restart.
    No,
    /// Always restart.
    Always,
    /// Restart unless explicitly stopped.
    UnlessStopped,
    /// Restart on non-zero exit.
    OnFailure,
}

impl fmt::Display for RestartPolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::No => write!(f, "no"),
            Self::Always => write!(f, "always"),
            Self::UnlessStopped => write!(f, "unless-stopped"),
            Self::OnFailure => write!(f, "on-failure"),
        }
    }
}

/// A parsed restart policy, e.g. `on-failure:5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicySpec {
    /// Policy name.
    pub kind: RestartPolicyKind,
    /// Retry ceiling, only meaningful for `on-failure`.
    pub max_retries: Option<i64>,
}

impl RestartPolicySpec {
    /// Parses `no|always|unless-stopped|on-failure[:N]`.
    ///
    /// # Errors
    ///
    /// Returns a message for unknown names or a retry count on a policy
    /// other than `on-failure`.
    pub fn parse(value: &str) -> std::result::Result<Self, String> {
        let value = value.trim();
        let (name, retries) = match value.split_once(':') {
            Some((name, count)) => {
                let count = count
                    .parse::<i64>()
                    .ok()
                    .filter(|c| *c >= 0)
                    .ok_or_else(|| format!("invalid retry count {count:?}"))?;
                (name, Some(count))
            }
            None => (value, None),
        };
        let kind = match name {
            "no" => RestartPolicyKind::No,
            "always" => RestartPolicyKind::Always,
            "unless-stopped" => RestartPolicyKind::UnlessStopped,
            "on-failure" => RestartPolicyKind::OnFailure,
            other => return Err(format!("unknown restart policy {other:?}")),
        };
        if retries.is_some() && kind != RestartPolicyKind::OnFailure {
            return Err("a retry count is only valid with on-failure".into());
        }
        Ok(Self {
            kind,
            max_retries: retries,
        })
    }
}

/// Creation input: the engine-agnostic description of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name, unique within the engine.
    pub name: String,
    /// Image reference without tag.
    pub image: String,
    /// Optional tag, joined to `image` with `:`.
    #[serde(default)]
    pub tag: Option<String>,
    /// Informational icon URL.
    #[serde(default)]
    pub icon_url: Option<String>,
    /// Informational web UI descriptor.
    #[serde(default)]
    pub web_ui: Option<WebUi>,
    /// Network mode or network name.
    #[serde(default)]
    pub network: Option<String>,
    /// Container port to host binding.
    #[serde(default)]
    pub ports: Option<BTreeMap<String, PortTarget>>,
    /// Host path (or volume name) to container mount.
    #[serde(default)]
    pub volumes: Option<BTreeMap<String, VolumeTarget>>,
    /// Environment variables.
    #[serde(default)]
    pub environment: Option<BTreeMap<String, String>>,
    /// Device mappings as `host[:container[:permissions]]`.
    #[serde(default)]
    pub devices: Option<Vec<String>>,
    /// Command override.
    #[serde(default)]
    pub command: Option<CommandInput>,
    /// Privileged mode.
    #[serde(default)]
    pub privileged: Option<bool>,
    /// CPU tier name (`low`, `medium`, `high`).
    #[serde(default)]
    pub cpu_allocation: Option<String>,
    /// Restart policy.
    #[serde(default)]
    pub restart_policy: Option<String>,
}

impl ContainerSpec {
    /// Minimal spec with the two required fields set.
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Self::default()
        }
    }

    /// `image:tag` when a tag is present, `image` otherwise.
    #[must_use]
    pub fn image_reference(&self) -> String {
        match self.tag.as_deref().filter(|t| !t.is_empty()) {
            Some(tag) => format!("{}:{tag}", self.image),
            None => self.image.clone(),
        }
    }

    /// Requested CPU tier name, defaulting to `low`.
    #[must_use]
    pub fn cpu_allocation(&self) -> &str {
        self.cpu_allocation
            .as_deref()
            .unwrap_or(DEFAULT_CPU_ALLOCATION)
    }

    /// Requested restart policy, defaulting to `unless-stopped`.
    #[must_use]
    pub fn restart_policy(&self) -> &str {
        self.restart_policy
            .as_deref()
            .unwrap_or(DEFAULT_RESTART_POLICY)
    }

    /// Privileged flag, defaulting to `false`.
    #[must_use]
    pub fn privileged(&self) -> bool {
        self.privileged.unwrap_or(false)
    }

    /// Checks every field and reports all violations together.
    ///
    /// The CPU tier is not checked: unknown tiers fall back to the engine
    /// default share value during translation.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Validation` listing each offending field.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        check_name(&self.name, &mut errors);
        check_image(&self.image, &mut errors);
        if let Some(tag) = &self.tag {
            check_tag(tag, &mut errors);
        }
        if let Some(url) = &self.icon_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(FieldError::new("icon_url", "must be an http(s) URL"));
            }
        }
        if let Some(web_ui) = &self.web_ui {
            check_web_ui(web_ui, &mut errors);
        }
        if let Some(network) = &self.network {
            if network.trim().is_empty() || network.contains(char::is_whitespace) {
                errors.push(FieldError::new(
                    "network",
                    "must be a non-empty name without whitespace",
                ));
            }
        }
        for (key, target) in self.ports.iter().flatten() {
            let field = format!("ports.{key}");
            if let Err(message) = normalize_port_key(key) {
                errors.push(FieldError::new(field.clone(), message));
            }
            if let Err(message) = target.binding() {
                errors.push(FieldError::new(field, message));
            }
        }
        for (source, target) in self.volumes.iter().flatten() {
            check_volume(source, target, &mut errors);
        }
        for key in self.environment.iter().flat_map(BTreeMap::keys) {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                errors.push(FieldError::new(
                    format!("environment.{key}"),
                    "variable names must be non-empty and contain no '='",
                ));
            }
        }
        for (idx, device) in self.devices.iter().flatten().enumerate() {
            if let Err(message) = check_device(device) {
                errors.push(FieldError::new(format!("devices.{idx}"), message));
            }
        }
        if let Some(CommandInput::Tokens(tokens)) = &self.command {
            if tokens.iter().any(|t| t.contains('\0')) {
                errors.push(FieldError::new("command", "tokens must not contain NUL"));
            }
        }
        if let Err(message) = RestartPolicySpec::parse(self.restart_policy()) {
            errors.push(FieldError::new("restart_policy", message));
        }
        finish(errors)
    }
}

/// Partial update. Absent fields keep their current engine value.
///
/// Only settings the engine can change on a live container are accepted;
/// anything else (ports, volumes, environment) needs a new container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerUpdate {
    /// New CPU tier name.
    #[serde(default)]
    pub cpu_allocation: Option<String>,
    /// New restart policy.
    #[serde(default)]
    pub restart_policy: Option<String>,
}

impl ContainerUpdate {
    /// Whether the payload carries no field at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.cpu_allocation.is_none() && self.restart_policy.is_none()
    }

    /// Checks the fields that are present.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Validation` listing each offending field.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if let Some(policy) = &self.restart_policy {
            if let Err(message) = RestartPolicySpec::parse(policy) {
                errors.push(FieldError::new("restart_policy", message));
            }
        }
        finish(errors)
    }
}

fn finish(errors: Vec<FieldError>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(BerthError::Validation { errors })
    }
}

fn check_name(name: &str, errors: &mut Vec<FieldError>) {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphanumeric()
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        }
        None => false,
    };
    if !valid {
        errors.push(FieldError::new(
            "name",
            "must start with a letter or digit and contain only [a-zA-Z0-9_.-]",
        ));
    } else if name.len() > MAX_NAME_LENGTH {
        errors.push(FieldError::new(
            "name",
            format!("must be at most {MAX_NAME_LENGTH} characters"),
        ));
    }
}

fn check_image(image: &str, errors: &mut Vec<FieldError>) {
    if image.is_empty() {
        errors.push(FieldError::new("image", "is required"));
    } else if image.contains(char::is_whitespace) {
        errors.push(FieldError::new("image", "must not contain whitespace"));
    } else if image.len() > MAX_IMAGE_LENGTH {
        errors.push(FieldError::new(
            "image",
            format!("must be at most {MAX_IMAGE_LENGTH} characters"),
        ));
    }
}

fn check_tag(tag: &str, errors: &mut Vec<FieldError>) {
    let mut chars = tag.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphanumeric() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        }
        None => false,
    };
    if !valid || tag.len() > MAX_TAG_LENGTH {
        errors.push(FieldError::new(
            "tag",
            format!("must match [A-Za-z0-9_][A-Za-z0-9_.-]{{0,{}}}", MAX_TAG_LENGTH - 1),
        ));
    }
}

fn check_web_ui(web_ui: &WebUi, errors: &mut Vec<FieldError>) {
    if !matches!(web_ui.protocol.as_str(), "http" | "https") {
        errors.push(FieldError::new("web_ui.protocol", "must be http or https"));
    }
    if web_ui.host.trim().is_empty() {
        errors.push(FieldError::new("web_ui.host", "is required"));
    }
    if web_ui.port == 0 {
        errors.push(FieldError::new("web_ui.port", "must be between 1 and 65535"));
    }
}

fn check_volume(source: &str, target: &VolumeTarget, errors: &mut Vec<FieldError>) {
    let field = format!("volumes.{source}");
    match target.kind() {
        MountKind::Bind if !source.starts_with('/') => {
            errors.push(FieldError::new(
                field.clone(),
                "bind source must be an absolute host path",
            ));
        }
        MountKind::Volume if source.is_empty() || source.contains('/') => {
            errors.push(FieldError::new(
                field.clone(),
                "volume source must be a volume name",
            ));
        }
        _ => {}
    }
    if !target.destination().starts_with('/') {
        errors.push(FieldError::new(
            field.clone(),
            "container path must be absolute",
        ));
    }
    if let VolumeTarget::Detailed {
        mode: Some(mode), ..
    } = target
    {
        if !matches!(mode.as_str(), "ro" | "rw") {
            errors.push(FieldError::new(field, "mode must be ro or rw"));
        }
    }
}

fn check_device(device: &str) -> std::result::Result<(), String> {
    let mut parts = device.split(':');
    let host = parts.next().unwrap_or_default();
    if !host.starts_with('/') {
        return Err("host device path must be absolute".into());
    }
    if let Some(container) = parts.next() {
        if !container.starts_with('/') {
            return Err("container device path must be absolute".into());
        }
    }
    if let Some(perms) = parts.next() {
        if perms.is_empty() || !perms.chars().all(|c| matches!(c, 'r' | 'w' | 'm')) {
            return Err("permissions must be a combination of r, w and m".into());
        }
    }
    if parts.next().is_some() {
        return Err("expected host[:container[:permissions]]".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_names(err: BerthError) -> Vec<String> {
        match err {
            BerthError::Validation { errors } => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn image_reference_joins_tag_with_colon() {
        let mut spec = ContainerSpec::new("web-1", "nginx");
        assert_eq!(spec.image_reference(), "nginx");
        spec.tag = Some("1.25".into());
        assert_eq!(spec.image_reference(), "nginx:1.25");
    }

    #[test]
    fn defaults_apply_when_fields_are_absent() {
        let spec: ContainerSpec =
            serde_json::from_str(r#"{"name":"web-1","image":"nginx","privileged":null}"#)
                .expect("parse");
        assert_eq!(spec.cpu_allocation(), "low");
        assert_eq!(spec.restart_policy(), "unless-stopped");
        assert!(!spec.privileged());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn command_accepts_string_or_tokens() {
        let line: CommandInput = serde_json::from_str(r#""nginx -g daemon""#).expect("parse");
        assert_eq!(
            line.tokens(),
            Some(vec!["nginx".into(), "-g".into(), "daemon".into()])
        );
        let tokens: CommandInput = serde_json::from_str(r#"["sh", "-c", "echo hi"]"#).expect("parse");
        assert_eq!(
            tokens.tokens(),
            Some(vec!["sh".into(), "-c".into(), "echo hi".into()])
        );
        assert_eq!(CommandInput::Line("   ".into()).tokens(), None);
        assert_eq!(CommandInput::Tokens(Vec::new()).tokens(), None);
    }

    #[test]
    fn port_targets_parse_numbers_and_addresses() {
        assert_eq!(
            PortTarget::Port(8080).binding(),
            Ok((String::new(), "8080".into()))
        );
        assert_eq!(
            PortTarget::Text("127.0.0.1:9000".into()).binding(),
            Ok(("127.0.0.1".into(), "9000".into()))
        );
        assert_eq!(
            PortTarget::Text(String::new()).binding(),
            Ok((String::new(), String::new()))
        );
        assert!(PortTarget::Text("web".into()).binding().is_err());
        assert!(PortTarget::Port(0).binding().is_err());
    }

    #[test]
    fn port_keys_default_to_tcp() {
        assert_eq!(normalize_port_key("80"), Ok("80/tcp".into()));
        assert_eq!(normalize_port_key("53/UDP"), Ok("53/udp".into()));
        assert!(normalize_port_key("80/icmp").is_err());
        assert!(normalize_port_key("http").is_err());
    }

    #[test]
    fn volume_targets_expose_mode_and_kind() {
        let plain = VolumeTarget::Path("/data".into());
        assert!(!plain.read_only());
        assert_eq!(plain.kind(), MountKind::Bind);

        let detailed: VolumeTarget =
            serde_json::from_str(r#"{"bind":"/etc/app","mode":"ro","type":"volume"}"#)
                .expect("parse");
        assert_eq!(detailed.destination(), "/etc/app");
        assert!(detailed.read_only());
        assert_eq!(detailed.kind(), MountKind::Volume);
    }

    #[test]
    fn restart_policies_parse() {
        let policy = RestartPolicySpec::parse("on-failure:3").expect("parse");
        assert_eq!(policy.kind, RestartPolicyKind::OnFailure);
        assert_eq!(policy.max_retries, Some(3));
        assert_eq!(
            RestartPolicySpec::parse("always").map(|p| p.kind),
            Ok(RestartPolicyKind::Always)
        );
        assert!(RestartPolicySpec::parse("always:2").is_err());
        assert!(RestartPolicySpec::parse("sometimes").is_err());
    }

    #[test]
    fn validate_reports_every_bad_field() {
        let mut spec = ContainerSpec::new("-bad", "ng inx");
        spec.tag = Some(":latest".into());
        spec.restart_policy = Some("sometimes".into());
        spec.ports = Some(BTreeMap::from([("80".into(), PortTarget::Text("x".into()))]));
        spec.volumes = Some(BTreeMap::from([(
            "relative".into(),
            VolumeTarget::Path("/data".into()),
        )]));
        spec.environment = Some(BTreeMap::from([("A=B".into(), "1".into())]));
        spec.devices = Some(vec!["/dev/snd:/dev/snd:rwx".into()]);

        let fields = field_names(spec.validate().expect_err("should fail"));
        assert_eq!(
            fields,
            vec![
                "name",
                "image",
                "tag",
                "ports.80",
                "volumes.relative",
                "environment.A=B",
                "devices.0",
                "restart_policy",
            ]
        );
    }

    #[test]
    fn unknown_cpu_tier_is_not_a_validation_error() {
        let mut spec = ContainerSpec::new("web-1", "nginx");
        spec.cpu_allocation = Some("turbo".into());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn update_rejects_unknown_fields() {
        let result = serde_json::from_str::<ContainerUpdate>(r#"{"ports":{"80":8080}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn update_validates_restart_policy_only_when_present() {
        let update: ContainerUpdate =
            serde_json::from_str(r#"{"restart_policy":"always"}"#).expect("parse");
        assert!(!update.is_empty());
        assert!(update.validate().is_ok());
        assert!(ContainerUpdate::default().is_empty());

        let bad = ContainerUpdate {
            restart_policy: Some("never".into()),
            ..ContainerUpdate::default()
        };
        assert_eq!(field_names(bad.validate().expect_err("fail")), vec!["restart_policy"]);
    }
}

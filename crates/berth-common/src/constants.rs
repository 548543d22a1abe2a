//! System-wide constants and defaults.

/// Default listen address of the HTTP surface.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8000";

/// Route prefix under which all versioned endpoints are mounted.
pub const DEFAULT_API_PREFIX: &str = "/api/v1";

/// Engine client request timeout in seconds (connection and I/O).
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 120;

/// Service-side deadline around a single Engine Client call, in seconds.
///
/// Must exceed the engine's graceful stop window or a `stop` on a slow
/// container is reported as failed while the engine keeps working on it.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;

/// CPU shares assigned for the `low` allocation tier.
pub const CPU_SHARES_LOW: i64 = 512;

/// CPU shares assigned for the `medium` allocation tier.
pub const CPU_SHARES_MEDIUM: i64 = 1024;

/// CPU shares assigned for the `high` allocation tier.
pub const CPU_SHARES_HIGH: i64 = 2048;

/// Shares used when an unrecognized tier name is supplied on input.
pub const CPU_SHARES_FALLBACK: i64 = CPU_SHARES_MEDIUM;

/// Restart policy applied when a create request omits one.
pub const DEFAULT_RESTART_POLICY: &str = "unless-stopped";

/// CPU tier applied when a create request omits one.
pub const DEFAULT_CPU_ALLOCATION: &str = "low";

/// Maximum accepted container name length.
pub const MAX_NAME_LENGTH: usize = 128;

/// Maximum accepted image reference length.
pub const MAX_IMAGE_LENGTH: usize = 255;

/// Maximum accepted image tag length.
pub const MAX_TAG_LENGTH: usize = 128;

/// Label carrying the informational icon URL.
pub const LABEL_ICON_URL: &str = "berth.icon_url";

/// Label prefix for the informational web UI descriptor.
pub const LABEL_WEB_UI_PREFIX: &str = "berth.web_ui.";

/// Subject assigned to the single configured API token.
pub const DEFAULT_TOKEN_SUBJECT: &str = "admin";

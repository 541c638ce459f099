//! Tunable setting descriptors.
//!
//! Each setting names its override key, its environment variable and the
//! textual form of its built-in default. Defaults are parsed by the same code
//! that parses environment values so the two can never disagree.

/// Declared type of a tunable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Str,
    Int,
    Bool,
    /// Ordered, comma separated in the environment.
    List,
    /// Unordered and deduplicated, comma separated in the environment.
    Set,
}

impl std::fmt::Display for SettingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SettingKind::Str => "string",
            SettingKind::Int => "integer",
            SettingKind::Bool => "boolean",
            SettingKind::List => "list",
            SettingKind::Set => "set",
        };
        f.write_str(name)
    }
}

/// A single tunable: override key, environment key and default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunableSetting {
    /// Key used in the `[gateway]` table and with `--set`.
    pub name: &'static str,
    /// Environment variable consulted when no override is present.
    pub env: &'static str,
    pub kind: SettingKind,
    /// `None` means the setting resolves to unset.
    pub default: Option<&'static str>,
}

const fn setting(
    name: &'static str,
    env: &'static str,
    kind: SettingKind,
    default: Option<&'static str>,
) -> TunableSetting {
    TunableSetting {
        name,
        env,
        kind,
        default,
    }
}

use SettingKind::{Bool, Int, List, Set, Str};

pub const REMOTE_HOSTS: TunableSetting = setting("remote_hosts", "EG_REMOTE_HOSTS", List, Some("localhost"));
pub const YARN_ENDPOINT: TunableSetting = setting("yarn_endpoint", "EG_YARN_ENDPOINT", Str, None);
pub const ALT_YARN_ENDPOINT: TunableSetting = setting("alt_yarn_endpoint", "EG_ALT_YARN_ENDPOINT", Str, None);
pub const YARN_ENDPOINT_SECURITY_ENABLED: TunableSetting = setting(
    "yarn_endpoint_security_enabled",
    "EG_YARN_ENDPOINT_SECURITY_ENABLED",
    Bool,
    Some("false"),
);
pub const CONDUCTOR_ENDPOINT: TunableSetting = setting("conductor_endpoint", "EG_CONDUCTOR_ENDPOINT", Str, None);
pub const IMPERSONATION_ENABLED: TunableSetting =
    setting("impersonation_enabled", "EG_IMPERSONATION_ENABLED", Bool, Some("false"));
pub const UNAUTHORIZED_USERS: TunableSetting =
    setting("unauthorized_users", "EG_UNAUTHORIZED_USERS", Set, Some("root"));
pub const AUTHORIZED_USERS: TunableSetting = setting("authorized_users", "EG_AUTHORIZED_USERS", Set, Some(""));
pub const PORT_RANGE: TunableSetting = setting("port_range", "EG_PORT_RANGE", Str, Some("0..0"));
pub const MAX_KERNELS_PER_USER: TunableSetting =
    setting("max_kernels_per_user", "EG_MAX_KERNELS_PER_USER", Int, Some("-1"));
pub const WS_PING_INTERVAL_SECS: TunableSetting =
    setting("ws_ping_interval_secs", "EG_WS_PING_INTERVAL_SECS", Int, Some("30"));

// Listener and startup
pub const IP: TunableSetting = setting("ip", "EG_IP", Str, Some("127.0.0.1"));
pub const PORT: TunableSetting = setting("port", "EG_PORT", Int, Some("8888"));
pub const API: TunableSetting = setting("api", "EG_API", Str, Some("jupyter-websocket"));
pub const DEFAULT_KERNEL_NAME: TunableSetting =
    setting("default_kernel_name", "EG_DEFAULT_KERNEL_NAME", Str, Some("python3"));
pub const PRESPAWN_COUNT: TunableSetting = setting("prespawn_count", "EG_PRESPAWN_COUNT", Int, None);
pub const MAX_KERNELS: TunableSetting = setting("max_kernels", "EG_MAX_KERNELS", Int, None);
pub const CERTFILE: TunableSetting = setting("certfile", "EG_CERTFILE", Str, None);
pub const KEYFILE: TunableSetting = setting("keyfile", "EG_KEYFILE", Str, None);

// Sessions
pub const SESSION_PERSISTENCE: TunableSetting =
    setting("session_persistence", "EG_KERNEL_SESSION_PERSISTENCE", Bool, Some("false"));
pub const PERSISTENCE_ROOT: TunableSetting =
    setting("persistence_root", "EG_PERSISTENCE_ROOT", Str, Some("kernel-sessions"));
pub const RECOVERY_TIMEOUT_SECS: TunableSetting =
    setting("recovery_timeout_secs", "EG_RECOVERY_TIMEOUT_SECS", Int, Some("5"));
pub const CULL_IDLE_TIMEOUT_SECS: TunableSetting =
    setting("cull_idle_timeout_secs", "EG_CULL_IDLE_TIMEOUT", Int, Some("0"));
pub const CULL_INTERVAL_SECS: TunableSetting = setting("cull_interval_secs", "EG_CULL_INTERVAL", Int, Some("300"));
pub const SHUTDOWN_GRACE_SECS: TunableSetting =
    setting("shutdown_grace_secs", "EG_SHUTDOWN_GRACE_SECS", Int, Some("5"));

// Observability
pub const METRICS_ADDRESS: TunableSetting = setting("metrics_address", "EG_METRICS_ADDRESS", Str, None);

/// Every known setting. Overrides naming anything else are rejected.
pub const ALL: &[TunableSetting] = &[
    REMOTE_HOSTS,
    YARN_ENDPOINT,
    ALT_YARN_ENDPOINT,
    YARN_ENDPOINT_SECURITY_ENABLED,
    CONDUCTOR_ENDPOINT,
    IMPERSONATION_ENABLED,
    UNAUTHORIZED_USERS,
    AUTHORIZED_USERS,
    PORT_RANGE,
    MAX_KERNELS_PER_USER,
    WS_PING_INTERVAL_SECS,
    IP,
    PORT,
    API,
    DEFAULT_KERNEL_NAME,
    PRESPAWN_COUNT,
    MAX_KERNELS,
    CERTFILE,
    KEYFILE,
    SESSION_PERSISTENCE,
    PERSISTENCE_ROOT,
    RECOVERY_TIMEOUT_SECS,
    CULL_IDLE_TIMEOUT_SECS,
    CULL_INTERVAL_SECS,
    SHUTDOWN_GRACE_SECS,
    METRICS_ADDRESS,
];

pub fn lookup(name: &str) -> Option<&'static TunableSetting> {
    ALL.iter().find(|s| s.name == name)
}

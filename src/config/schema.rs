//! Resolved gateway configuration.
//!
//! `GatewayConfig` is built once by the resolver and shared via `Arc`.
//! Nothing reads configuration from the environment after this point.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::resolver::ConfigResolver;
use crate::config::settings;
use crate::error::{GatewayError, Result};
use crate::security::PortRange;
use crate::services::kernelspecs::KernelSpec;

/// Root configuration for the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Listener address.
    pub ip: String,
    pub port: u16,

    /// TLS material; both must be set to serve https.
    pub certfile: Option<PathBuf>,
    pub keyfile: Option<PathBuf>,

    /// Personality name.
    pub api: String,

    /// Hosts eligible for kernel launches.
    pub remote_hosts: Vec<String>,

    /// Resource-manager endpoints, passed through to cluster launchers.
    pub yarn_endpoint: Option<String>,
    pub alt_yarn_endpoint: Option<String>,
    pub yarn_endpoint_security_enabled: bool,
    pub conductor_endpoint: Option<String>,

    pub impersonation_enabled: bool,
    pub unauthorized_users: BTreeSet<String>,
    pub authorized_users: BTreeSet<String>,

    pub port_range: PortRange,

    /// -1 disables the per-user limit.
    pub max_kernels_per_user: i64,

    /// Global kernel limit.
    pub max_kernels: Option<usize>,

    pub prespawn_count: Option<usize>,
    pub default_kernel_name: String,

    /// 0 disables keep-alive pings.
    pub ws_ping_interval_secs: u64,

    pub session_persistence: bool,
    pub persistence_root: PathBuf,
    pub recovery_timeout_secs: u64,

    /// 0 disables idle culling.
    pub cull_idle_timeout_secs: u64,
    pub cull_interval_secs: u64,

    pub shutdown_grace_secs: u64,

    pub metrics_address: Option<String>,

    pub kernel_specs: Vec<KernelSpec>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 8888,
            certfile: None,
            keyfile: None,
            api: "jupyter-websocket".to_string(),
            remote_hosts: vec!["localhost".to_string()],
            yarn_endpoint: None,
            alt_yarn_endpoint: None,
            yarn_endpoint_security_enabled: false,
            conductor_endpoint: None,
            impersonation_enabled: false,
            unauthorized_users: BTreeSet::from(["root".to_string()]),
            authorized_users: BTreeSet::new(),
            port_range: PortRange::DISABLED,
            max_kernels_per_user: -1,
            max_kernels: None,
            prespawn_count: None,
            default_kernel_name: "python3".to_string(),
            ws_ping_interval_secs: 30,
            session_persistence: false,
            persistence_root: PathBuf::from("kernel-sessions"),
            recovery_timeout_secs: 5,
            cull_idle_timeout_secs: 0,
            cull_interval_secs: 300,
            shutdown_grace_secs: 5,
            metrics_address: None,
            kernel_specs: vec![KernelSpec::builtin_python()],
        }
    }
}

impl GatewayConfig {
    /// Resolve every tunable. Declared kernel specs replace the built-in one.
    pub fn resolve(resolver: &ConfigResolver, kernel_specs: Vec<KernelSpec>) -> Result<Self> {
        let port_range = resolver
            .string(&settings::PORT_RANGE)?
            .map(|raw| raw.parse::<PortRange>())
            .transpose()?
            .unwrap_or_default();

        let certfile = resolver.string(&settings::CERTFILE)?.map(PathBuf::from);
        let keyfile = resolver.string(&settings::KEYFILE)?.map(PathBuf::from);
        if certfile.is_some() != keyfile.is_some() {
            return Err(GatewayError::config("certfile and keyfile must be set together"));
        }

        let kernel_specs = if kernel_specs.is_empty() {
            vec![KernelSpec::builtin_python()]
        } else {
            kernel_specs
        };

        Ok(Self {
            ip: resolver.string(&settings::IP)?.unwrap_or_default(),
            port: port(resolver)?,
            certfile,
            keyfile,
            api: resolver.string(&settings::API)?.unwrap_or_default(),
            remote_hosts: resolver.list(&settings::REMOTE_HOSTS)?,
            yarn_endpoint: resolver.string(&settings::YARN_ENDPOINT)?,
            alt_yarn_endpoint: resolver.string(&settings::ALT_YARN_ENDPOINT)?,
            yarn_endpoint_security_enabled: resolver.boolean(&settings::YARN_ENDPOINT_SECURITY_ENABLED)?,
            conductor_endpoint: resolver.string(&settings::CONDUCTOR_ENDPOINT)?,
            impersonation_enabled: resolver.boolean(&settings::IMPERSONATION_ENABLED)?,
            unauthorized_users: resolver.set(&settings::UNAUTHORIZED_USERS)?,
            authorized_users: resolver.set(&settings::AUTHORIZED_USERS)?,
            port_range,
            max_kernels_per_user: resolver.int(&settings::MAX_KERNELS_PER_USER)?.unwrap_or(-1),
            max_kernels: optional_count(resolver, &settings::MAX_KERNELS)?,
            prespawn_count: optional_count(resolver, &settings::PRESPAWN_COUNT)?,
            default_kernel_name: resolver.string(&settings::DEFAULT_KERNEL_NAME)?.unwrap_or_default(),
            ws_ping_interval_secs: seconds(resolver, &settings::WS_PING_INTERVAL_SECS)?,
            session_persistence: resolver.boolean(&settings::SESSION_PERSISTENCE)?,
            persistence_root: PathBuf::from(resolver.string(&settings::PERSISTENCE_ROOT)?.unwrap_or_default()),
            recovery_timeout_secs: seconds(resolver, &settings::RECOVERY_TIMEOUT_SECS)?,
            cull_idle_timeout_secs: seconds(resolver, &settings::CULL_IDLE_TIMEOUT_SECS)?,
            cull_interval_secs: seconds(resolver, &settings::CULL_INTERVAL_SECS)?,
            shutdown_grace_secs: seconds(resolver, &settings::SHUTDOWN_GRACE_SECS)?,
            metrics_address: resolver.string(&settings::METRICS_ADDRESS)?,
            kernel_specs,
        })
    }

    /// `https` when TLS material is configured.
    pub fn scheme(&self) -> &'static str {
        if self.tls_enabled() {
            "https"
        } else {
            "http"
        }
    }

    pub fn tls_enabled(&self) -> bool {
        self.certfile.is_some() && self.keyfile.is_some()
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.ip, self.port)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    pub fn ws_ping_interval(&self) -> Option<Duration> {
        (self.ws_ping_interval_secs > 0).then(|| Duration::from_secs(self.ws_ping_interval_secs))
    }

    pub fn cull_idle_timeout(&self) -> Option<Duration> {
        (self.cull_idle_timeout_secs > 0).then(|| Duration::from_secs(self.cull_idle_timeout_secs))
    }
}

fn port(resolver: &ConfigResolver) -> Result<u16> {
    let raw = resolver.int(&settings::PORT)?.unwrap_or(8888);
    u16::try_from(raw).map_err(|_| GatewayError::config(format!("port {} is out of range", raw)))
}

fn seconds(resolver: &ConfigResolver, setting: &settings::TunableSetting) -> Result<u64> {
    let raw = resolver.int(setting)?.unwrap_or(0);
    u64::try_from(raw).map_err(|_| GatewayError::config(format!("setting '{}' must not be negative", setting.name)))
}

fn optional_count(resolver: &ConfigResolver, setting: &settings::TunableSetting) -> Result<Option<usize>> {
    resolver
        .int(setting)?
        .map(|raw| {
            usize::try_from(raw)
                .map_err(|_| GatewayError::config(format!("setting '{}' must not be negative", setting.name)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolver::{Environment, Overrides};

    #[test]
    fn test_defaults_match_resolution() {
        let resolved = GatewayConfig::resolve(&ConfigResolver::default(), Vec::new()).unwrap();
        assert_eq!(resolved, GatewayConfig::default());
    }

    #[test]
    fn test_environment_applied() {
        let env = Environment::from_pairs([
            ("EG_PORT_RANGE", "40000..40100"),
            ("EG_MAX_KERNELS_PER_USER", "2"),
            ("EG_AUTHORIZED_USERS", "alice,bob"),
            ("EG_CERTFILE", "/tls/cert.pem"),
            ("EG_KEYFILE", "/tls/key.pem"),
        ]);
        let config = GatewayConfig::resolve(&ConfigResolver::new(Overrides::default(), env), Vec::new()).unwrap();
        assert_eq!(config.port_range, PortRange::new(40000, 40100).unwrap());
        assert_eq!(config.max_kernels_per_user, 2);
        assert_eq!(config.authorized_users.len(), 2);
        assert_eq!(config.scheme(), "https");
        assert_eq!(config.base_url(), "https://127.0.0.1:8888");
    }

    #[test]
    fn test_invalid_port_range_is_fatal() {
        let env = Environment::from_pairs([("EG_PORT_RANGE", "100..50")]);
        let err = GatewayConfig::resolve(&ConfigResolver::new(Overrides::default(), env), Vec::new());
        assert!(matches!(err, Err(GatewayError::Configuration(_))));
    }

    #[test]
    fn test_half_configured_tls_is_fatal() {
        for (key, value) in [("EG_CERTFILE", "/tls/cert.pem"), ("EG_KEYFILE", "/tls/key.pem")] {
            let env = Environment::from_pairs([(key, value)]);
            let err = GatewayConfig::resolve(&ConfigResolver::new(Overrides::default(), env), Vec::new());
            assert!(matches!(err, Err(GatewayError::Configuration(_))), "{} alone was accepted", key);
        }
    }

    #[test]
    fn test_negative_counts_rejected() {
        let env = Environment::from_pairs([("EG_MAX_KERNELS", "-3")]);
        let err = GatewayConfig::resolve(&ConfigResolver::new(Overrides::default(), env), Vec::new());
        assert!(matches!(err, Err(GatewayError::Configuration(_))));
    }

    #[test]
    fn test_ping_interval_zero_disables() {
        let env = Environment::from_pairs([("EG_WS_PING_INTERVAL_SECS", "0")]);
        let config = GatewayConfig::resolve(&ConfigResolver::new(Overrides::default(), env), Vec::new()).unwrap();
        assert_eq!(config.ws_ping_interval(), None);
        assert_eq!(GatewayConfig::default().ws_ping_interval(), Some(Duration::from_secs(30)));
    }
}

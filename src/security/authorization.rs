//! Kernel launch authorization.
//!
//! Users are compared case-sensitively. The deny set takes precedence over
//! the allow set; an empty allow set admits every user that is not denied.

use std::collections::BTreeSet;

use crate::config::GatewayConfig;
use crate::security::Decision;

/// Deny/allow sets evaluated for every launch request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    unauthorized_users: BTreeSet<String>,
    authorized_users: BTreeSet<String>,
}

impl AuthorizationPolicy {
    pub fn new(unauthorized_users: BTreeSet<String>, authorized_users: BTreeSet<String>) -> Self {
        Self {
            unauthorized_users,
            authorized_users,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.unauthorized_users.clone(), config.authorized_users.clone())
    }

    pub fn authorize(&self, user: &str) -> Decision {
        if self.unauthorized_users.contains(user) {
            return Decision::Reject;
        }
        if !self.authorized_users.is_empty() && !self.authorized_users.contains(user) {
            return Decision::Reject;
        }
        Decision::Accept
    }

    /// Advisory startup check: true when kernels may run as the gateway's own
    /// identity because impersonation is on and that identity is not denied.
    pub fn warn_if_unsafe_impersonation(&self, impersonation_enabled: bool, gateway_user: &str) -> bool {
        impersonation_enabled && !self.unauthorized_users.contains(gateway_user)
    }
}

/// Identity of the gateway process, from the usual login variables.
pub fn gateway_user() -> String {
    ["LOGNAME", "USER", "LNAME", "USERNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Kernel launch request:
//!     → authorization.rs (deny set, then allow set)
//!     → limits.rs (per-user quota, check-and-increment)
//!     → ports.rs (transport ports from the configured band)
//!     → Pass to the launcher
//! ```
//!
//! # Design Decisions
//! - Decisions are pure functions of the resolved configuration
//! - Fail closed: a rejection stops the launch before any resources are taken
//! - Static contradictions are caught at startup, not per request

pub mod authorization;
pub mod limits;
pub mod ports;

pub use authorization::AuthorizationPolicy;
pub use limits::KernelQuota;
pub use ports::{PortAllocator, PortChoice, PortRange};

/// Outcome of a policy or quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn is_accept(self) -> bool {
        self == Decision::Accept
    }
}

//! Gateway error taxonomy.
//!
//! Configuration errors are fatal at startup. Authorization and quota
//! rejections are per-request outcomes. Recovery and capability problems
//! are logged and never escape the orchestrator as failures.

use thiserror::Error;

/// Gateway result type.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed or contradictory tunables.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The deny/allow evaluation rejected the user.
    #[error("user '{user}' is not authorized to start kernels")]
    Unauthorized { user: String },

    /// Per-user or global kernel limit reached.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A persisted session could not be reattached.
    #[error("session recovery failed: {0}")]
    Recovery(String),

    /// A dependent manager lacks an optional feature.
    #[error("capability missing: {0}")]
    CapabilityMissing(String),

    /// Unknown kernel, session or spec.
    #[error("not found: {0}")]
    NotFound(String),

    /// The launcher could not start or stop a kernel.
    #[error("launch error: {0}")]
    Launch(String),

    /// Operation not valid in the current lifecycle state.
    #[error("invalid lifecycle state: {0}")]
    State(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

//! Kernel gateway: lifecycle and policy core.
//!
//! # Architecture Overview
//!
//! ```text
//!      flags + TOML + EG_* env
//!               │
//!               ▼
//!      ┌─────────────────┐      ┌──────────────────────────────────────┐
//!      │ ConfigResolver  │─────▶│ GatewayConfig (immutable, Arc)        │
//!      └─────────────────┘      └──────────────────┬───────────────────┘
//!                                                  │
//!                                                  ▼
//!      ┌───────────────────────────────────────────────────────────────┐
//!      │ LifecycleOrchestrator                                          │
//!      │   specs → kernel manager → sessions → validate → recover      │
//!      │   → personality → prespawn                                    │
//!      └──────────────────────────────┬────────────────────────────────┘
//!                                     ▼
//!      ┌───────────────┐   ┌───────────────────┐   ┌──────────────────┐
//!      │ http listener │   │ event loop        │◀──│ ShutdownCoord.   │◀── signals
//!      │ (axum)        │   │ (scheduled stops) │   │                  │
//!      └──────┬────────┘   └───────────────────┘   └──────────────────┘
//!             │
//!             ▼
//!      personality routes → KernelSessionManager → RemoteKernelManager
//!                                                   ├─ AuthorizationPolicy
//!                                                   ├─ KernelQuota
//!                                                   └─ PortAllocator
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod services;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use lifecycle::{Gateway, LifecycleOrchestrator, LifecycleState, Shutdown, ShutdownCoordinator};

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! --set name=value / [gateway] table     (explicit overrides)
//! EG_* environment variables             (snapshotted once)
//! built-in defaults                      (settings.rs)
//!     → resolver.rs (per-setting precedence, typed parsing)
//!     → schema.rs (GatewayConfig, validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once resolved; changes require a restart
//! - Every setting has a default so an empty environment is valid
//! - Unparseable numbers and ranges fail startup before any listener opens

pub mod loader;
pub mod resolver;
pub mod schema;
pub mod settings;

pub use loader::load_config;
pub use resolver::{ConfigResolver, Environment, Overrides, TunableValue};
pub use schema::GatewayConfig;
pub use settings::TunableSetting;

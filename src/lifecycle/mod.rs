//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     spec catalog → kernel manager → session registry
//!         → static validation → session recovery
//!         → personality → prespawn
//!
//! Serving (gateway.rs):
//!     listener ready → Serving → signals + culler → event loop
//!
//! Shutdown (shutdown.rs):
//!     signal → coordinator → (on loop) stop listener, stop loop
//!         → shut down kernels → Stopped
//! ```
//!
//! # Design Decisions
//! - One `StateCell` is the only lifecycle authority
//! - Signal handlers only schedule work on the event loop (scheduler.rs)
//! - Sessions are reconciled before the listener opens

pub mod culler;
pub mod gateway;
pub mod scheduler;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use gateway::Gateway;
pub use scheduler::{EventLoop, LoopCallback, LoopHandle, LoopScheduler};
pub use shutdown::{Shutdown, ShutdownCoordinator};
pub use startup::{DefaultManagers, LifecycleOrchestrator, ManagerFactory};
pub use state::{LifecycleState, StateCell};

//! Managers the lifecycle orchestrator constructs and wires together.
//!
//! # Dependency Order
//! ```text
//! kernelspecs.rs  (spec catalog)
//!     → kernels.rs (execution manager, uses launcher.rs)
//!     → sessions.rs (session registry + persisted-session recovery)
//!     → personality.rs (API surface, initialised last)
//! ```

pub mod kernels;
pub mod kernelspecs;
pub mod launcher;
pub mod personality;
pub mod sessions;

pub use kernels::{IdleCuller, KernelHandle, KernelManager, LaunchParams, RemoteKernelManager};
pub use kernelspecs::{KernelSpec, KernelSpecCatalog, StaticSpecCatalog};
pub use launcher::{KernelLauncher, LaunchRequest, ProcessLauncher};
pub use personality::{create_personality, Personality, PersonalityContext};
pub use sessions::{
    FileSessionStore, KernelSessionManager, KernelSessionRecord, MemorySessionStore, RecoveryReport, SessionStore,
};

//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGHUP, SIGTERM and SIGINT
//! - Forward each delivery to the [`ShutdownCoordinator`]
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The signal task never stops anything itself; the coordinator only
//!   schedules work on the event loop
//! - On non-Unix platforms only Ctrl-C is observed, treated as an interrupt

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::ShutdownCoordinator;

/// Spawn the signal listener. Fails if a handler cannot be registered.
#[cfg(unix)]
pub fn install(coordinator: Arc<ShutdownCoordinator>) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(()) = hangup.recv() => coordinator.on_hangup(),
                Some(()) = terminate.recv() => coordinator.on_terminate(),
                Some(()) = interrupt.recv() => coordinator.on_interrupt(),
                else => break,
            }
        }
    }))
}

#[cfg(not(unix))]
pub fn install(coordinator: Arc<ShutdownCoordinator>) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            coordinator.on_interrupt();
        }
    }))
}

//! Shutdown coordination for the gateway.
//!
//! # Responsibilities
//! - Map hang-up, terminate and interrupt to their lifecycle effect
//! - Perform the stop sequence exactly once
//! - Broadcast shutdown to background tasks (culler, metrics)
//!
//! # Data Flow
//! ```text
//! signal task → ShutdownCoordinator::on_*()
//!     → StateCell::request_stop()   (Serving → StopRequested, first caller only)
//!     → schedule_on_loop(stop listener; stop loop)
//!
//! event loop returns → Gateway final path → Shutdown::trigger()
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::http::ListenerControl;
use crate::lifecycle::scheduler::LoopScheduler;
use crate::lifecycle::state::StateCell;

/// Broadcast that all long-running tasks subscribe to.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns termination requests into a single, loop-scheduled stop.
pub struct ShutdownCoordinator {
    state: Arc<StateCell>,
    scheduler: Arc<dyn LoopScheduler>,
    listener: Arc<dyn ListenerControl>,
    interrupted: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(state: Arc<StateCell>, scheduler: Arc<dyn LoopScheduler>, listener: Arc<dyn ListenerControl>) -> Self {
        Self {
            state,
            scheduler,
            listener,
            interrupted: AtomicBool::new(false),
        }
    }

    /// Hang-up is ignored so the gateway survives losing its terminal.
    pub fn on_hangup(&self) {
        tracing::debug!("Ignoring hang-up signal");
    }

    pub fn on_terminate(&self) {
        tracing::info!("Received signal to terminate");
        self.stop();
    }

    /// First interrupt stops the gateway; later ones are swallowed.
    pub fn on_interrupt(&self) {
        if self.interrupted.swap(true, Ordering::SeqCst) {
            tracing::debug!("Interrupt ignored; shutdown already in progress");
            return;
        }
        tracing::info!("Interrupted, shutting down");
        self.stop();
    }

    /// Request the stop sequence. Only the first call while serving does
    /// anything; the work itself runs on the event loop.
    pub fn stop(&self) {
        if !self.state.request_stop() {
            tracing::debug!(state = %self.state.current(), "Stop already requested or not serving");
            return;
        }

        let listener = self.listener.clone();
        let scheduler = self.scheduler.clone();
        self.scheduler.schedule_on_loop(Box::new(move || {
            listener.stop_accepting();
            scheduler.stop_loop();
        }));
    }
}

//! Idle kernel culling.
//!
//! # Responsibilities
//! - Periodically ask the execution manager which kernels have been idle
//! - Shut those kernels down through the session registry

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::observability::metrics;
use crate::services::{IdleCuller, KernelSessionManager};

/// Background task that reclaims kernels idle for longer than `idle_timeout`.
pub struct CullingMonitor {
    /// Activity source; only present when the manager supports culling.
    culler: Arc<dyn IdleCuller>,
    /// Culled kernels go through the registry so their records are removed.
    sessions: Arc<KernelSessionManager>,
    idle_timeout: Duration,
    /// Time between passes, at least one second.
    interval: Duration,
}

impl CullingMonitor {
    pub fn new(
        culler: Arc<dyn IdleCuller>,
        sessions: Arc<KernelSessionManager>,
        idle_timeout: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            culler,
            sessions,
            idle_timeout,
            // tokio::time::interval panics on zero
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            idle_timeout = ?self.idle_timeout,
            interval = ?self.interval,
            "Idle kernel culling enabled"
        );

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately; nothing can be idle yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.cull_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Culling monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One culling pass. Returns the number of kernels shut down.
    pub async fn cull_once(&self) -> usize {
        let idle = self.culler.idle_kernels(self.idle_timeout);
        let mut culled = 0;
        for kernel_id in idle {
            match self.sessions.shutdown_kernel(&kernel_id).await {
                Ok(()) => {
                    tracing::info!(kernel_id = %kernel_id, idle_timeout = ?self.idle_timeout, "Culled idle kernel");
                    culled += 1;
                }
                Err(e) => tracing::warn!(kernel_id = %kernel_id, error = %e, "Failed to cull idle kernel"),
            }
        }
        if culled > 0 {
            metrics::record_culled(culled);
        }
        culled
    }
}

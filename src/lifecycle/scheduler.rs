//! The gateway's event loop and its scheduling interface.
//!
//! Signal handlers and other asynchronous sources never act directly; they
//! hand a callback to the loop, which runs callbacks one at a time in the
//! order they were scheduled.

use tokio::sync::{mpsc, watch};

pub type LoopCallback = Box<dyn FnOnce() + Send + 'static>;

/// Minimal view of the event loop.
pub trait LoopScheduler: Send + Sync {
    /// Queue `callback` to run on the loop. Never runs it inline.
    fn schedule_on_loop(&self, callback: LoopCallback);

    /// Ask the loop to return once the current callback finishes.
    fn stop_loop(&self);
}

/// Owned side of the loop; `run` drives it.
///
/// Callbacks run one at a time on the task that calls `run`, in the order
/// they were scheduled.
pub struct EventLoop {
    /// Pending callbacks.
    rx: mpsc::UnboundedReceiver<LoopCallback>,
    /// Flips to `true` once `stop_loop` is called.
    stop_rx: watch::Receiver<bool>,
    /// Kept so the channels stay open while the loop runs.
    handle: LoopHandle,
}

/// Cloneable scheduling side, handed to signal handlers and the
/// shutdown coordinator.
#[derive(Clone)]
pub struct LoopHandle {
    /// Queue feeding [`EventLoop::run`].
    tx: mpsc::UnboundedSender<LoopCallback>,
    /// Stop flag observed by the loop.
    stop_tx: watch::Sender<bool>,
}

impl EventLoop {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            rx,
            stop_rx,
            handle: LoopHandle { tx, stop_tx },
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Run scheduled callbacks until `stop_loop` is called.
    pub async fn run(&mut self) {
        tracing::debug!("Event loop running");
        loop {
            if *self.stop_rx.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = self.stop_rx.changed() => {}
                Some(callback) = self.rx.recv() => callback(),
            }
        }
        tracing::debug!("Event loop stopped");
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopScheduler for LoopHandle {
    fn schedule_on_loop(&self, callback: LoopCallback) {
        if self.tx.send(callback).is_err() {
            tracing::debug!("Event loop gone; callback dropped");
        }
    }

    fn stop_loop(&self) {
        self.stop_tx.send_replace(true);
    }
}

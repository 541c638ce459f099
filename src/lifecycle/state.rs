//! Process-wide lifecycle state.
//!
//! ```text
//! Uninitialized → Initializing → Serving → StopRequested → Stopped
//!                      │                                      ▲
//!                      └──────────── (init failure) ──────────┘
//! ```
//!
//! Transitions are compare-and-swap on a single atomic, so concurrent
//! callers (signal task, loop callbacks) agree on who performed each step.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Uninitialized = 0,
    Initializing = 1,
    Serving = 2,
    StopRequested = 3,
    Stopped = 4,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            2 => Self::Serving,
            3 => Self::StopRequested,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// The single authoritative lifecycle state.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Uninitialized as u8))
    }

    pub fn current(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move `from → to`. Returns false, changing nothing, if the state was
    /// not `from`. Nothing leaves `Stopped`.
    pub fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        if from == LifecycleState::Stopped {
            return false;
        }
        let moved = self
            .0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if moved {
            tracing::debug!(%from, %to, "Lifecycle transition");
        }
        moved
    }

    /// Serving → StopRequested. Only the first caller gets `true`.
    pub fn request_stop(&self) -> bool {
        self.transition(LifecycleState::Serving, LifecycleState::StopRequested)
    }

    /// Enter the terminal state from wherever the process is. Returns false
    /// if already stopped.
    pub fn finish(&self) -> bool {
        let previous = self.0.swap(LifecycleState::Stopped as u8, Ordering::SeqCst);
        let from = LifecycleState::from_u8(previous);
        if from != LifecycleState::Stopped {
            tracing::debug!(%from, to = %LifecycleState::Stopped, "Lifecycle transition");
        }
        from != LifecycleState::Stopped
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = StateCell::new();
        assert!(state.transition(LifecycleState::Uninitialized, LifecycleState::Initializing));
        assert!(state.transition(LifecycleState::Initializing, LifecycleState::Serving));
        assert!(state.request_stop());
        assert!(state.finish());
        assert_eq!(state.current(), LifecycleState::Stopped);
    }

    #[test]
    fn test_stop_request_only_once() {
        let state = StateCell::new();
        state.transition(LifecycleState::Uninitialized, LifecycleState::Initializing);
        state.transition(LifecycleState::Initializing, LifecycleState::Serving);
        assert!(state.request_stop());
        assert!(!state.request_stop());
        assert_eq!(state.current(), LifecycleState::StopRequested);
    }

    #[test]
    fn test_stop_request_ignored_before_serving() {
        let state = StateCell::new();
        assert!(!state.request_stop());
        state.transition(LifecycleState::Uninitialized, LifecycleState::Initializing);
        assert!(!state.request_stop());
        assert_eq!(state.current(), LifecycleState::Initializing);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let state = StateCell::new();
        assert!(state.finish());
        assert!(!state.finish());
        assert!(!state.transition(LifecycleState::Stopped, LifecycleState::Serving));
        assert_eq!(state.current(), LifecycleState::Stopped);
    }

    #[test]
    fn test_cannot_restart() {
        let state = StateCell::new();
        assert!(state.transition(LifecycleState::Uninitialized, LifecycleState::Initializing));
        assert!(!state.transition(LifecycleState::Uninitialized, LifecycleState::Initializing));
    }
}

//! Kernel quotas and static limit validation.
//!
//! # Responsibilities
//! - Track active kernels per user
//! - Admit or reject launches against `max_kernels_per_user`
//! - Reject contradictory limits (prespawn above max kernels) at startup
//!
//! # Design Decisions
//! - Check-and-increment happens under the ledger entry's shard lock, so two
//!   concurrent launches for one user can never both take the last slot
//! - A limit of -1 disables the check but counts are still tracked

use dashmap::DashMap;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::security::Decision;

/// Per-user active kernel ledger.
#[derive(Debug)]
pub struct KernelQuota {
    max_per_user: i64,
    ledger: DashMap<String, usize>,
}

impl KernelQuota {
    pub fn new(max_per_user: i64) -> Self {
        Self {
            max_per_user,
            ledger: DashMap::new(),
        }
    }

    pub fn max_per_user(&self) -> i64 {
        self.max_per_user
    }

    /// Admit one more kernel for `user`, incrementing the ledger on success.
    pub fn try_acquire(&self, user: &str) -> Decision {
        let limit = usize::try_from(self.max_per_user).ok();
        // A rejected user never gets a ledger entry.
        if limit == Some(0) {
            return Decision::Reject;
        }
        let mut count = self.ledger.entry(user.to_string()).or_insert(0);
        if limit.is_some_and(|limit| *count >= limit) {
            return Decision::Reject;
        }
        *count += 1;
        Decision::Accept
    }

    /// Count a kernel that already exists (recovered sessions) without
    /// applying the limit.
    pub fn restore(&self, user: &str) {
        *self.ledger.entry(user.to_string()).or_insert(0) += 1;
    }

    pub fn release(&self, user: &str) {
        if let Some(mut count) = self.ledger.get_mut(user) {
            *count = count.saturating_sub(1);
        }
        self.ledger.remove_if(user, |_, count| *count == 0);
    }

    pub fn active(&self, user: &str) -> usize {
        self.ledger.get(user).map(|c| *c).unwrap_or(0)
    }
}

/// Startup check for limits that contradict each other.
pub fn validate_static(config: &GatewayConfig) -> Result<()> {
    if let (Some(prespawn), Some(max)) = (config.prespawn_count, config.max_kernels) {
        if prespawn > max {
            return Err(GatewayError::config(format!(
                "cannot prespawn {}; more than max kernels {}",
                prespawn, max
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_limit_of_two() {
        let quota = KernelQuota::new(2);
        assert_eq!(quota.try_acquire("bob"), Decision::Accept);
        assert_eq!(quota.try_acquire("bob"), Decision::Accept);
        assert_eq!(quota.try_acquire("bob"), Decision::Reject);
        assert_eq!(quota.active("bob"), 2);
        assert_eq!(quota.try_acquire("alice"), Decision::Accept);
    }

    #[test]
    fn test_release_frees_slot() {
        let quota = KernelQuota::new(1);
        assert_eq!(quota.try_acquire("bob"), Decision::Accept);
        assert_eq!(quota.try_acquire("bob"), Decision::Reject);
        quota.release("bob");
        assert_eq!(quota.active("bob"), 0);
        assert_eq!(quota.try_acquire("bob"), Decision::Accept);
    }

    #[test]
    fn test_release_never_underflows() {
        let quota = KernelQuota::new(1);
        quota.release("ghost");
        quota.release("ghost");
        assert_eq!(quota.active("ghost"), 0);
    }

    #[test]
    fn test_unlimited_never_rejects() {
        let quota = KernelQuota::new(-1);
        for _ in 0..1000 {
            assert_eq!(quota.try_acquire("bob"), Decision::Accept);
        }
        assert_eq!(quota.active("bob"), 1000);
    }

    #[test]
    fn test_zero_rejects_everyone() {
        let quota = KernelQuota::new(0);
        assert_eq!(quota.try_acquire("bob"), Decision::Reject);
        assert_eq!(quota.active("bob"), 0);
    }

    #[test]
    fn test_rejections_leave_no_ledger_entries() {
        let quota = KernelQuota::new(0);
        for i in 0..100 {
            assert_eq!(quota.try_acquire(&format!("user-{}", i)), Decision::Reject);
        }
        assert!(quota.ledger.is_empty());

        let quota = KernelQuota::new(1);
        assert_eq!(quota.try_acquire("bob"), Decision::Accept);
        assert_eq!(quota.try_acquire("bob"), Decision::Reject);
        assert_eq!(quota.ledger.len(), 1);
    }

    #[test]
    fn test_restore_ignores_limit() {
        let quota = KernelQuota::new(1);
        quota.restore("bob");
        quota.restore("bob");
        assert_eq!(quota.active("bob"), 2);
        assert_eq!(quota.try_acquire("bob"), Decision::Reject);
    }

    #[test]
    fn test_concurrent_acquire_never_over_admits() {
        let quota = KernelQuota::new(3);
        let admitted = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..32 {
                s.spawn(|| {
                    if quota.try_acquire("bob") == Decision::Accept {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(admitted.load(Ordering::SeqCst), 3);
        assert_eq!(quota.active("bob"), 3);
    }

    #[test]
    fn test_prespawn_above_max_is_fatal() {
        let mut config = GatewayConfig::default();
        config.prespawn_count = Some(5);
        config.max_kernels = Some(3);
        assert!(matches!(validate_static(&config), Err(GatewayError::Configuration(_))));

        config.prespawn_count = Some(3);
        assert!(validate_static(&config).is_ok());

        config.max_kernels = None;
        config.prespawn_count = Some(50);
        assert!(validate_static(&config).is_ok());
    }
}

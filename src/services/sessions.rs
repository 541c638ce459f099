//! Kernel session registry and persistence.
//!
//! # Data Flow
//! ```text
//! start_kernel:    KernelManager::create_session → persist(record)
//! shutdown_kernel: KernelManager::shutdown_session → remove(record) if stopped
//! start_sessions:  list_persisted → reattach each (bounded) → drop failures
//! ```
//!
//! # Design Decisions
//! - Records are owned by the registry; nothing else writes the store
//! - Recovery is best-effort: an unreachable kernel is logged and its record
//!   dropped, never fatal
//! - Each reattach gets its own timeout so one dead host cannot stall startup
//! - A record outlives any kernel that could not be stopped, so the next
//!   start can reattach it

use std::fmt::Debug;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GatewayError, Result};
use crate::observability::metrics;
use crate::services::kernels::{KernelHandle, KernelManager, LaunchParams};
use crate::services::kernelspecs::KernelSpec;

/// Persisted state of one kernel session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KernelSessionRecord {
    pub session_id: String,
    pub kernel: KernelHandle,
    pub launch_params: LaunchParams,
}

impl KernelSessionRecord {
    pub fn kernel_id(&self) -> &str {
        &self.kernel.kernel_id
    }

    pub fn username(&self) -> &str {
        &self.kernel.username
    }
}

/// Storage for session records.
pub trait SessionStore: Send + Sync + Debug {
    fn persist(&self, record: &KernelSessionRecord) -> Result<()>;
    fn list_persisted(&self) -> Result<Vec<KernelSessionRecord>>;
    fn remove(&self, session_id: &str) -> Result<()>;
}

/// Non-durable store used when persistence is disabled.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: DashMap<String, KernelSessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn persist(&self, record: &KernelSessionRecord) -> Result<()> {
        self.records.insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    fn list_persisted(&self) -> Result<Vec<KernelSessionRecord>> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(records)
    }

    fn remove(&self, session_id: &str) -> Result<()> {
        self.records.remove(session_id);
        Ok(())
    }
}

/// One JSON file per session under a root directory.
#[derive(Debug)]
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", session_id))
    }
}

impl SessionStore for FileSessionStore {
    fn persist(&self, record: &KernelSessionRecord) -> Result<()> {
        let tmp = self.root.join(format!(".{}.tmp", record.session_id));
        fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        fs::rename(&tmp, self.path(&record.session_id))?;
        Ok(())
    }

    fn list_persisted(&self) -> Result<Vec<KernelSessionRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read(&path)
                .map_err(GatewayError::from)
                .and_then(|bytes| serde_json::from_slice::<KernelSessionRecord>(&bytes).map_err(GatewayError::from));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable session record");
                }
            }
        }
        records.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(records)
    }

    fn remove(&self, session_id: &str) -> Result<()> {
        match fs::remove_file(self.path(session_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Result of reattaching persisted sessions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub recovered: Vec<String>,
    pub dropped: Vec<String>,
}

/// Session registry wrapping the execution manager.
#[derive(Debug)]
pub struct KernelSessionManager {
    kernels: Arc<dyn KernelManager>,
    store: Arc<dyn SessionStore>,
    recovery_timeout: Duration,
    /// Kernels launched by this process, as opposed to reattached ones.
    started: DashSet<String>,
}

impl KernelSessionManager {
    pub fn new(kernels: Arc<dyn KernelManager>, store: Arc<dyn SessionStore>, recovery_timeout: Duration) -> Self {
        Self {
            kernels,
            store,
            recovery_timeout,
            started: DashSet::new(),
        }
    }

    pub fn kernel_manager(&self) -> &Arc<dyn KernelManager> {
        &self.kernels
    }

    pub async fn start_kernel(&self, spec: &KernelSpec, params: LaunchParams) -> Result<KernelSessionRecord> {
        let kernel = self.kernels.create_session(spec, &params).await?;
        self.started.insert(kernel.kernel_id.clone());
        let record = KernelSessionRecord {
            session_id: Uuid::new_v4().to_string(),
            kernel,
            launch_params: params,
        };
        if let Err(e) = self.store.persist(&record) {
            // A kernel nobody can recover is still usable; keep it running.
            tracing::warn!(session_id = %record.session_id, error = %e, "Failed to persist kernel session");
        }
        Ok(record)
    }

    /// Stop a kernel and drop its record. The record is kept when the
    /// kernel could not be stopped.
    pub async fn shutdown_kernel(&self, kernel_id: &str) -> Result<()> {
        self.kernels.shutdown_session(kernel_id).await?;
        self.started.remove(kernel_id);
        self.forget_kernel(kernel_id);
        Ok(())
    }

    fn forget_kernel(&self, kernel_id: &str) {
        let records = match self.store.list_persisted() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(kernel_id = %kernel_id, error = %e, "Cannot list session records");
                return;
            }
        };
        for record in records.iter().filter(|r| r.kernel_id() == kernel_id) {
            if let Err(e) = self.store.remove(&record.session_id) {
                tracing::warn!(session_id = %record.session_id, error = %e, "Failed to remove session record");
            }
        }
    }

    /// Reattach every persisted session to the live execution manager.
    pub async fn start_sessions(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        let records = match self.store.list_persisted() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot read persisted sessions; starting with none");
                return report;
            }
        };

        for record in records {
            let outcome = tokio::time::timeout(self.recovery_timeout, self.kernels.reattach(&record.kernel)).await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(_) => Some(GatewayError::Recovery(format!(
                    "reattach timed out after {:?}",
                    self.recovery_timeout
                ))),
            };

            match failure {
                None => {
                    tracing::info!(
                        session_id = %record.session_id,
                        kernel_id = %record.kernel_id(),
                        user = %record.username(),
                        "Recovered kernel session"
                    );
                    metrics::record_recovery("recovered");
                    report.recovered.push(record.session_id);
                }
                Some(e) => {
                    tracing::warn!(
                        session_id = %record.session_id,
                        kernel_id = %record.kernel_id(),
                        error = %e,
                        "Dropping unrecoverable kernel session"
                    );
                    metrics::record_recovery("dropped");
                    if let Err(e) = self.store.remove(&record.session_id) {
                        tracing::warn!(session_id = %record.session_id, error = %e, "Failed to remove session record");
                    }
                    report.dropped.push(record.session_id);
                }
            }
        }
        report
    }

    /// Shut down every live kernel. Errors are logged, not returned.
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = self.kernels.list().into_iter().map(|h| h.kernel_id).collect();
        self.shutdown_each(ids).await;
    }

    /// Shut down only the kernels this process launched. Used when startup
    /// fails: reattached kernels and their records are left for the next start.
    pub async fn shutdown_started(&self) {
        let ids: Vec<String> = self.started.iter().map(|id| id.key().clone()).collect();
        self.shutdown_each(ids).await;
    }

    async fn shutdown_each(&self, ids: Vec<String>) {
        for kernel_id in ids {
            if let Err(e) = self.shutdown_kernel(&kernel_id).await {
                tracing::warn!(kernel_id = %kernel_id, error = %e, "Kernel shutdown failed");
            }
        }
    }
}

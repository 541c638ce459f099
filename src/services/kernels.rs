//! Kernel execution manager.
//!
//! # Responsibilities
//! - Create and shut down kernel sessions through a [`KernelLauncher`]
//! - Consult the authorization policy and quotas on every launch
//! - Assign a remote host and transport ports to each kernel
//! - Reattach kernels that survived a gateway restart
//! - Optionally report idle kernels for culling

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::observability::metrics;
use crate::security::{AuthorizationPolicy, KernelQuota, PortAllocator};
use crate::services::kernelspecs::KernelSpec;
use crate::services::launcher::{KernelLauncher, LaunchRequest};

/// Transport ports per kernel: shell, iopub, stdin, heartbeat, control.
pub const PORTS_PER_KERNEL: usize = 5;

/// Launch environment variable naming the requesting user.
pub const KERNEL_USERNAME: &str = "KERNEL_USERNAME";

/// Parameters supplied by the client when starting a kernel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LaunchParams {
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl LaunchParams {
    pub fn for_user(user: &str) -> Self {
        Self {
            env: BTreeMap::from([(KERNEL_USERNAME.to_string(), user.to_string())]),
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.env.get(KERNEL_USERNAME).map(String::as_str).filter(|u| !u.is_empty())
    }
}

/// A live kernel as seen by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KernelHandle {
    pub kernel_id: String,
    pub kernel_name: String,
    /// Owning user, as counted by the quota ledger.
    pub username: String,
    pub host: String,
    pub ports: Vec<u16>,
}

/// Execution manager contract consumed by the session registry.
#[async_trait]
pub trait KernelManager: Send + Sync + Debug {
    async fn create_session(&self, spec: &KernelSpec, params: &LaunchParams) -> Result<KernelHandle>;

    /// Adopt a kernel started by a previous gateway process.
    async fn reattach(&self, handle: &KernelHandle) -> Result<()>;

    async fn shutdown_session(&self, kernel_id: &str) -> Result<KernelHandle>;

    fn get(&self, kernel_id: &str) -> Option<KernelHandle>;

    fn list(&self) -> Vec<KernelHandle>;

    /// Idle-culling support. Resolved once at startup; managers without it
    /// keep the default.
    fn idle_culler(self: Arc<Self>) -> Option<Arc<dyn IdleCuller>> {
        None
    }
}

/// Optional capability: activity tracking for idle culling.
pub trait IdleCuller: Send + Sync + Debug {
    fn touch(&self, kernel_id: &str);
    fn idle_kernels(&self, idle_for: Duration) -> Vec<String>;
}

#[derive(Debug)]
struct ActiveKernel {
    handle: KernelHandle,
    last_activity: Instant,
}

/// Default execution manager.
#[derive(Debug)]
pub struct RemoteKernelManager {
    launcher: Arc<dyn KernelLauncher>,
    policy: AuthorizationPolicy,
    quota: KernelQuota,
    max_kernels: Option<usize>,
    ports: PortAllocator,
    hosts: Vec<String>,
    next_host: AtomicUsize,
    impersonation_enabled: bool,
    gateway_user: String,
    kernels: DashMap<String, ActiveKernel>,
}

impl RemoteKernelManager {
    pub fn new(config: &GatewayConfig, launcher: Arc<dyn KernelLauncher>, gateway_user: String) -> Self {
        Self {
            launcher,
            policy: AuthorizationPolicy::from_config(config),
            quota: KernelQuota::new(config.max_kernels_per_user),
            max_kernels: config.max_kernels,
            ports: PortAllocator::new(config.port_range),
            hosts: config.remote_hosts.clone(),
            next_host: AtomicUsize::new(0),
            impersonation_enabled: config.impersonation_enabled,
            gateway_user,
            kernels: DashMap::new(),
        }
    }

    pub fn quota(&self) -> &KernelQuota {
        &self.quota
    }

    fn next_host(&self) -> String {
        if self.hosts.is_empty() {
            return "localhost".to_string();
        }
        let idx = self.next_host.fetch_add(1, Ordering::Relaxed) % self.hosts.len();
        self.hosts[idx].clone()
    }

    fn reject(&self, reason: &'static str, err: GatewayError) -> GatewayError {
        tracing::warn!(reason, error = %err, "Kernel launch rejected");
        metrics::record_launch_rejected(reason);
        err
    }

    fn launch_env(&self, spec: &KernelSpec, params: &LaunchParams, handle: &KernelHandle) -> BTreeMap<String, String> {
        let mut env = params.env.clone();
        env.insert(KERNEL_USERNAME.to_string(), handle.username.clone());
        env.insert("KERNEL_ID".to_string(), handle.kernel_id.clone());
        env.insert("KERNEL_NAME".to_string(), spec.name.clone());
        env.insert(
            "EG_IMPERSONATION_ENABLED".to_string(),
            if self.impersonation_enabled { "True" } else { "False" }.to_string(),
        );
        env
    }
}

#[async_trait]
impl KernelManager for RemoteKernelManager {
    async fn create_session(&self, spec: &KernelSpec, params: &LaunchParams) -> Result<KernelHandle> {
        let user = params.username().unwrap_or(&self.gateway_user).to_string();

        if !self.policy.authorize(&user).is_accept() {
            return Err(self.reject("unauthorized", GatewayError::Unauthorized { user }));
        }

        if let Some(max) = self.max_kernels {
            if self.kernels.len() >= max {
                return Err(self.reject(
                    "max_kernels",
                    GatewayError::QuotaExceeded(format!("gateway is running the maximum of {} kernels", max)),
                ));
            }
        }

        if !self.quota.try_acquire(&user).is_accept() {
            return Err(self.reject(
                "max_kernels_per_user",
                GatewayError::QuotaExceeded(format!(
                    "user '{}' has reached the maximum of {} active kernels",
                    user,
                    self.quota.max_per_user()
                )),
            ));
        }

        let ports = match self.ports.reserve(PORTS_PER_KERNEL) {
            Ok(ports) => ports,
            Err(e) => {
                self.quota.release(&user);
                return Err(e);
            }
        };

        let handle = KernelHandle {
            kernel_id: Uuid::new_v4().to_string(),
            kernel_name: spec.name.clone(),
            username: user.clone(),
            host: self.next_host(),
            ports,
        };

        let request = LaunchRequest {
            handle: &handle,
            spec,
            env: self.launch_env(spec, params, &handle),
        };
        if let Err(e) = self.launcher.launch(&request).await {
            self.quota.release(&user);
            tracing::error!(kernel_name = %spec.name, user = %user, error = %e, "Kernel launch failed");
            return Err(e);
        }

        self.kernels.insert(
            handle.kernel_id.clone(),
            ActiveKernel {
                handle: handle.clone(),
                last_activity: Instant::now(),
            },
        );
        metrics::set_active_kernels(self.kernels.len());

        tracing::info!(
            kernel_id = %handle.kernel_id,
            kernel_name = %handle.kernel_name,
            user = %handle.username,
            host = %handle.host,
            "Kernel started"
        );
        Ok(handle)
    }

    async fn reattach(&self, handle: &KernelHandle) -> Result<()> {
        if self.kernels.contains_key(&handle.kernel_id) {
            return Ok(());
        }
        self.launcher.probe(handle).await?;

        self.quota.restore(&handle.username);
        self.kernels.insert(
            handle.kernel_id.clone(),
            ActiveKernel {
                handle: handle.clone(),
                last_activity: Instant::now(),
            },
        );
        metrics::set_active_kernels(self.kernels.len());
        Ok(())
    }

    async fn shutdown_session(&self, kernel_id: &str) -> Result<KernelHandle> {
        let (_, kernel) = self
            .kernels
            .remove(kernel_id)
            .ok_or_else(|| GatewayError::NotFound(format!("no such kernel: {}", kernel_id)))?;
        self.quota.release(&kernel.handle.username);
        metrics::set_active_kernels(self.kernels.len());

        if let Err(e) = self.launcher.terminate(&kernel.handle).await {
            // Still running somewhere; keep counting it.
            tracing::warn!(kernel_id = %kernel_id, error = %e, "Kernel could not be stopped");
            self.quota.restore(&kernel.handle.username);
            self.kernels.insert(kernel_id.to_string(), kernel);
            metrics::set_active_kernels(self.kernels.len());
            return Err(e);
        }
        tracing::info!(kernel_id = %kernel_id, user = %kernel.handle.username, "Kernel shut down");
        Ok(kernel.handle)
    }

    fn get(&self, kernel_id: &str) -> Option<KernelHandle> {
        self.kernels.get(kernel_id).map(|k| k.handle.clone())
    }

    fn list(&self) -> Vec<KernelHandle> {
        self.kernels.iter().map(|k| k.handle.clone()).collect()
    }

    fn idle_culler(self: Arc<Self>) -> Option<Arc<dyn IdleCuller>> {
        Some(self)
    }
}

impl IdleCuller for RemoteKernelManager {
    fn touch(&self, kernel_id: &str) {
        if let Some(mut kernel) = self.kernels.get_mut(kernel_id) {
            kernel.last_activity = Instant::now();
        }
    }

    fn idle_kernels(&self, idle_for: Duration) -> Vec<String> {
        self.kernels
            .iter()
            .filter(|k| k.last_activity.elapsed() >= idle_for)
            .map(|k| k.key().clone())
            .collect()
    }
}

//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use kernel_gateway::config::GatewayConfig;
use kernel_gateway::lifecycle::{Gateway, LifecycleState, ManagerFactory};
use kernel_gateway::services::{
    KernelHandle, KernelLauncher, KernelManager, KernelSessionRecord, KernelSpec, KernelSpecCatalog, LaunchParams,
    LaunchRequest, MemorySessionStore, RemoteKernelManager, SessionStore,
};
use kernel_gateway::Result;

pub const GATEWAY_USER: &str = "gateway";
pub const UNREACHABLE_HOST: &str = "unreachable.invalid";

/// Launcher that starts nothing. Probes of [`UNREACHABLE_HOST`] never return.
#[derive(Debug, Default)]
pub struct FakeLauncher {
    pub launched: AtomicUsize,
    pub terminated: Mutex<Vec<String>>,
}

#[async_trait]
impl KernelLauncher for FakeLauncher {
    async fn launch(&self, _request: &LaunchRequest<'_>) -> Result<()> {
        self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn probe(&self, handle: &KernelHandle) -> Result<()> {
        if handle.host == UNREACHABLE_HOST {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(())
    }

    async fn terminate(&self, handle: &KernelHandle) -> Result<()> {
        self.terminated.lock().unwrap().push(handle.kernel_id.clone());
        Ok(())
    }
}

/// Execution manager without the idle-culling capability.
#[derive(Debug)]
pub struct PlainManager(pub RemoteKernelManager);

#[async_trait]
impl KernelManager for PlainManager {
    async fn create_session(&self, spec: &KernelSpec, params: &LaunchParams) -> Result<KernelHandle> {
        self.0.create_session(spec, params).await
    }

    async fn reattach(&self, handle: &KernelHandle) -> Result<()> {
        self.0.reattach(handle).await
    }

    async fn shutdown_session(&self, kernel_id: &str) -> Result<KernelHandle> {
        self.0.shutdown_session(kernel_id).await
    }

    fn get(&self, kernel_id: &str) -> Option<KernelHandle> {
        self.0.get(kernel_id)
    }

    fn list(&self) -> Vec<KernelHandle> {
        self.0.list()
    }
}

/// Wires a [`FakeLauncher`] and a shared in-memory store into the gateway.
#[derive(Clone, Default)]
pub struct FakeManagers {
    pub launcher: Arc<FakeLauncher>,
    pub store: Arc<MemorySessionStore>,
    pub without_culling: bool,
}

impl ManagerFactory for FakeManagers {
    fn kernel_manager(
        &self,
        config: &GatewayConfig,
        _specs: &Arc<dyn KernelSpecCatalog>,
    ) -> Result<Arc<dyn KernelManager>> {
        let manager = RemoteKernelManager::new(config, self.launcher.clone(), GATEWAY_USER.to_string());
        if self.without_culling {
            Ok(Arc::new(PlainManager(manager)))
        } else {
            Ok(Arc::new(manager))
        }
    }

    fn session_store(&self, _config: &GatewayConfig) -> Result<Arc<dyn SessionStore>> {
        Ok(self.store.clone())
    }
}

/// Loopback config on an ephemeral port.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.ip = "127.0.0.1".to_string();
    config.port = 0;
    config.shutdown_grace_secs = 1;
    config.recovery_timeout_secs = 1;
    config.unauthorized_users = BTreeSet::from(["root".to_string()]);
    config
}

pub fn session_record(session_id: &str, kernel_id: &str, host: &str) -> KernelSessionRecord {
    KernelSessionRecord {
        session_id: session_id.to_string(),
        kernel: KernelHandle {
            kernel_id: kernel_id.to_string(),
            kernel_name: "python3".to_string(),
            username: "alice".to_string(),
            host: host.to_string(),
            ports: vec![40001, 40002, 40003, 40004, 40005],
        },
        launch_params: LaunchParams::for_user("alice"),
    }
}

/// Serve in the background and wait until the gateway is `Serving`.
pub async fn start(gateway: Gateway) -> (SocketAddr, JoinHandle<Result<()>>) {
    let handle = gateway.server_handle();
    let state = gateway.state();
    let task = tokio::spawn(gateway.serve());
    let addr = tokio::time::timeout(Duration::from_secs(5), handle.listening())
        .await
        .expect("listener timed out")
        .expect("listener failed to bind");
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.current() != LifecycleState::Serving {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("gateway never reached Serving");
    (addr, task)
}

//! The initialized gateway: serving and the final shutdown path.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::http::{self, ListenerControl, ServerHandle};
use crate::lifecycle::culler::CullingMonitor;
use crate::lifecycle::scheduler::EventLoop;
use crate::lifecycle::shutdown::{Shutdown, ShutdownCoordinator};
use crate::lifecycle::signals;
use crate::lifecycle::startup::Managers;
use crate::lifecycle::state::{LifecycleState, StateCell};
use crate::security::authorization::{gateway_user, AuthorizationPolicy};
use crate::services::{IdleCuller, KernelSessionManager, Personality};

/// A fully initialized gateway, ready to open its listener.
pub struct Gateway {
    config: Arc<GatewayConfig>,
    state: Arc<StateCell>,
    sessions: Arc<KernelSessionManager>,
    personality: Box<dyn Personality>,
    culler: Option<Arc<dyn IdleCuller>>,
    event_loop: EventLoop,
    coordinator: Arc<ShutdownCoordinator>,
    server: ServerHandle,
    shutdown: Shutdown,
}

impl Gateway {
    pub(crate) fn new(config: Arc<GatewayConfig>, state: Arc<StateCell>, managers: Managers) -> Self {
        let event_loop = EventLoop::new();
        let server = ServerHandle::new(Duration::from_secs(config.shutdown_grace_secs));
        let coordinator = Arc::new(ShutdownCoordinator::new(
            state.clone(),
            Arc::new(event_loop.handle()),
            Arc::new(server.clone()),
        ));

        Self {
            config,
            state,
            sessions: managers.sessions,
            personality: managers.personality,
            culler: managers.culler,
            event_loop,
            coordinator,
            server,
            shutdown: Shutdown::new(),
        }
    }

    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        self.coordinator.clone()
    }

    pub fn server_handle(&self) -> ServerHandle {
        self.server.clone()
    }

    pub fn state(&self) -> Arc<StateCell> {
        self.state.clone()
    }

    pub fn sessions(&self) -> Arc<KernelSessionManager> {
        self.sessions.clone()
    }

    /// Open the listener, enter `Serving` and run the event loop until a
    /// stop is requested. Returns once the gateway is `Stopped`.
    pub async fn serve(mut self) -> Result<()> {
        let router = http::build_router(&self.config, self.personality.routes());
        let mut server_task = {
            let config = self.config.clone();
            let handle = self.server.clone();
            tokio::spawn(async move { http::serve(&config, router, handle).await })
        };

        let bound = tokio::select! {
            addr = self.server.listening() => Ok(addr),
            joined = &mut server_task => Err(listener_error(joined)),
        };
        let addr = match bound {
            Ok(Some(addr)) => addr,
            Ok(None) => return self.abort(listener_error(server_task.await)).await,
            Err(e) => return self.abort(e).await,
        };

        if !self
            .state
            .transition(LifecycleState::Initializing, LifecycleState::Serving)
        {
            self.server.stop_accepting();
            let err = GatewayError::State(format!("cannot serve from {}", self.state.current()));
            return self.abort(err).await;
        }

        tracing::info!(
            url = %format!("{}://{}:{}", self.config.scheme(), self.config.ip, addr.port()),
            api = %self.config.api,
            "Gateway listening"
        );

        let user = gateway_user();
        if AuthorizationPolicy::from_config(&self.config)
            .warn_if_unsafe_impersonation(self.config.impersonation_enabled, &user)
        {
            tracing::warn!(
                gateway_user = %user,
                "Impersonation is enabled and the gateway user is not in unauthorized_users; \
                 kernels may run as that user with elevated privileges"
            );
        }

        let signal_task = match signals::install(self.coordinator.clone()) {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                None
            }
        };

        let culling_task = self.spawn_culler();

        self.event_loop.run().await;

        tracing::info!("Shutting down gateway");
        self.personality.shutdown();
        self.sessions.shutdown_all().await;
        self.shutdown.trigger();
        if let Some(task) = signal_task {
            task.abort();
        }
        if let Some(task) = culling_task {
            let _ = task.await;
        }
        match server_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Listener exited with error"),
            Err(e) => tracing::warn!(error = %e, "Listener task failed"),
        }

        self.state.finish();
        tracing::info!("Gateway stopped");
        Ok(())
    }

    fn spawn_culler(&self) -> Option<JoinHandle<()>> {
        let idle_timeout = self.config.cull_idle_timeout()?;
        let culler = self.culler.clone()?;
        let monitor = CullingMonitor::new(
            culler,
            self.sessions.clone(),
            idle_timeout,
            Duration::from_secs(self.config.cull_interval_secs),
        );
        Some(tokio::spawn(monitor.run(self.shutdown.subscribe())))
    }

    /// The listener never came up. Release kernels this run launched; recovered
    /// sessions stay persisted.
    async fn abort(self, err: GatewayError) -> Result<()> {
        tracing::error!(error = %err, "Gateway failed to start serving");
        self.personality.shutdown();
        self.sessions.shutdown_started().await;
        self.shutdown.trigger();
        self.state.finish();
        Err(err)
    }
}

fn listener_error(joined: std::result::Result<std::io::Result<()>, JoinError>) -> GatewayError {
    match joined {
        Ok(Err(e)) => GatewayError::Io(e),
        Ok(Ok(())) => GatewayError::State("listener exited before accepting connections".to_string()),
        Err(e) => GatewayError::State(format!("listener task failed: {}", e)),
    }
}

//! Startup orchestration.
//!
//! # Responsibilities
//! - Construct managers in dependency order
//! - Validate static limits before anything is exposed
//! - Reattach persisted sessions before traffic is accepted
//! - Create and initialise the personality, then prespawn kernels
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and leaves the state `Stopped`
//! - Subsystems initialize in order, not concurrently
//! - On failure, kernels launched by this run are torn down best-effort;
//!   reattached sessions keep their records for the next start
//! - Listeners start last (see [`Gateway::serve`])

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::lifecycle::gateway::Gateway;
use crate::lifecycle::state::{LifecycleState, StateCell};
use crate::security::authorization::gateway_user;
use crate::security::limits;
use crate::services::{
    create_personality, FileSessionStore, IdleCuller, KernelManager, KernelSessionManager, KernelSpecCatalog,
    LaunchParams, MemorySessionStore, Personality, PersonalityContext, ProcessLauncher, RemoteKernelManager,
    SessionStore, StaticSpecCatalog,
};

/// Builds the managers the orchestrator wires together.
///
/// The default produces the built-in implementations; tests and embedders
/// substitute their own.
pub trait ManagerFactory: Send + Sync {
    fn spec_catalog(&self, config: &GatewayConfig) -> Result<Arc<dyn KernelSpecCatalog>> {
        Ok(Arc::new(StaticSpecCatalog::new(config.kernel_specs.clone())?))
    }

    fn kernel_manager(
        &self,
        config: &GatewayConfig,
        specs: &Arc<dyn KernelSpecCatalog>,
    ) -> Result<Arc<dyn KernelManager>>;

    fn session_store(&self, config: &GatewayConfig) -> Result<Arc<dyn SessionStore>> {
        if config.session_persistence {
            Ok(Arc::new(FileSessionStore::open(&config.persistence_root)?))
        } else {
            Ok(Arc::new(MemorySessionStore::new()))
        }
    }
}

/// Local processes via [`ProcessLauncher`], managed by [`RemoteKernelManager`].
#[derive(Debug, Default)]
pub struct DefaultManagers;

impl ManagerFactory for DefaultManagers {
    fn kernel_manager(
        &self,
        config: &GatewayConfig,
        specs: &Arc<dyn KernelSpecCatalog>,
    ) -> Result<Arc<dyn KernelManager>> {
        tracing::debug!(kernel_specs = specs.all().len(), "Building kernel manager");
        Ok(Arc::new(RemoteKernelManager::new(
            config,
            Arc::new(ProcessLauncher::new()),
            gateway_user(),
        )))
    }
}

/// Everything built during initialization.
pub(crate) struct Managers {
    pub sessions: Arc<KernelSessionManager>,
    pub personality: Box<dyn Personality>,
    pub culler: Option<Arc<dyn IdleCuller>>,
}

/// Drives `Uninitialized → Initializing` and hands back a ready [`Gateway`].
pub struct LifecycleOrchestrator {
    config: Arc<GatewayConfig>,
    factory: Box<dyn ManagerFactory>,
    state: Arc<StateCell>,
}

impl LifecycleOrchestrator {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_factory(config, DefaultManagers)
    }

    pub fn with_factory(config: GatewayConfig, factory: impl ManagerFactory + 'static) -> Self {
        Self {
            config: Arc::new(config),
            factory: Box::new(factory),
            state: Arc::new(StateCell::new()),
        }
    }

    pub fn state(&self) -> Arc<StateCell> {
        self.state.clone()
    }

    /// Run the initialization sequence. On error every kernel this run
    /// launched has been shut down and the state is `Stopped`.
    pub async fn initialize(self) -> Result<Gateway> {
        if !self
            .state
            .transition(LifecycleState::Uninitialized, LifecycleState::Initializing)
        {
            return Err(GatewayError::State(format!(
                "cannot initialize from {}",
                self.state.current()
            )));
        }
        tracing::info!(api = %self.config.api, "Gateway initializing");

        let mut built: Option<Arc<KernelSessionManager>> = None;
        match self.build(&mut built).await {
            Ok(managers) => Ok(Gateway::new(self.config, self.state, managers)),
            Err(e) => {
                tracing::error!(error = %e, "Gateway initialization failed");
                if let Some(sessions) = built {
                    sessions.shutdown_started().await;
                }
                self.state.finish();
                Err(e)
            }
        }
    }

    async fn build(&self, built: &mut Option<Arc<KernelSessionManager>>) -> Result<Managers> {
        let config = &self.config;

        let specs = self.factory.spec_catalog(config)?;
        tracing::debug!(kernel_specs = specs.all().len(), "Kernel spec catalog ready");

        let kernels = self.factory.kernel_manager(config, &specs)?;
        let store = self.factory.session_store(config)?;
        let sessions = Arc::new(KernelSessionManager::new(
            kernels.clone(),
            store,
            config.recovery_timeout(),
        ));
        *built = Some(sessions.clone());

        let culler = kernels.idle_culler();
        if config.cull_idle_timeout().is_some() && culler.is_none() {
            let missing = GatewayError::CapabilityMissing("kernel manager does not support idle culling".to_string());
            tracing::warn!(error = %missing, "Idle culling disabled");
        }

        limits::validate_static(config)?;

        let report = sessions.start_sessions().await;
        if !report.recovered.is_empty() || !report.dropped.is_empty() {
            tracing::info!(
                recovered = report.recovered.len(),
                dropped = report.dropped.len(),
                "Persisted sessions reconciled"
            );
        }

        let context = PersonalityContext {
            config: config.clone(),
            specs: specs.clone(),
            sessions: sessions.clone(),
            culler: culler.clone(),
        };
        let span = tracing::info_span!("personality", api = %config.api);
        let mut personality = create_personality(&config.api, context, span)?;
        personality.init_configurables()?;
        tracing::info!(personality = personality.name(), "Personality initialized");

        if let Some(count) = config.prespawn_count.filter(|n| *n > 0) {
            let spec = specs.get(&config.default_kernel_name)?;
            for _ in 0..count {
                sessions.start_kernel(&spec, LaunchParams::default()).await?;
            }
            tracing::info!(count, kernel_name = %spec.name, "Prespawned kernels");
        }

        Ok(Managers {
            sessions,
            personality,
            culler,
        })
    }
}

//! Personalities: pluggable client-facing API surfaces.
//!
//! A personality is selected by the configured `api` name, created after the
//! session registry exists, and initialised last. Its routes are merged into
//! the gateway router before the listener opens.

use std::fmt::Debug;
use std::sync::Arc;

use axum::Router;
use tracing::Span;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::http::handlers::{kernel_routes, KernelApiState};
use crate::services::kernels::IdleCuller;
use crate::services::kernelspecs::KernelSpecCatalog;
use crate::services::sessions::KernelSessionManager;

/// Shared managers handed to a personality at creation.
#[derive(Clone, Debug)]
pub struct PersonalityContext {
    pub config: Arc<GatewayConfig>,
    pub specs: Arc<dyn KernelSpecCatalog>,
    pub sessions: Arc<KernelSessionManager>,
    pub culler: Option<Arc<dyn IdleCuller>>,
}

pub trait Personality: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Final initialisation hook; may register routes.
    fn init_configurables(&mut self) -> Result<()>;

    fn routes(&self) -> Router;

    fn shutdown(&self) {}
}

pub const JUPYTER_WEBSOCKET: &str = "jupyter-websocket";

/// Personality registry.
pub fn create_personality(api: &str, parent: PersonalityContext, span: Span) -> Result<Box<dyn Personality>> {
    match api {
        JUPYTER_WEBSOCKET => Ok(Box::new(JupyterWebsocketPersonality::new(parent, span))),
        other => Err(GatewayError::config(format!(
            "unknown api '{}'; available: {}",
            other, JUPYTER_WEBSOCKET
        ))),
    }
}

/// Kernel management REST surface.
#[derive(Debug)]
pub struct JupyterWebsocketPersonality {
    parent: PersonalityContext,
    span: Span,
    router: Option<Router>,
}

impl JupyterWebsocketPersonality {
    pub fn new(parent: PersonalityContext, span: Span) -> Self {
        Self {
            parent,
            span,
            router: None,
        }
    }
}

impl Personality for JupyterWebsocketPersonality {
    fn name(&self) -> &'static str {
        JUPYTER_WEBSOCKET
    }

    fn init_configurables(&mut self) -> Result<()> {
        let _entered = self.span.clone().entered();
        let default_kernel = &self.parent.config.default_kernel_name;
        if self.parent.specs.get(default_kernel).is_err() {
            return Err(GatewayError::config(format!(
                "default kernel '{}' is not a known kernel spec",
                default_kernel
            )));
        }

        let state = KernelApiState {
            specs: self.parent.specs.clone(),
            sessions: self.parent.sessions.clone(),
            culler: self.parent.culler.clone(),
            default_kernel_name: default_kernel.clone(),
        };
        self.router = Some(kernel_routes(state));
        tracing::debug!(personality = JUPYTER_WEBSOCKET, "Kernel routes registered");
        Ok(())
    }

    fn routes(&self) -> Router {
        self.router.clone().unwrap_or_default()
    }

    fn shutdown(&self) {
        tracing::debug!(personality = JUPYTER_WEBSOCKET, "Personality shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::kernels::RemoteKernelManager;
    use crate::services::kernelspecs::StaticSpecCatalog;
    use crate::services::launcher::ProcessLauncher;
    use crate::services::sessions::MemorySessionStore;
    use std::time::Duration;

    fn context(config: GatewayConfig) -> PersonalityContext {
        let specs = Arc::new(StaticSpecCatalog::new(config.kernel_specs.clone()).unwrap());
        let kernels = Arc::new(RemoteKernelManager::new(
            &config,
            Arc::new(ProcessLauncher::new()),
            "gateway".to_string(),
        ));
        let sessions = Arc::new(KernelSessionManager::new(
            kernels,
            Arc::new(MemorySessionStore::new()),
            Duration::from_secs(1),
        ));
        PersonalityContext {
            config: Arc::new(config),
            specs,
            sessions,
            culler: None,
        }
    }

    #[test]
    fn test_unknown_api_is_configuration_error() {
        let err = create_personality("batch", context(GatewayConfig::default()), Span::none());
        assert!(matches!(err, Err(GatewayError::Configuration(_))));
    }

    #[test]
    fn test_init_requires_known_default_kernel() {
        let mut config = GatewayConfig::default();
        config.default_kernel_name = "julia".to_string();
        let mut personality = create_personality(JUPYTER_WEBSOCKET, context(config), Span::none()).unwrap();
        assert!(personality.init_configurables().is_err());

        let mut personality =
            create_personality(JUPYTER_WEBSOCKET, context(GatewayConfig::default()), Span::none()).unwrap();
        assert!(personality.init_configurables().is_ok());
        assert_eq!(personality.name(), JUPYTER_WEBSOCKET);
    }
}

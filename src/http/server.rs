//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router (base `/api` route + personality routes)
//! - Wire up request tracing
//! - Bind the listener, plain or TLS
//! - Expose a handle to learn when the listener is ready and to stop it

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{extract::State, routing::get, Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;

/// Settings reported to clients on `GET /api`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSettings {
    /// Remote kernels are the whole point of the gateway.
    pub allow_remote_access: bool,
    /// 0 disables keep-alive pings.
    pub ws_ping_interval_ms: u64,
}

impl ServerSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            allow_remote_access: true,
            ws_ping_interval_ms: config
                .ws_ping_interval()
                .map_or(0, |interval| u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

/// Something that can stop accepting new connections.
pub trait ListenerControl: Send + Sync {
    fn stop_accepting(&self);
}

/// Handle on the running listener.
#[derive(Clone)]
pub struct ServerHandle {
    inner: axum_server::Handle,
    grace: Duration,
}

impl ServerHandle {
    pub fn new(grace: Duration) -> Self {
        Self {
            inner: axum_server::Handle::new(),
            grace,
        }
    }

    /// Resolves once the listener is bound. `None` if binding failed.
    pub async fn listening(&self) -> Option<SocketAddr> {
        self.inner.listening().await
    }
}

impl ListenerControl for ServerHandle {
    fn stop_accepting(&self) {
        tracing::info!(grace = ?self.grace, "Listener stopping");
        self.inner.graceful_shutdown(Some(self.grace));
    }
}

/// Build the gateway router around the personality's routes.
pub fn build_router(config: &GatewayConfig, personality_routes: Router) -> Router {
    Router::new()
        .route("/api", get(api_info))
        .with_state(ServerSettings::from_config(config))
        .merge(personality_routes)
        .layer(TraceLayer::new_for_http())
}

async fn api_info(State(settings): State<ServerSettings>) -> Json<Value> {
    Json(json!({
        "gateway": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "settings": settings,
    }))
}

/// Bind and serve until the handle is shut down.
pub async fn serve(config: &GatewayConfig, router: Router, handle: ServerHandle) -> io::Result<()> {
    let addr = tokio::net::lookup_host((config.ip.as_str(), config.port))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, format!("cannot resolve {}", config.ip)))?;

    let app = router.into_make_service();
    match (&config.certfile, &config.keyfile) {
        (Some(cert), Some(key)) => {
            let tls = RustlsConfig::from_pem_file(cert, key).await?;
            axum_server::bind_rustls(addr, tls).handle(handle.inner).serve(app).await
        }
        _ => axum_server::bind(addr).handle(handle.inner).serve(app).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = GatewayConfig::default();
        config.ws_ping_interval_secs = 0;
        let settings = ServerSettings::from_config(&config);
        assert!(settings.allow_remote_access);
        assert_eq!(settings.ws_ping_interval_ms, 0);
        assert_eq!(ServerSettings::from_config(&GatewayConfig::default()).ws_ping_interval_ms, 30_000);
    }

    #[tokio::test]
    async fn test_serve_and_stop() {
        let mut config = GatewayConfig::default();
        config.port = 0;
        let handle = ServerHandle::new(Duration::from_millis(100));
        let router = build_router(&config, Router::new());

        let server = {
            let handle = handle.clone();
            tokio::spawn(async move { serve(&config, router, handle).await })
        };

        let addr = handle.listening().await.expect("listener bound");
        let body: Value = reqwest::get(format!("http://{}/api", addr)).await.unwrap().json().await.unwrap();
        assert_eq!(body["settings"]["allow_remote_access"], true);

        handle.stop_accepting();
        server.await.unwrap().unwrap();
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use kernel_gateway::config::{load_config, Environment, Overrides};
use kernel_gateway::observability::{logging, metrics};
use kernel_gateway::{LifecycleOrchestrator, Result};

#[derive(Parser)]
#[command(name = "kernel-gateway")]
#[command(about = "Gateway that launches and manages remote kernels", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    ip: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Personality to serve
    #[arg(long)]
    api: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override any setting, e.g. `--set max_kernels_per_user=2`
    #[arg(short, long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,
}

impl Cli {
    fn overrides(&self) -> Result<Overrides> {
        let mut overrides = Overrides::default();
        for assignment in &self.set {
            overrides.insert_assignment(assignment)?;
        }
        if let Some(ip) = &self.ip {
            overrides.insert("ip", toml::Value::String(ip.clone()))?;
        }
        if let Some(port) = self.port {
            overrides.insert("port", toml::Value::Integer(i64::from(port)))?;
        }
        if let Some(api) = &self.api {
            overrides.insert("api", toml::Value::String(api.clone()))?;
        }
        Ok(overrides)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Gateway exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "kernel-gateway starting");

    let config = load_config(cli.config.as_deref(), cli.overrides()?, Environment::capture())?;
    tracing::info!(
        ip = %config.ip,
        port = config.port,
        api = %config.api,
        max_kernels_per_user = config.max_kernels_per_user,
        port_range = %config.port_range,
        "Configuration loaded"
    );

    let metrics_address = config.metrics_address.clone();
    let gateway = LifecycleOrchestrator::new(config).initialize().await?;

    // Listeners open only after initialization succeeded.
    if let Some(address) = metrics_address {
        match address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(metrics_address = %address, "Failed to parse metrics address"),
        }
    }

    gateway.serve().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_gateway::GatewayError;

    #[tokio::test]
    async fn test_invalid_limits_open_no_metrics_listener() {
        let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let metrics_addr = free.local_addr().unwrap();
        drop(free);

        let metrics_arg = format!("metrics_address={}", metrics_addr);
        let cli = Cli::parse_from([
            "kernel-gateway",
            "--port",
            "0",
            "--set",
            "prespawn_count=5",
            "--set",
            "max_kernels=3",
            "--set",
            metrics_arg.as_str(),
        ]);

        let err = run(cli).await.err().expect("startup should fail");
        assert!(matches!(err, GatewayError::Configuration(_)), "got {:?}", err);
        assert!(std::net::TcpListener::bind(metrics_addr).is_ok());
    }
}

//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::config::resolver::{ConfigResolver, Environment, Overrides};
use crate::config::schema::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::services::kernelspecs::KernelSpec;

/// On-disk configuration file.
///
/// ```toml
/// [gateway]
/// port = 9000
/// unauthorized_users = ["root", "admin"]
///
/// [[kernelspecs]]
/// name = "python3"
/// argv = ["python3", "-m", "ipykernel_launcher"]
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Explicit overrides keyed by setting name.
    pub gateway: toml::Table,
    pub kernelspecs: Vec<KernelSpec>,
}

impl ConfigFile {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| GatewayError::config(format!("parse error: {}", e)))
    }
}

/// Load a TOML configuration file.
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = fs::read_to_string(path)
        .map_err(|e| GatewayError::config(format!("cannot read {}: {}", path.display(), e)))?;
    ConfigFile::parse(&content)
}

/// Resolve the full configuration.
///
/// Command-line overrides beat the file's `[gateway]` table; both beat the
/// environment, which beats built-in defaults.
pub fn load_config(path: Option<&Path>, cli: Overrides, env: Environment) -> Result<GatewayConfig> {
    let file = match path {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };
    let overrides = Overrides::from_table(file.gateway)?.merge(cli);
    let resolver = ConfigResolver::new(overrides, env);
    GatewayConfig::resolve(&resolver, file.kernelspecs)
}

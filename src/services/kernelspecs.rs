//! Kernel specification catalog.
//!
//! Specs are declared in the configuration file; discovery of installed
//! kernel types is left to whatever produces that file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// How to launch one kind of kernel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KernelSpec {
    pub name: String,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub language: String,

    /// Launch command. `{kernel_id}`, `{host}`, `{ports}` and `{username}`
    /// are substituted at launch time.
    pub argv: Vec<String>,

    /// Extra environment passed to the kernel process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl KernelSpec {
    /// Spec used when the configuration declares none.
    pub fn builtin_python() -> Self {
        Self {
            name: "python3".to_string(),
            display_name: "Python 3".to_string(),
            language: "python".to_string(),
            argv: ["python3", "-m", "ipykernel_launcher", "--ip", "{host}", "--shell={ports}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            env: BTreeMap::new(),
        }
    }
}

/// Lookup of kernel specs by name.
pub trait KernelSpecCatalog: Send + Sync + std::fmt::Debug {
    fn get(&self, name: &str) -> Result<KernelSpec>;
    fn all(&self) -> Vec<KernelSpec>;
}

/// Catalog backed by the configured list.
#[derive(Debug, Clone)]
pub struct StaticSpecCatalog {
    specs: BTreeMap<String, KernelSpec>,
}

impl StaticSpecCatalog {
    pub fn new(specs: Vec<KernelSpec>) -> Result<Self> {
        let mut by_name = BTreeMap::new();
        for spec in specs {
            if spec.argv.is_empty() {
                return Err(GatewayError::config(format!("kernel spec '{}' has an empty argv", spec.name)));
            }
            if by_name.insert(spec.name.clone(), spec).is_some() {
                return Err(GatewayError::config("duplicate kernel spec name"));
            }
        }
        Ok(Self { specs: by_name })
    }
}

impl KernelSpecCatalog for StaticSpecCatalog {
    fn get(&self, name: &str) -> Result<KernelSpec> {
        self.specs
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("no such kernel spec: {}", name)))
    }

    fn all(&self) -> Vec<KernelSpec> {
        self.specs.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let catalog = StaticSpecCatalog::new(vec![KernelSpec::builtin_python()]).unwrap();
        assert_eq!(catalog.get("python3").unwrap().language, "python");
        assert!(matches!(catalog.get("r"), Err(GatewayError::NotFound(_))));
        assert_eq!(catalog.all().len(), 1);
    }

    #[test]
    fn test_rejects_duplicates_and_empty_argv() {
        let spec = KernelSpec::builtin_python();
        assert!(StaticSpecCatalog::new(vec![spec.clone(), spec.clone()]).is_err());

        let mut empty = spec;
        empty.argv.clear();
        assert!(StaticSpecCatalog::new(vec![empty]).is_err());
    }
}

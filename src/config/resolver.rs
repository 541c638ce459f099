//! Three-source setting resolution.
//!
//! # Precedence
//! ```text
//! explicit override (CLI --set / [gateway] table)
//!     → environment variable (set and non-empty)
//!     → built-in default
//! ```
//!
//! The environment is snapshotted once; resolution never reads or mutates
//! the process environment afterwards.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::settings::{self, SettingKind, TunableSetting};
use crate::error::{GatewayError, Result};

/// A resolved setting value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunableValue {
    Unset,
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
    Set(BTreeSet<String>),
}

/// Explicit overrides keyed by setting name.
#[derive(Debug, Clone, Default)]
pub struct Overrides(BTreeMap<String, toml::Value>);

impl Overrides {
    /// Build overrides from a `[gateway]` table. Unknown keys are rejected.
    pub fn from_table(table: toml::Table) -> Result<Self> {
        let mut overrides = Self::default();
        for (name, value) in table {
            overrides.insert(&name, value)?;
        }
        Ok(overrides)
    }

    pub fn insert(&mut self, name: &str, value: toml::Value) -> Result<()> {
        if settings::lookup(name).is_none() {
            return Err(GatewayError::config(format!("unknown setting '{}'", name)));
        }
        self.0.insert(name.to_string(), value);
        Ok(())
    }

    /// Parse a `name=value` assignment from the command line.
    pub fn insert_assignment(&mut self, assignment: &str) -> Result<()> {
        let (name, value) = assignment.split_once('=').ok_or_else(|| {
            GatewayError::config(format!("expected name=value, got '{}'", assignment))
        })?;
        self.insert(name.trim(), toml::Value::String(value.to_string()))
    }

    /// Layer `other` on top of `self`; `other` wins on conflicts.
    pub fn merge(mut self, other: Overrides) -> Self {
        self.0.extend(other.0);
        self
    }

    fn get(&self, name: &str) -> Option<&toml::Value> {
        self.0.get(name)
    }
}

/// Snapshot of environment variables.
#[derive(Debug, Clone, Default)]
pub struct Environment(BTreeMap<String, String>);

impl Environment {
    /// Capture the current process environment. Non-unicode entries are skipped.
    pub fn capture() -> Self {
        Self(
            std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        )
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Resolves tunables against overrides, environment and defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    overrides: Overrides,
    env: Environment,
}

impl ConfigResolver {
    pub fn new(overrides: Overrides, env: Environment) -> Self {
        Self { overrides, env }
    }

    pub fn resolve(&self, setting: &TunableSetting) -> Result<TunableValue> {
        if let Some(value) = self.overrides.get(setting.name) {
            return from_override(setting, value);
        }
        if let Some(raw) = self.env.get(setting.env).filter(|v| !v.is_empty()) {
            return parse_text(setting, raw);
        }
        match setting.default {
            Some(raw) => parse_text(setting, raw),
            None => Ok(TunableValue::Unset),
        }
    }

    /// Resolve a setting by name.
    pub fn resolve_named(&self, name: &str) -> Result<TunableValue> {
        let setting =
            settings::lookup(name).ok_or_else(|| GatewayError::config(format!("unknown setting '{}'", name)))?;
        self.resolve(setting)
    }

    pub fn string(&self, setting: &TunableSetting) -> Result<Option<String>> {
        match self.resolve(setting)? {
            TunableValue::Str(s) => Ok(Some(s)),
            TunableValue::Unset => Ok(None),
            other => Err(mismatch(setting, &other)),
        }
    }

    pub fn int(&self, setting: &TunableSetting) -> Result<Option<i64>> {
        match self.resolve(setting)? {
            TunableValue::Int(i) => Ok(Some(i)),
            TunableValue::Unset => Ok(None),
            other => Err(mismatch(setting, &other)),
        }
    }

    pub fn boolean(&self, setting: &TunableSetting) -> Result<bool> {
        match self.resolve(setting)? {
            TunableValue::Bool(b) => Ok(b),
            TunableValue::Unset => Ok(false),
            other => Err(mismatch(setting, &other)),
        }
    }

    pub fn list(&self, setting: &TunableSetting) -> Result<Vec<String>> {
        match self.resolve(setting)? {
            TunableValue::List(items) => Ok(items),
            TunableValue::Unset => Ok(Vec::new()),
            other => Err(mismatch(setting, &other)),
        }
    }

    pub fn set(&self, setting: &TunableSetting) -> Result<BTreeSet<String>> {
        match self.resolve(setting)? {
            TunableValue::Set(items) => Ok(items),
            TunableValue::Unset => Ok(BTreeSet::new()),
            other => Err(mismatch(setting, &other)),
        }
    }
}

fn mismatch(setting: &TunableSetting, value: &TunableValue) -> GatewayError {
    GatewayError::config(format!(
        "setting '{}' expects a {}, resolved {:?}",
        setting.name, setting.kind, value
    ))
}

fn split_items(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
}

/// Parse the textual form used by environment variables and defaults.
pub(crate) fn parse_text(setting: &TunableSetting, raw: &str) -> Result<TunableValue> {
    let value = match setting.kind {
        SettingKind::Str => TunableValue::Str(raw.to_string()),
        SettingKind::Int => TunableValue::Int(raw.trim().parse().map_err(|_| {
            GatewayError::config(format!("setting '{}': '{}' is not an integer", setting.name, raw))
        })?),
        SettingKind::Bool => TunableValue::Bool(raw.trim().eq_ignore_ascii_case("true")),
        SettingKind::List => TunableValue::List(split_items(raw).collect()),
        SettingKind::Set => TunableValue::Set(split_items(raw).collect()),
    };
    Ok(value)
}

fn from_override(setting: &TunableSetting, value: &toml::Value) -> Result<TunableValue> {
    match (setting.kind, value) {
        (_, toml::Value::String(raw)) => parse_text(setting, raw),
        (SettingKind::Int, toml::Value::Integer(i)) => Ok(TunableValue::Int(*i)),
        (SettingKind::Str, toml::Value::Integer(i)) => Ok(TunableValue::Str(i.to_string())),
        (SettingKind::Bool, toml::Value::Boolean(b)) => Ok(TunableValue::Bool(*b)),
        (SettingKind::List, toml::Value::Array(items)) => {
            Ok(TunableValue::List(items.iter().map(array_item).collect()))
        }
        (SettingKind::Set, toml::Value::Array(items)) => {
            Ok(TunableValue::Set(items.iter().map(array_item).collect()))
        }
        (kind, other) => Err(GatewayError::config(format!(
            "setting '{}' expects a {}, got '{}'",
            setting.name, kind, other
        ))),
    }
}

fn array_item(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

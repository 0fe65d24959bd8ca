//! Configuration sources and the ordered chain that consults them
//!
//! Keys are dotted paths (`ssh.user`). Each provider answers for the keys it
//! knows; the chain asks them in order and takes the first non-empty answer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{CoreError, Result};

/// Environment prefix for configuration keys
pub const ENV_PREFIX: &str = "GPUOPS";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "GPUOPS_CONFIG";

/// A source of configuration values
pub trait ConfigProvider: Send + Sync {
    /// Human-readable name used in diagnostics
    fn name(&self) -> &str;

    /// Value for a dotted key, if this source defines it
    fn get(&self, key: &str) -> Option<String>;
}

/// Fixed key/value pairs, used for command-line overrides
#[derive(Debug, Clone, Default)]
pub struct MapProvider {
    name: String,
    values: HashMap<String, String>,
}

impl MapProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
        }
    }

    /// Set a key
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Set a key when a value is present
    pub fn set_opt(&mut self, key: &str, value: Option<impl ToString>) {
        if let Some(v) = value {
            self.values.insert(key.to_string(), v.to_string());
        }
    }
}

impl ConfigProvider for MapProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Process environment, `ssh.max_parallel` → `GPUOPS_SSH_MAX_PARALLEL`
#[derive(Debug, Clone)]
pub struct EnvProvider {
    prefix: String,
    name: String,
}

impl EnvProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            name: format!("env {prefix}_*"),
            prefix,
        }
    }

    /// Variable name for a dotted key
    #[must_use]
    pub fn var_name(&self, key: &str) -> String {
        format!("{}_{}", self.prefix, key.replace('.', "_")).to_ascii_uppercase()
    }
}

impl ConfigProvider for EnvProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<String> {
        std::env::var(self.var_name(key)).ok()
    }
}

/// A TOML or YAML file flattened into dotted keys
#[derive(Debug, Clone)]
pub struct FileProvider {
    name: String,
    values: HashMap<String, String>,
}

impl FileProvider {
    /// Load a file, returning `None` if it does not exist
    ///
    /// The format follows the extension: `.yaml`/`.yml` is YAML, anything
    /// else is TOML.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidConfig` if the file exists but cannot be
    /// read or parsed.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            trace!(path = %path.display(), "config file absent");
            return Ok(None);
        }

        let invalid = |message: String| CoreError::InvalidConfig {
            key: path.display().to_string(),
            message,
        };

        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let provider = Self::parse(&path.display().to_string(), &content, is_yaml(path))
            .map_err(invalid)?;

        debug!(path = %path.display(), keys = provider.values.len(), "loaded config file");
        Ok(Some(provider))
    }

    /// Parse file content directly
    ///
    /// # Errors
    /// Returns the parser's message if the content is malformed.
    pub fn parse(
        name: &str,
        content: &str,
        yaml: bool,
    ) -> std::result::Result<Self, String> {
        let tree: Value = if yaml {
            serde_yaml::from_str(content).map_err(|e| e.to_string())?
        } else {
            let table: toml::Table = toml::from_str(content).map_err(|e| e.to_string())?;
            toml_to_json(toml::Value::Table(table))
        };

        let mut values = HashMap::new();
        flatten("", &tree, &mut values);

        Ok(Self {
            name: name.to_string(),
            values,
        })
    }
}

impl ConfigProvider for FileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    )
}

/// TOML tree as JSON, with datetimes kept as their TOML text
///
/// Deserializing TOML straight into `serde_json::Value` would turn a datetime
/// into a private single-key table.
fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut HashMap<String, String>) {
    let scalar = match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(&key, v, out);
            }
            return;
        }
        Value::Null => return,
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    };
    out.insert(prefix.to_string(), scalar);
}

/// Ordered list of providers; the first non-empty value wins
#[derive(Default)]
pub struct ProviderChain {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.name()))
            .finish()
    }
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider with lower priority than those already present
    #[must_use]
    pub fn with(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Append a provider in place
    pub fn push(&mut self, provider: Box<dyn ConfigProvider>) {
        self.providers.push(provider);
    }

    /// The standard lookup order
    ///
    /// Overrides, then `GPUOPS_*` variables, then the explicit file (argument
    /// or `GPUOPS_CONFIG`), `./gpuops.toml`, the user config directory and
    /// finally `/etc/gpuops/gpuops.yaml`. Missing files are skipped.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidConfig` if an explicitly named file is
    /// missing, or any present file cannot be parsed.
    pub fn standard(overrides: MapProvider, explicit: Option<&Path>) -> Result<Self> {
        let mut chain = Self::new()
            .with(overrides)
            .with(EnvProvider::new(ENV_PREFIX));

        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

        if let Some(path) = explicit {
            let provider = FileProvider::load(&path)?.ok_or_else(|| CoreError::InvalidConfig {
                key: path.display().to_string(),
                message: "file not found".to_string(),
            })?;
            chain.push(Box::new(provider));
        }

        let mut defaults = vec![PathBuf::from("gpuops.toml")];
        if let Some(dir) = dirs::config_dir() {
            defaults.push(dir.join("gpuops/gpuops.toml"));
        }
        defaults.push(PathBuf::from("/etc/gpuops/gpuops.yaml"));

        for path in defaults {
            if let Some(provider) = FileProvider::load(&path)? {
                chain.push(Box::new(provider));
            }
        }

        debug!(sources = ?chain, "configuration chain assembled");
        Ok(chain)
    }

    /// First non-empty value for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.providers.iter().find_map(|p| {
            let value = p.get(key).filter(|v| !v.trim().is_empty())?;
            trace!(key = key, source = p.name(), "config value resolved");
            Some(value)
        })
    }

    /// Value for `key`, or the built-in default
    #[must_use]
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Value for `key`, which every source lacking is fatal
    ///
    /// # Errors
    /// Returns `CoreError::MissingConfig` naming every source consulted.
    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key).ok_or_else(|| CoreError::MissingConfig {
            key: key.to_string(),
            tried: self.source_names(),
        })
    }

    /// Parsed value for `key`, if present
    ///
    /// # Errors
    /// Returns `CoreError::InvalidConfig` if the value does not parse.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim().parse().map_err(|e: T::Err| CoreError::InvalidConfig {
                    key: key.to_string(),
                    message: format!("{raw:?}: {e}"),
                })
            })
            .transpose()
    }

    fn source_names(&self) -> String {
        if self.providers.is_empty() {
            return "no sources".to_string();
        }
        self.providers
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

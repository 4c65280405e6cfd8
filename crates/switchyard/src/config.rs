//! Configuration for backend selection and grammar discovery.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! environment variables. Environment access goes through an [`EnvLookup`]
//! so tests can supply a fixed map instead of mutating the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::security::path::default_trusted_directories;
use crate::types::BackendKind;

/// Default prefix for per-language library overrides (`TREE_SITTER_<LANG>_PATH`).
pub const DEFAULT_ENV_PREFIX: &str = "TREE_SITTER";

/// Enables verbose discovery diagnostics when truthy.
pub const DEBUG_ENV: &str = "SWITCHYARD_DEBUG";

/// Names the default backend.
pub const BACKEND_ENV: &str = "SWITCHYARD_BACKEND";

/// Extra trusted directories, separated like `PATH`.
pub const TRUSTED_DIRS_ENV: &str = "SWITCHYARD_TRUSTED_DIRS";

/// Conventional configuration file name.
pub const CONFIG_FILE_NAME: &str = "switchyard.yaml";

/// Reads one environment variable.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lookup backed by the process environment.
#[must_use]
pub fn process_env() -> EnvLookup {
    Arc::new(|name| std::env::var(name).ok())
}

/// Lookup backed by a fixed map.
#[must_use]
pub fn map_env<I, K, V>(vars: I) -> EnvLookup
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let vars: HashMap<String, String> = vars
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    Arc::new(move |name| vars.get(name).cloned())
}

/// Returns `true` for `1`, `true`, `yes` and `on`, ignoring case.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// How far an environment override path is trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvPathPolicy {
    /// Structural checks plus an allowed-character check; any directory.
    #[default]
    CharacterClass,
    /// Structural checks and the path must sit in a trusted directory.
    TrustedDirectories,
    /// Environment overrides are never consulted.
    Ignore,
}

/// Grammar library discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LocatorConfig {
    /// Prefix of the per-language override variable
    pub env_prefix: String,
    /// Caller-supplied directories searched before the trusted ones
    pub extra_dirs: Vec<PathBuf>,
    /// System directories considered safe to load from
    pub trusted_dirs: Vec<PathBuf>,
    /// Trust given to environment override paths
    pub env_policy: EnvPathPolicy,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            extra_dirs: Vec::new(),
            trusted_dirs: default_trusted_directories(),
            env_policy: EnvPathPolicy::default(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SwitchyardConfig {
    /// Backend used when nothing more specific is requested
    pub backend: Option<BackendKind>,
    /// Verbose discovery diagnostics
    pub debug: bool,
    /// Discovery settings
    pub locator: LocatorConfig,
}

impl SwitchyardConfig {
    /// Defaults overlaid with the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](crate::Error::Configuration) if
    /// `SWITCHYARD_BACKEND` is not a valid backend name.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(&process_env())?;
        Ok(config)
    }

    /// Parse YAML. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Yaml`](crate::Error::Yaml) if the document is malformed.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a YAML error if it
    /// cannot be decoded.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Serialize to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Yaml`](crate::Error::Yaml) if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Overlay environment variables read through `lookup`.
    ///
    /// `SWITCHYARD_DEBUG` sets [`debug`](Self::debug), `SWITCHYARD_BACKEND`
    /// sets [`backend`](Self::backend), and `SWITCHYARD_TRUSTED_DIRS` appends
    /// to the trusted directories.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](crate::Error::Configuration) if the
    /// backend name is invalid.
    pub fn apply_env(&mut self, lookup: &EnvLookup) -> Result<()> {
        if let Some(value) = lookup(DEBUG_ENV) {
            self.debug = is_truthy(&value);
        }
        if let Some(value) = lookup(BACKEND_ENV).filter(|v| !v.trim().is_empty()) {
            self.backend = Some(value.parse()?);
        }
        if let Some(value) = lookup(TRUSTED_DIRS_ENV) {
            self.locator.trusted_dirs.extend(
                std::env::split_paths(&value).filter(|dir| !dir.as_os_str().is_empty()),
            );
        }
        Ok(())
    }
}

//! Policy configuration.
//!
//! Loaded once at startup from a YAML file and handed to the policy by value.
//! Every failure path falls back to the secure defaults, with all checks enabled.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

/// Default location of the policy file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "configs/default.yaml";
/// Environment variable overriding [`DEFAULT_CONFIG_PATH`]
pub const CONFIG_PATH_ENV: &str = "POLICY_CONFIG_PATH";

fn enabled() -> bool {
    true
}

/// Individually toggleable checks. Omitted toggles are enabled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckItems {
    /// Reject containers whose security context sets `privileged: true`
    #[serde(default = "enabled")]
    pub forbidden_privileged_container: bool,
}

impl Default for CheckItems {
    fn default() -> Self {
        Self {
            forbidden_privileged_container: true,
        }
    }
}

/// Process-wide, read-only policy configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    #[serde(default)]
    pub check_items: CheckItems,
}

impl PolicyConfig {
    /// Parse a config from YAML text
    pub fn from_yaml(path: &str, yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty mapping
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Read and parse a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_yaml(&display, &contents)
    }

    /// Load a config file, falling back to the secure defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let config = match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Failed to load policy config, using secure defaults");
                Self::default()
            }
        };
        info!(config = ?config, "Policy config loaded");
        config
    }

    /// Load from `POLICY_CONFIG_PATH`, or the default path when unset
    pub fn from_env() -> Self {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_or_default(path)
    }
}

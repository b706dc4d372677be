use crate::error::PtxError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Environment variable naming the optional YAML config file.
pub const CONFIG_ENV: &str = "PTX_CONFIG";

/// User defaults and remote-source settings loaded from `PTX_CONFIG`.
/// Every section is optional; an absent file means all defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub defaults: Defaults,
    pub aws: AwsConfig,
    pub gcp: GcpConfig,
    pub kubernetes: KubernetesConfig,
    /// Alias name -> query string, expanded before compilation
    pub aliases: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub output: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub profile: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    pub project: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    pub namespace: Option<String>,
}

impl Config {
    /// Load from the file `PTX_CONFIG` names, or defaults when unset.
    /// A named-but-broken file is a user error, not a silent default.
    pub fn load() -> Result<Config, PtxError> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Config::load_from(Path::new(&path)),
            _ => Ok(Config::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Config, PtxError> {
        let text = std::fs::read_to_string(path).map_err(|e| PtxError::Config {
            path: path.to_string_lossy().to_string(),
            message: e.to_string(),
        })?;
        serde_yaml::from_str(&text).map_err(|e| PtxError::Config {
            path: path.to_string_lossy().to_string(),
            message: e.to_string(),
        })
    }

    /// Swap the whole query string for its alias expansion when the
    /// trimmed input names one.
    pub fn resolve_alias<'a>(&'a self, query: &'a str) -> &'a str {
        self.aliases
            .get(query.trim())
            .map(String::as_str)
            .unwrap_or(query)
    }
}

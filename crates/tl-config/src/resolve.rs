//! Config file resolution and loading.
//!
//! Precedence: explicit CLI path, then `TABLELOG_CONFIG`, then
//! `$XDG_CONFIG_HOME/tablelog/sink.{toml,json}`, then built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::validate::ConfigError;
use crate::{SinkConfig, CONFIG_ENV_VAR};

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli(PathBuf),
    Env(PathBuf),
    Xdg(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Cli(p) | ConfigSource::Env(p) | ConfigSource::Xdg(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }
}

/// A validated configuration plus its provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: SinkConfig,
    pub source: ConfigSource,
}

/// Pick the config file to load, without reading it.
pub fn resolve_config_path(explicit: Option<&Path>) -> ConfigSource {
    if let Some(path) = explicit {
        return ConfigSource::Cli(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
        return ConfigSource::Env(PathBuf::from(path));
    }
    if let Some(dir) = dirs::config_dir() {
        for name in ["sink.toml", "sink.json"] {
            let candidate = dir.join("tablelog").join(name);
            if candidate.is_file() {
                return ConfigSource::Xdg(candidate);
            }
        }
    }
    ConfigSource::Defaults
}

/// Resolve and load the effective configuration.
pub fn resolve_config(explicit: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
    let source = resolve_config_path(explicit);
    debug!(source = ?source, "resolved config source");
    let config = match source.path() {
        Some(path) => load_config(path)?,
        None => {
            let config = SinkConfig::default();
            config.validate()?;
            config
        }
    };
    Ok(ResolvedConfig { config, source })
}

/// Load and validate a config file; the format follows the extension.
pub fn load_config(path: &Path) -> Result<SinkConfig, ConfigError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: SinkConfig = match extension.as_str() {
        "toml" => toml::from_str(&content).map_err(|err| ConfigError::Parse {
            format: "toml".to_string(),
            message: err.to_string(),
        })?,
        "json" => serde_json::from_str(&content).map_err(|err| ConfigError::Parse {
            format: "json".to_string(),
            message: err.to_string(),
        })?,
        _ => return Err(ConfigError::UnsupportedFormat { extension }),
    };

    config.validate()?;
    Ok(config)
}

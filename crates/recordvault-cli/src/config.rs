//! Configuration file support for the recordvault CLI.
//!
//! Configuration is read from `--config <FILE>` when given, otherwise from
//! `recordvault/config.toml` under the user config directory
//! (`~/.config` on Linux). `RECORDVAULT_CONFIG_DIR` overrides that directory.
//! A missing default file means defaults; a missing explicit file is an error.
//!
//! # Example configuration
//!
//! ```toml
//! [kdf]
//! log_n = 15
//! r = 8
//! p = 1
//!
//! [session]
//! cookie_name = "session"
//! max_age_secs = 604800
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use recordvault_core::crypto::KdfParams;
use recordvault_core::session::SessionConfig;

/// Main configuration structure
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// scrypt parameters for every principal this CLI opens
    #[serde(default)]
    pub kdf: KdfParams,

    /// Session cookie settings
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from `explicit`, or from the default path if present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = config_path()?;
                if !path.exists() {
                    return Ok(Config::default());
                }
                path
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .kdf
            .validate()
            .with_context(|| format!("Invalid [kdf] section in {}", path.display()))?;

        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }
}

/// Get the default configuration file path.
pub fn config_path() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("RECORDVAULT_CONFIG_DIR") {
        return Ok(PathBuf::from(dir).join("config.toml"));
    }

    let base_dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

    Ok(base_dirs.config_dir().join("recordvault").join("config.toml"))
}

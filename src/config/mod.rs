// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{PortalError, Result};
use config::{Config, Environment, File};
use std::path::PathBuf;

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest)
    /// 2. Config file
    /// 3. Defaults (lowest)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path())
    }

    /// Same as [`AppConfig::load`] with an explicit config file path.
    /// A missing file is not an error.
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            // Load from config file if it exists
            .add_source(File::with_name(path).required(false))
            // Override with environment variables (e.g. WAGATE__REALTIME__WS_URL)
            .add_source(
                Environment::with_prefix("WAGATE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| PortalError::Config(e.to_string()))?;

        let app: AppConfig = config
            .try_deserialize()
            .map_err(|e| PortalError::Config(e.to_string()))?;
        app.validate()?;
        Ok(app)
    }

    /// Reject values the cache and channel cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 {
            return Err(PortalError::Config(
                "cache.max_entries must be greater than zero".to_string(),
            ));
        }
        if self.realtime.heartbeat_interval_ms == 0 {
            return Err(PortalError::Config(
                "realtime.heartbeat_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.realtime.inbound_buffer == 0 {
            return Err(PortalError::Config(
                "realtime.inbound_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn default_config_path() -> String {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wagate")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    }
}

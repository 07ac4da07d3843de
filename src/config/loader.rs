//! Configuration loading functionality
//!
//! Settings are layered from lowest to highest priority:
//! 1. Default values
//! 2. JSON settings file
//! 3. Environment variables and command line arguments (resolved by clap)

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::error::{ConfigError, Result};
use crate::config::types::BootstrapSettings;
use crate::config::validator::validate_settings;

/// Values supplied on the command line or through the environment
///
/// `None` leaves the lower-priority value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    pub database_url: Option<String>,
    pub ready_attempts: Option<u32>,
    pub ready_interval_ms: Option<u64>,
    pub redirect_port: Option<u16>,
    pub app_port: Option<u16>,
    pub daemon_binary: Option<PathBuf>,
    pub daemon_config_path: Option<PathBuf>,
    pub daemon_health_timeout_ms: Option<u64>,
    pub daemon_poll_interval_ms: Option<u64>,
    pub iptables_binary: Option<String>,
    pub chain: Option<String>,
    pub strict_resolution: Option<bool>,
    pub log_level: Option<String>,
}

impl BootstrapSettings {
    /// Load settings from a JSON file, defaulting every missing field
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(path.to_path_buf(), e.to_string()))?;

        debug!("Parsing JSON from file: {}", path.display());
        serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Apply overrides on top of these settings
    pub fn apply(mut self, overrides: SettingsOverrides) -> Self {
        fn set<T>(field: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *field = value;
            }
        }

        if overrides.database_url.is_some() {
            self.database_url = overrides.database_url;
        }
        set(&mut self.ready_attempts, overrides.ready_attempts);
        set(&mut self.ready_interval_ms, overrides.ready_interval_ms);
        set(&mut self.redirect_port, overrides.redirect_port);
        set(&mut self.app_port, overrides.app_port);
        set(&mut self.daemon_binary, overrides.daemon_binary);
        set(&mut self.daemon_config_path, overrides.daemon_config_path);
        set(&mut self.daemon_health_timeout_ms, overrides.daemon_health_timeout_ms);
        set(&mut self.daemon_poll_interval_ms, overrides.daemon_poll_interval_ms);
        set(&mut self.iptables_binary, overrides.iptables_binary);
        set(&mut self.chain, overrides.chain);
        set(&mut self.strict_resolution, overrides.strict_resolution);
        set(&mut self.log_level, overrides.log_level);
        self
    }
}

/// Load, layer and validate the bootstrap settings
pub fn load_settings(file: Option<&Path>, overrides: SettingsOverrides) -> Result<BootstrapSettings> {
    let base = match file {
        Some(path) => {
            info!("Loading settings from file: {}", path.display());
            BootstrapSettings::from_file(path)?
        }
        None => BootstrapSettings::default(),
    };

    let settings = base.apply(overrides);
    validate_settings(&settings)?;
    Ok(settings)
}

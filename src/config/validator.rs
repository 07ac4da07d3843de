//! Configuration validator
//!
//! This module provides functionality for validating bootstrap settings.

use log::warn;

use crate::config::types::BootstrapSettings;
use crate::config::error::{ConfigError, Result};

/// iptables limits chain names to 28 characters
const MAX_CHAIN_LEN: usize = 28;

/// Validate the settings
pub fn validate_settings(settings: &BootstrapSettings) -> Result<()> {
    validate_store_settings(settings)?;
    validate_daemon_settings(settings)?;
    validate_filter_settings(settings)?;
    validate_general_settings(settings);
    Ok(())
}

fn validate_store_settings(settings: &BootstrapSettings) -> Result<()> {
    if settings.ready_attempts == 0 {
        return Err(ConfigError::InvalidValue(
            "ready_attempts".to_string(),
            "At least one readiness probe is required".to_string()
        ));
    }

    if settings.ready_interval_ms == 0 {
        return Err(ConfigError::InvalidValue(
            "ready_interval_ms".to_string(),
            "Probe interval must be greater than 0".to_string()
        ));
    }

    Ok(())
}

fn validate_daemon_settings(settings: &BootstrapSettings) -> Result<()> {
    if settings.redirect_port == 0 {
        return Err(ConfigError::InvalidValue(
            "redirect_port".to_string(),
            "Redirect port must be between 1 and 65535".to_string()
        ));
    }

    if settings.redirect_port == settings.app_port {
        return Err(ConfigError::InvalidCombination(format!(
            "Redirect port {} collides with the application port",
            settings.redirect_port
        )));
    }

    if settings.daemon_health_timeout_ms == 0 || settings.daemon_poll_interval_ms == 0 {
        return Err(ConfigError::InvalidValue(
            "daemon_health_timeout_ms".to_string(),
            "Daemon health timeout and poll interval must be greater than 0".to_string()
        ));
    }

    if settings.daemon_binary.as_os_str().is_empty() {
        return Err(ConfigError::InvalidValue(
            "daemon_binary".to_string(),
            "Daemon binary must not be empty".to_string()
        ));
    }

    Ok(())
}

fn validate_filter_settings(settings: &BootstrapSettings) -> Result<()> {
    let chain = settings.chain.as_str();
    if chain.is_empty() || chain.len() > MAX_CHAIN_LEN || chain.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidValue(
            "chain".to_string(),
            format!("Chain name must be 1-{} characters without whitespace", MAX_CHAIN_LEN)
        ));
    }

    if settings.iptables_binary.is_empty() {
        return Err(ConfigError::InvalidValue(
            "iptables_binary".to_string(),
            "Packet-filter binary must not be empty".to_string()
        ));
    }

    Ok(())
}

fn validate_general_settings(settings: &BootstrapSettings) {
    match settings.log_level.as_str() {
        "error" | "warn" | "info" | "debug" | "trace" => {}
        level => {
            warn!("Invalid log level: {}. Using default: info", level);
        }
    }
}

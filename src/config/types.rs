//! Bootstrap settings
//!
//! Settings that control the bootstrap itself. Proxy credentials are not part
//! of these: they live in the configuration store.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults;

/// Bootstrap settings
///
/// Every field has a default, so an empty JSON object is a valid settings file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct BootstrapSettings {
    // --- Configuration store ---

    /// Connection URL of the configuration store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Number of readiness probes before giving up
    #[serde(default = "defaults::ready_attempts")]
    pub ready_attempts: u32,

    /// Fixed interval between readiness probes (milliseconds)
    #[serde(default = "defaults::ready_interval_ms")]
    pub ready_interval_ms: u64,

    // --- Redirect daemon ---

    /// Local port the redirect daemon binds
    #[serde(default = "defaults::redirect_port")]
    pub redirect_port: u16,

    /// Port the application listens on; must differ from `redirect_port`
    #[serde(default = "defaults::app_port")]
    pub app_port: u16,

    /// Redirect daemon executable
    #[serde(default = "defaults::daemon_binary")]
    pub daemon_binary: PathBuf,

    /// Path of the rendered daemon configuration
    #[serde(default = "defaults::daemon_config_path")]
    pub daemon_config_path: PathBuf,

    /// How long the daemon may take to accept connections (milliseconds)
    #[serde(default = "defaults::daemon_health_timeout_ms")]
    pub daemon_health_timeout_ms: u64,

    /// Pause between daemon health checks (milliseconds)
    #[serde(default = "defaults::daemon_poll_interval_ms")]
    pub daemon_poll_interval_ms: u64,

    // --- Packet filter ---

    /// Packet-filter executable
    #[serde(default = "defaults::iptables_binary")]
    pub iptables_binary: String,

    /// Dedicated NAT chain
    #[serde(default = "defaults::chain")]
    pub chain: String,

    /// Abort when the proxy host cannot be resolved
    #[serde(default)]
    pub strict_resolution: bool,

    // --- General ---

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            database_url: None,
            ready_attempts: defaults::ready_attempts(),
            ready_interval_ms: defaults::ready_interval_ms(),
            redirect_port: defaults::redirect_port(),
            app_port: defaults::app_port(),
            daemon_binary: defaults::daemon_binary(),
            daemon_config_path: defaults::daemon_config_path(),
            daemon_health_timeout_ms: defaults::daemon_health_timeout_ms(),
            daemon_poll_interval_ms: defaults::daemon_poll_interval_ms(),
            iptables_binary: defaults::iptables_binary(),
            chain: defaults::chain(),
            strict_resolution: false,
            log_level: defaults::log_level(),
        }
    }
}

impl BootstrapSettings {
    /// Interval between readiness probes
    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.ready_interval_ms)
    }

    /// Upper bound for the daemon health check
    pub fn daemon_health_timeout(&self) -> Duration {
        Duration::from_millis(self.daemon_health_timeout_ms)
    }

    /// Pause between daemon health checks
    pub fn daemon_poll_interval(&self) -> Duration {
        Duration::from_millis(self.daemon_poll_interval_ms)
    }
}

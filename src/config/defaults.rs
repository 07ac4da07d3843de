//! Default configuration values
//!
//! Single source of truth for bootstrap defaults.

use std::path::PathBuf;

/// Environment variable prefix for bootstrap options
pub const ENV_PREFIX: &str = "TPROXY_";

/// Environment variable holding the configuration store URL
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Local port the redirect daemon listens on
pub const REDIRECT_PORT: u16 = 12345;

/// Port the application itself serves on
pub const APP_PORT: u16 = 8000;

/// Name of the dedicated NAT chain
pub const CHAIN_NAME: &str = "REDSOCKS";

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Readiness probe attempts
pub fn ready_attempts() -> u32 {
    30
}

/// Readiness probe interval in milliseconds
pub fn ready_interval_ms() -> u64 {
    1000
}

/// Redirect daemon local port
pub fn redirect_port() -> u16 {
    REDIRECT_PORT
}

/// Application listening port
pub fn app_port() -> u16 {
    APP_PORT
}

/// Redirect daemon executable
pub fn daemon_binary() -> PathBuf {
    PathBuf::from("redsocks")
}

/// Where the rendered daemon configuration is written
pub fn daemon_config_path() -> PathBuf {
    PathBuf::from("/tmp/redsocks.conf")
}

/// Upper bound for the daemon to start accepting connections
pub fn daemon_health_timeout_ms() -> u64 {
    3000
}

/// Pause between daemon health checks
pub fn daemon_poll_interval_ms() -> u64 {
    100
}

/// Packet-filter executable
pub fn iptables_binary() -> String {
    "iptables".to_string()
}

/// NAT chain name
pub fn chain() -> String {
    CHAIN_NAME.to_string()
}

//! Proxy config resolver
//!
//! Turns the raw `socks5_*` rows into a typed [`ProxyConfig`]. Missing keys
//! take documented defaults (`enabled=false`, `port=1080`, everything else
//! empty); nothing else is inferred.

use std::collections::HashMap;
use std::fmt;

use log::warn;
use percent_encoding::percent_decode_str;
use url::{Host, ParseError, Url};

use crate::common::{BootstrapError, Result};

/// Keys read from the `config` table
pub mod keys {
    pub const ENABLED: &str = "socks5_enabled";
    pub const HOST: &str = "socks5_host";
    pub const PORT: &str = "socks5_port";
    pub const USER: &str = "socks5_user";
    pub const PASS: &str = "socks5_pass";
    /// Legacy single-value form `socks5://[user:pass@]host:port`
    pub const LEGACY_URL: &str = "socks5_proxy";
}

/// Default SOCKS5 port
pub const DEFAULT_PROXY_PORT: u16 = 1080;

/// Resolved proxy configuration
///
/// Built once per startup and never mutated. The store remains the source of
/// truth; nothing here is written back.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: DEFAULT_PROXY_PORT,
            username: String::new(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ProxyConfig {
    /// Resolve a configuration from raw store rows
    ///
    /// Only `"true"` (any case) enables the proxy. An unusable port is an
    /// error when the proxy is enabled and falls back to the default otherwise.
    pub fn from_rows(rows: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| rows.get(key).map(|v| v.trim()).unwrap_or_default();

        let enabled = get(keys::ENABLED).eq_ignore_ascii_case("true");

        let mut config = ProxyConfig {
            enabled,
            host: get(keys::HOST).to_string(),
            port: DEFAULT_PROXY_PORT,
            username: get(keys::USER).to_string(),
            password: rows.get(keys::PASS).cloned().unwrap_or_default(),
        };

        let raw_port = get(keys::PORT);
        let mut port_set = false;
        if !raw_port.is_empty() {
            match parse_proxy_port(raw_port) {
                Some(port) => {
                    config.port = port;
                    port_set = true;
                }
                None if enabled => {
                    return Err(BootstrapError::ConfigurationInvalid(format!(
                        "{} must be between 1 and 65535, got '{}'",
                        keys::PORT,
                        raw_port
                    )));
                }
                None => warn!(
                    "Ignoring invalid {} '{}' while proxy is disabled, using {}",
                    keys::PORT, raw_port, DEFAULT_PROXY_PORT
                ),
            }
        }

        if config.host.is_empty() {
            let legacy = get(keys::LEGACY_URL);
            if !legacy.is_empty() {
                config.apply_legacy_url(legacy, port_set)?;
            }
        }

        Ok(config)
    }

    /// Check that an enabled configuration is complete
    ///
    /// A disabled configuration is always valid.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let missing: Vec<&str> = [
            (keys::HOST, self.host.is_empty()),
            (keys::USER, self.username.is_empty()),
            (keys::PASS, self.password.is_empty()),
        ]
        .into_iter()
        .filter_map(|(key, empty)| empty.then_some(key))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BootstrapError::ConfigurationInvalid(format!(
                "proxy is enabled but {} {} empty",
                missing.join(", "),
                if missing.len() == 1 { "is" } else { "are" }
            )))
        }
    }

    /// `host:port` of the remote proxy
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fill what the discrete keys left empty from a `socks5://` URL
    fn apply_legacy_url(&mut self, raw: &str, port_set: bool) -> Result<()> {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(ParseError::InvalidPort) if self.enabled && !port_set => {
                return Err(BootstrapError::ConfigurationInvalid(format!(
                    "{} has an invalid port",
                    keys::LEGACY_URL
                )));
            }
            Err(e) => {
                warn!("Ignoring unparseable {}: {}", keys::LEGACY_URL, e);
                return Ok(());
            }
        };

        if !matches!(url.scheme(), "socks5" | "socks5h") {
            warn!("Ignoring {} without socks5:// scheme", keys::LEGACY_URL);
            return Ok(());
        }
        let host = match url.host() {
            Some(Host::Domain(name)) if !name.is_empty() => name.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => {
                warn!("Ignoring {} without a host", keys::LEGACY_URL);
                return Ok(());
            }
        };

        if !port_set {
            match url.port() {
                Some(0) if self.enabled => {
                    return Err(BootstrapError::ConfigurationInvalid(format!(
                        "{} has an invalid port '0'",
                        keys::LEGACY_URL
                    )));
                }
                Some(0) | None => {}
                Some(port) => self.port = port,
            }
        }

        self.host = host;
        if self.username.is_empty() {
            self.username = decode(url.username());
        }
        if self.password.is_empty() {
            self.password = decode(url.password().unwrap_or_default());
        }
        Ok(())
    }
}

fn decode(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

fn parse_proxy_port(raw: &str) -> Option<u16> {
    match raw.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}

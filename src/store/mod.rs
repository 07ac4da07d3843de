//! Configuration store module
//!
//! Everything needed to go from a store URL to a resolved [`ProxyConfig`]:
//! parsing the connection target, waiting for the store, reading the proxy
//! rows and resolving them.

pub mod client;
pub mod readiness;
pub mod resolver;
pub mod target;

pub use client::{PgSettingsSource, SettingsSource, StoreRead};
pub use readiness::{Readiness, ReadinessPolicy, StoreProbe, TcpProbe, wait_until_ready};
pub use resolver::{ProxyConfig, DEFAULT_PROXY_PORT};
pub use target::{ConnectionTarget, StoreLocation};

use crate::common::{BootstrapError, Result};

/// Outcome of reading the proxy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyConfigRead {
    /// Rows were read and resolved
    Loaded(ProxyConfig),
    /// The `config` table does not exist yet
    SchemaAbsent,
}

/// Read and resolve the proxy configuration
///
/// A connection failure is returned as
/// [`BootstrapError::TransientUnavailable`]; a resolution problem as
/// [`BootstrapError::ConfigurationInvalid`].
pub async fn read_proxy_config<S: SettingsSource>(
    source: &S,
    target: &ConnectionTarget,
) -> Result<ProxyConfigRead> {
    match source.read_rows(target).await {
        StoreRead::Rows(rows) => Ok(ProxyConfigRead::Loaded(ProxyConfig::from_rows(&rows)?)),
        StoreRead::SchemaAbsent => Ok(ProxyConfigRead::SchemaAbsent),
        StoreRead::ConnectionError(reason) => Err(BootstrapError::TransientUnavailable(reason)),
    }
}

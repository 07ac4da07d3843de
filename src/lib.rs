//! Transparent Proxy Bootstrap: SOCKS5 routing set up before the application starts
//!
//! At process startup this library consults the application's configuration
//! store for SOCKS5 proxy settings and, when the proxy is enabled, redirects
//! all outbound TCP through it: a local redirect daemon relays connections to
//! the proxy, and NAT rules steer traffic to the daemon.
//!
//! # Main Features
//!
//! - Bounded wait for the configuration store, with direct-connection fallback
//!   on fresh deployments
//! - Validated proxy configuration: an enabled proxy with missing credentials
//!   aborts startup
//! - Supervised redirect daemon with a bounded health check
//! - Idempotent NAT rules that never redirect loopback, link-local, private
//!   ranges or the proxy itself
//!
//! # Example
//!
//! ```no_run
//! use tproxy_bootstrap::bootstrap::{Orchestrator, StartupContext};
//! use tproxy_bootstrap::config::BootstrapSettings;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> tproxy_bootstrap::Result<()> {
//!     let settings = BootstrapSettings {
//!         database_url: Some("postgresql://pbuser:pbpass@db:5432/pbarr".to_string()),
//!         ..Default::default()
//!     };
//!
//!     let mut ctx = StartupContext::new();
//!     let mode = Orchestrator::system(&settings).run(&mut ctx).await?;
//!     println!("routing: {:?}", mode.kind());
//!     Ok(())
//! }
//! ```

// Public modules
pub mod bootstrap;
pub mod common;
pub mod config;
pub mod daemon;
pub mod environment;
pub mod firewall;
pub mod store;

// Re-export commonly used structures and functions for convenience
pub use bootstrap::{Orchestrator, RoutingMode, StartupContext, StartupState};
pub use common::{BootstrapError, Result};
pub use store::ProxyConfig;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

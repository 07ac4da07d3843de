//! Configuration module
//!
//! Settings of the bootstrap itself: where the store is, how long to wait for
//! it, which daemon and packet-filter binaries to drive. Proxy credentials are
//! not configured here; they are read from the store.

pub mod defaults;
pub mod error;
pub mod loader;
pub mod types;
pub mod validator;

pub use defaults::{DATABASE_URL_ENV, ENV_PREFIX};
pub use error::ConfigError;
pub use loader::{load_settings, SettingsOverrides};
pub use types::BootstrapSettings;
pub use validator::validate_settings;

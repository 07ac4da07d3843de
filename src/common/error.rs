//! Error handling module
//!
//! This module defines the error types and result type aliases used in the bootstrap.

use thiserror::Error;
use std::io;

/// Bootstrap error type
///
/// Every variant except `TransientUnavailable` aborts startup: the application
/// must never be started with a half-configured routing state.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Configuration store not reachable or not yet migrated
    #[error("Configuration store unavailable: {0}")]
    TransientUnavailable(String),

    /// Proxy enabled in the store but its settings are unusable
    #[error("Invalid proxy configuration: {0}")]
    ConfigurationInvalid(String),

    /// Redirect daemon did not become live
    #[error("Redirect daemon failed to start: {0}")]
    DaemonStartup(String),

    /// A packet-filter command failed
    #[error("Rule installation failed: `{command}`: {stderr}")]
    RuleInstallation {
        /// Command line that failed
        command: String,
        /// Diagnostic output of the failed command
        stderr: String,
    },

    /// Bootstrap settings error
    #[error("Settings error: {0}")]
    Settings(String),

    /// Startup state machine violated
    #[error("Illegal startup transition: {from} -> {to}")]
    InvalidTransition {
        /// State before the attempted transition
        from: String,
        /// Requested state
        to: String,
    },

    /// Application could not be started
    #[error("Application handoff failed: {0}")]
    Handoff(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BootstrapError {
    /// Whether this error must terminate startup
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::TransientUnavailable(_))
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `BootstrapError`.
pub type Result<T> = std::result::Result<T, BootstrapError>;

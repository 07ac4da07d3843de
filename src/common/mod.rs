//! Common module
//!
//! This module contains shared errors and utility functions used throughout the bootstrap.

pub mod command;
pub mod error;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use command::{CommandOutput, CommandRunner, SystemRunner, display_command};
pub use error::{BootstrapError, Result};
pub use log::init_logger;
pub use net::{HostResolver, SystemResolver, port_accepts};

//! Redirect daemon module
//!
//! The redirect daemon accepts redirected TCP connections and relays them
//! through the remote SOCKS5 proxy; the SOCKS5 handshake is entirely its job.

pub mod render;
pub mod supervisor;

pub use render::{render_config, write_config};
pub use supervisor::{DaemonHandle, DaemonLauncher, DaemonState, ProcessLauncher};

//! Startup bootstrap module
//!
//! The state machine, the orchestrator that drives it, and the handoff to the
//! application once routing is settled.

pub mod handoff;
pub mod orchestrator;
pub mod state;

pub use handoff::{hand_off, AppCommand};
pub use orchestrator::{DirectReason, ModeKind, Orchestrator, RoutingMode};
pub use state::{StartupContext, StartupState};

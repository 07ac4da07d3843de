//! Packet-filter module
//!
//! Kernel-level transparent redirection of outbound TCP to the redirect daemon.

pub mod installer;
pub mod rules;

pub use installer::{Hook, InstallReport, RuleInstaller, Warning};
pub use rules::{plan_rules, BypassClass, Destination, RedirectRule, RuleAction};

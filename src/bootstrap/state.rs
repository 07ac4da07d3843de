//! Startup state machine
//!
//! `Init → ProbingStore → {ConfigAbsent | ConfigLoaded} → {Skipped | DaemonStarting}
//! → {Failed | RulesInstalled} → ApplicationHandoff`

use std::fmt;

use log::debug;

use crate::common::{BootstrapError, Result};
use crate::store::{ConnectionTarget, ProxyConfig};

/// Stage of the startup sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartupState {
    Init,
    ProbingStore,
    ConfigAbsent,
    ConfigLoaded,
    Skipped,
    DaemonStarting,
    RulesInstalled,
    Failed,
    ApplicationHandoff,
}

impl StartupState {
    /// Whether `next` may follow `self`
    pub fn can_transition_to(self, next: StartupState) -> bool {
        use StartupState::*;

        matches!(
            (self, next),
            (Init, ProbingStore)
                | (ProbingStore, ConfigAbsent)
                | (ProbingStore, ConfigLoaded)
                | (ProbingStore, Failed)
                | (ConfigAbsent, Skipped)
                | (ConfigLoaded, Skipped)
                | (ConfigLoaded, DaemonStarting)
                | (ConfigLoaded, Failed)
                | (DaemonStarting, RulesInstalled)
                | (DaemonStarting, Failed)
                | (RulesInstalled, ApplicationHandoff)
                | (RulesInstalled, Failed)
                | (Skipped, ApplicationHandoff)
        )
    }

    /// `Failed` and `ApplicationHandoff` end the sequence
    pub fn is_terminal(self) -> bool {
        matches!(self, StartupState::Failed | StartupState::ApplicationHandoff)
    }
}

impl fmt::Display for StartupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State carried down the startup pipeline
///
/// Artifacts produced by one stage are recorded here for the next; nothing
/// travels through globals or the environment.
#[derive(Debug)]
pub struct StartupContext {
    state: StartupState,
    trace: Vec<StartupState>,
    /// Parsed store target, once known
    pub target: Option<ConnectionTarget>,
    /// Resolved proxy configuration, once loaded
    pub proxy: Option<ProxyConfig>,
}

impl Default for StartupContext {
    fn default() -> Self {
        Self::new()
    }
}

impl StartupContext {
    pub fn new() -> Self {
        Self {
            state: StartupState::Init,
            trace: vec![StartupState::Init],
            target: None,
            proxy: None,
        }
    }

    /// Current state
    pub fn state(&self) -> StartupState {
        self.state
    }

    /// Every state visited so far, in order
    pub fn trace(&self) -> &[StartupState] {
        &self.trace
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn transition(&mut self, next: StartupState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(BootstrapError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!("Startup state: {} -> {}", self.state, next);
        self.state = next;
        self.trace.push(next);
        Ok(())
    }

    /// Enter `Failed` from wherever the sequence stopped
    pub fn fail(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        debug!("Startup state: {} -> {}", self.state, StartupState::Failed);
        self.state = StartupState::Failed;
        self.trace.push(StartupState::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StartupState::*;

    #[test]
    fn test_happy_paths() {
        let mut ctx = StartupContext::new();
        for next in [ProbingStore, ConfigLoaded, DaemonStarting, RulesInstalled, ApplicationHandoff] {
            ctx.transition(next).unwrap();
        }
        assert_eq!(ctx.state(), ApplicationHandoff);
        assert_eq!(ctx.trace().len(), 6);

        let mut ctx = StartupContext::new();
        for next in [ProbingStore, ConfigAbsent, Skipped, ApplicationHandoff] {
            ctx.transition(next).unwrap();
        }
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!Init.can_transition_to(ConfigLoaded));
        assert!(!ConfigAbsent.can_transition_to(DaemonStarting));
        assert!(!Skipped.can_transition_to(DaemonStarting));
        assert!(!Failed.can_transition_to(ApplicationHandoff));
        assert!(!DaemonStarting.can_transition_to(ApplicationHandoff));

        let mut ctx = StartupContext::new();
        let err = ctx.transition(RulesInstalled).unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidTransition { .. }));
        assert_eq!(ctx.state(), Init);
    }

    #[test]
    fn test_fail_is_terminal() {
        let mut ctx = StartupContext::new();
        ctx.transition(ProbingStore).unwrap();
        ctx.fail();
        ctx.fail();
        assert_eq!(ctx.trace(), &[Init, ProbingStore, Failed]);
        assert!(ctx.transition(ApplicationHandoff).is_err());
    }
}

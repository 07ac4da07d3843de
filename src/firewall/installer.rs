//! NAT rule installer
//!
//! Installs the redirect rule set into a dedicated `nat` chain and hooks that
//! chain into PREROUTING and OUTPUT. Re-running the installer flushes the
//! chain instead of duplicating it, and hook jumps are only appended when
//! absent, so repeated runs converge on the same rule set.

use std::net::Ipv4Addr;

use log::{info, warn};

use crate::common::{display_command, BootstrapError, CommandRunner, HostResolver, Result};
use crate::config::BootstrapSettings;
use crate::daemon::{DaemonHandle, DaemonState};
use crate::store::ProxyConfig;
use super::rules::{loopback_net, plan_rules, RedirectRule};

const NAT_TABLE: &str = "nat";

/// Built-in hooks the chain is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    /// Traffic routed through the host
    Prerouting,
    /// Traffic originated on the host
    Output,
}

impl Hook {
    pub fn chain(&self) -> &'static str {
        match self {
            Self::Prerouting => "PREROUTING",
            Self::Output => "OUTPUT",
        }
    }

    /// Jump specification for this hook
    ///
    /// OUTPUT skips loopback destinations so local-only calls such as health
    /// probes are never intercepted.
    pub fn jump_spec(&self, chain: &str) -> Vec<String> {
        let mut spec = vec!["-p".to_string(), "tcp".to_string()];
        if *self == Self::Output {
            spec.push("!".to_string());
            spec.push("-d".to_string());
            spec.push(loopback_net().to_string());
        }
        spec.push("-j".to_string());
        spec.push(chain.to_string());
        spec
    }
}

/// Non-fatal condition found while installing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The proxy host did not resolve; its traffic may loop through the daemon
    UnresolvedProxyHost { host: String },
}

/// What was installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Rules of the dedicated chain, in order
    pub rules: Vec<RedirectRule>,
    /// Resolved proxy address, if any
    pub proxy_ip: Option<Ipv4Addr>,
    /// Hooks jumping into the chain
    pub hooks: Vec<Hook>,
    pub warnings: Vec<Warning>,
}

/// Installs redirect rules through an `iptables`-compatible command
pub struct RuleInstaller<'a, C, H> {
    runner: &'a C,
    resolver: &'a H,
    binary: String,
    chain: String,
    strict_resolution: bool,
}

impl<'a, C: CommandRunner, H: HostResolver> RuleInstaller<'a, C, H> {
    /// Create an installer
    pub fn new(runner: &'a C, resolver: &'a H, binary: impl Into<String>, chain: impl Into<String>) -> Self {
        Self {
            runner,
            resolver,
            binary: binary.into(),
            chain: chain.into(),
            strict_resolution: false,
        }
    }

    /// Installer configured from the bootstrap settings
    pub fn from_settings(runner: &'a C, resolver: &'a H, settings: &BootstrapSettings) -> Self {
        Self::new(runner, resolver, settings.iptables_binary.clone(), settings.chain.clone())
            .strict_resolution(settings.strict_resolution)
    }

    /// Treat an unresolved proxy host as fatal
    pub fn strict_resolution(mut self, strict: bool) -> Self {
        self.strict_resolution = strict;
        self
    }

    /// Install the rule set redirecting TCP traffic to the daemon
    ///
    /// Any failing command aborts with [`BootstrapError::RuleInstallation`].
    pub fn install_redirect_rules(&self, handle: &DaemonHandle, proxy: &ProxyConfig) -> Result<InstallReport> {
        if handle.state() != DaemonState::Alive {
            return Err(BootstrapError::DaemonStartup(format!(
                "redirect daemon {} is {}, refusing to install rules",
                handle.pid(),
                handle.state()
            )));
        }

        let mut warnings = Vec::new();
        let proxy_ip = self.resolver.resolve_ipv4(&proxy.host);
        match proxy_ip {
            Some(ip) => info!("Proxy host {} resolved to {}", proxy.host, ip),
            None if self.strict_resolution => {
                return Err(BootstrapError::RuleInstallation {
                    command: format!("resolve {}", proxy.host),
                    stderr: "proxy host did not resolve to an IPv4 address".to_string(),
                });
            }
            None => {
                warn!(
                    "Could not resolve proxy host {}; its traffic is not excluded and may loop through the redirect daemon",
                    proxy.host
                );
                warnings.push(Warning::UnresolvedProxyHost { host: proxy.host.clone() });
            }
        }

        self.reset_chain()?;

        let rules = plan_rules(proxy_ip, handle.local_port());
        for rule in &rules {
            info!("Adding rule {}", rule);
            let mut args = self.nat(&["-A", &self.chain]);
            args.extend(rule.to_rule_spec());
            self.run_checked(&args)?;
        }

        let hooks = vec![Hook::Prerouting, Hook::Output];
        for hook in &hooks {
            self.attach(*hook)?;
        }

        info!(
            "Installed {} rules in chain {} (redirecting to port {})",
            rules.len(),
            self.chain,
            handle.local_port()
        );

        Ok(InstallReport { rules, proxy_ip, hooks, warnings })
    }

    /// Flush the chain if it exists, create it otherwise
    fn reset_chain(&self) -> Result<()> {
        let exists = self.probe(&self.nat(&["-S", &self.chain]))?;
        if exists {
            info!("Flushing existing chain {}", self.chain);
            self.run_checked(&self.nat(&["-F", &self.chain]))
        } else {
            info!("Creating chain {}", self.chain);
            self.run_checked(&self.nat(&["-N", &self.chain]))
        }
    }

    /// Append the jump into our chain unless it is already there
    fn attach(&self, hook: Hook) -> Result<()> {
        let spec = hook.jump_spec(&self.chain);

        let mut check = self.nat(&["-C", hook.chain()]);
        check.extend(spec.iter().cloned());
        if self.probe(&check)? {
            info!("Chain {} already hooked into {}", self.chain, hook.chain());
            return Ok(());
        }

        info!("Hooking chain {} into {}", self.chain, hook.chain());
        let mut append = self.nat(&["-A", hook.chain()]);
        append.extend(spec);
        self.run_checked(&append)
    }

    fn nat(&self, args: &[&str]) -> Vec<String> {
        let mut full = vec!["-t".to_string(), NAT_TABLE.to_string()];
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    /// Run a query-style command; a non-zero exit means "no"
    fn probe(&self, args: &[String]) -> Result<bool> {
        self.runner
            .run(&self.binary, args)
            .map(|output| output.success)
            .map_err(|e| BootstrapError::RuleInstallation {
                command: display_command(&self.binary, args),
                stderr: e.to_string(),
            })
    }

    fn run_checked(&self, args: &[String]) -> Result<()> {
        let command = display_command(&self.binary, args);
        let output = self
            .runner
            .run(&self.binary, args)
            .map_err(|e| BootstrapError::RuleInstallation {
                command: command.clone(),
                stderr: e.to_string(),
            })?;

        if !output.success {
            return Err(BootstrapError::RuleInstallation { command, stderr: output.stderr });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use crate::common::net::MockHostResolver;
    use crate::common::CommandOutput;

    /// Records commands; fails the first one containing `fail_on`
    #[derive(Default)]
    struct RecordingRunner {
        calls: RefCell<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
            let line = display_command(program, args);
            self.calls.borrow_mut().push(line.clone());
            // Queries report "absent" so every mutation is exercised
            if args.iter().any(|a| a == "-S" || a == "-C") {
                return Ok(CommandOutput::failed("No chain/target/match by that name."));
            }
            match self.fail_on {
                Some(needle) if line.contains(needle) => Ok(CommandOutput::failed("Permission denied (you must be root)")),
                _ => Ok(CommandOutput::ok()),
            }
        }
    }

    fn proxy() -> ProxyConfig {
        ProxyConfig {
            enabled: true,
            host: "proxy.example".to_string(),
            port: 1080,
            username: "a".to_string(),
            password: "b".to_string(),
        }
    }

    fn resolver(ip: Option<Ipv4Addr>) -> MockHostResolver {
        let mut resolver = MockHostResolver::new();
        resolver.expect_resolve_ipv4().times(1).return_const(ip);
        resolver
    }

    #[test]
    fn test_command_sequence() {
        let runner = RecordingRunner::default();
        let resolver = resolver(Some(Ipv4Addr::new(10, 0, 0, 9)));
        let installer = RuleInstaller::new(&runner, &resolver, "iptables", "REDSOCKS");

        let report = installer
            .install_redirect_rules(&DaemonHandle::new(7, 12345), &proxy())
            .unwrap();
        assert!(report.warnings.is_empty());
        assert_eq!(report.proxy_ip, Some(Ipv4Addr::new(10, 0, 0, 9)));

        let calls = runner.calls.borrow();
        assert_eq!(calls[0], "iptables -t nat -S REDSOCKS");
        assert_eq!(calls[1], "iptables -t nat -N REDSOCKS");
        assert_eq!(calls[2], "iptables -t nat -A REDSOCKS -d 0.0.0.0/8 -j RETURN");
        assert_eq!(calls[8], "iptables -t nat -A REDSOCKS -d 10.0.0.9/32 -j RETURN");
        assert_eq!(calls[9], "iptables -t nat -A REDSOCKS -p tcp -j REDIRECT --to-ports 12345");
        assert_eq!(calls[10], "iptables -t nat -C PREROUTING -p tcp -j REDSOCKS");
        assert_eq!(calls[11], "iptables -t nat -A PREROUTING -p tcp -j REDSOCKS");
        assert_eq!(calls[12], "iptables -t nat -C OUTPUT -p tcp ! -d 127.0.0.0/8 -j REDSOCKS");
        assert_eq!(calls[13], "iptables -t nat -A OUTPUT -p tcp ! -d 127.0.0.0/8 -j REDSOCKS");
        assert_eq!(calls.len(), 14);
    }

    #[test]
    fn test_unresolved_host_warns_and_continues() {
        let runner = RecordingRunner::default();
        let resolver = resolver(None);
        let installer = RuleInstaller::new(&runner, &resolver, "iptables", "REDSOCKS");

        let report = installer
            .install_redirect_rules(&DaemonHandle::new(7, 12345), &proxy())
            .unwrap();
        assert_eq!(
            report.warnings,
            vec![Warning::UnresolvedProxyHost { host: "proxy.example".to_string() }]
        );
        assert_eq!(report.rules.len(), 7);
    }

    #[test]
    fn test_strict_resolution_fails_before_touching_the_table() {
        let runner = RecordingRunner::default();
        let resolver = resolver(None);
        let installer = RuleInstaller::new(&runner, &resolver, "iptables", "REDSOCKS")
            .strict_resolution(true);

        let err = installer
            .install_redirect_rules(&DaemonHandle::new(7, 12345), &proxy())
            .unwrap_err();
        assert!(matches!(err, BootstrapError::RuleInstallation { .. }));
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_failing_command_is_partial_failure() {
        let runner = RecordingRunner { fail_on: Some("REDIRECT"), ..Default::default() };
        let resolver = resolver(Some(Ipv4Addr::new(10, 0, 0, 9)));
        let installer = RuleInstaller::new(&runner, &resolver, "iptables", "REDSOCKS");

        match installer.install_redirect_rules(&DaemonHandle::new(7, 12345), &proxy()) {
            Err(BootstrapError::RuleInstallation { command, stderr }) => {
                assert!(command.contains("--to-ports 12345"));
                assert!(stderr.contains("Permission denied"));
            }
            other => panic!("expected rule installation failure, got {:?}", other),
        }
        // Nothing after the failing command ran
        assert!(!runner.calls.borrow().iter().any(|c| c.contains("PREROUTING")));
    }
}

//! Startup orchestrator
//!
//! Runs the startup stages strictly in sequence. A store that is missing,
//! unreachable or not yet migrated leads to direct-connection mode; anything
//! that could leave routing half-configured aborts startup.

use std::fmt;

use log::{info, warn};

use crate::common::{BootstrapError, CommandRunner, HostResolver, Result, SystemResolver, SystemRunner};
use crate::config::BootstrapSettings;
use crate::daemon::{DaemonHandle, DaemonLauncher, ProcessLauncher};
use crate::firewall::{InstallReport, RuleInstaller};
use crate::store::{
    read_proxy_config, wait_until_ready, ConnectionTarget, PgSettingsSource, ProxyConfigRead,
    Readiness, ReadinessPolicy, SettingsSource, StoreLocation, StoreProbe, TcpProbe,
};
use super::state::{StartupContext, StartupState};

/// Why the application runs without the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectReason {
    /// No store URL configured
    NoStore,
    /// Store URL of a kind that cannot hold proxy settings
    UnsupportedStore(String),
    /// Store did not become ready in time
    StoreTimedOut,
    /// Store reachable but the `config` table is missing
    SchemaAbsent,
    /// Store became ready but could not be read
    StoreUnavailable(String),
    /// Proxy explicitly disabled
    ProxyDisabled,
}

impl fmt::Display for DirectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStore => write!(f, "no configuration store configured"),
            Self::UnsupportedStore(scheme) => write!(f, "store scheme '{}' holds no proxy settings", scheme),
            Self::StoreTimedOut => write!(f, "configuration store not ready"),
            Self::SchemaAbsent => write!(f, "configuration table not found (fresh deployment)"),
            Self::StoreUnavailable(reason) => write!(f, "configuration store unavailable: {}", reason),
            Self::ProxyDisabled => write!(f, "SOCKS5 proxy disabled"),
        }
    }
}

/// Routing established for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Direct,
    Proxied,
}

/// Outcome of a successful startup
#[derive(Debug)]
pub enum RoutingMode {
    /// Outbound traffic goes out directly
    Direct(DirectReason),
    /// Outbound TCP is redirected through the proxy
    Proxied {
        /// `host:port` of the remote proxy
        endpoint: String,
        daemon: DaemonHandle,
        report: InstallReport,
    },
}

impl RoutingMode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Self::Direct(_) => ModeKind::Direct,
            Self::Proxied { .. } => ModeKind::Proxied,
        }
    }
}

/// Sequences readiness, config read, daemon start and rule installation
pub struct Orchestrator<'a, P, S, D, C, H> {
    settings: &'a BootstrapSettings,
    probe: P,
    source: S,
    launcher: D,
    runner: C,
    resolver: H,
}

impl<'a> Orchestrator<'a, TcpProbe, PgSettingsSource, ProcessLauncher, SystemRunner, SystemResolver> {
    /// Orchestrator talking to the real store, daemon and packet filter
    pub fn system(settings: &'a BootstrapSettings) -> Self {
        Self::new(
            settings,
            TcpProbe,
            PgSettingsSource,
            ProcessLauncher::from_settings(settings),
            SystemRunner,
            SystemResolver,
        )
    }
}

impl<'a, P, S, D, C, H> Orchestrator<'a, P, S, D, C, H>
where
    P: StoreProbe,
    S: SettingsSource,
    D: DaemonLauncher,
    C: CommandRunner,
    H: HostResolver,
{
    pub fn new(settings: &'a BootstrapSettings, probe: P, source: S, launcher: D, runner: C, resolver: H) -> Self {
        Self { settings, probe, source, launcher, runner, resolver }
    }

    /// Run the startup sequence
    ///
    /// On success the context ends in `ApplicationHandoff`; on error in `Failed`.
    pub async fn run(&self, ctx: &mut StartupContext) -> Result<RoutingMode> {
        let result = self.establish_routing(ctx).await;

        match result {
            Ok(mode) => {
                ctx.transition(StartupState::ApplicationHandoff)?;
                Ok(mode)
            }
            Err(e) => {
                ctx.fail();
                Err(e)
            }
        }
    }

    async fn establish_routing(&self, ctx: &mut StartupContext) -> Result<RoutingMode> {
        ctx.transition(StartupState::ProbingStore)?;

        let target = match self.locate_store()? {
            Ok(target) => target,
            Err(reason) => return skip_absent(ctx, reason),
        };
        ctx.target = Some(target.clone());

        let policy = ReadinessPolicy {
            max_attempts: self.settings.ready_attempts,
            interval: self.settings.ready_interval(),
        };
        if let Readiness::TimedOut { .. } = wait_until_ready(&self.probe, &target, policy).await {
            return skip_absent(ctx, DirectReason::StoreTimedOut);
        }

        let proxy = match read_proxy_config(&self.source, &target).await {
            Ok(ProxyConfigRead::Loaded(proxy)) => proxy,
            Ok(ProxyConfigRead::SchemaAbsent) => return skip_absent(ctx, DirectReason::SchemaAbsent),
            Err(BootstrapError::TransientUnavailable(reason)) => {
                return skip_absent(ctx, DirectReason::StoreUnavailable(reason));
            }
            Err(e) => return Err(e),
        };
        ctx.transition(StartupState::ConfigLoaded)?;
        ctx.proxy = Some(proxy.clone());

        if !proxy.enabled {
            info!("Proxy status: disabled");
            ctx.transition(StartupState::Skipped)?;
            return Ok(RoutingMode::Direct(DirectReason::ProxyDisabled));
        }

        info!(
            "Proxy status: enabled, {} as user '{}'",
            proxy.endpoint(),
            proxy.username
        );
        proxy.validate()?;

        ctx.transition(StartupState::DaemonStarting)?;
        let mut daemon = self.launcher.start(&proxy).await?;

        let installer = RuleInstaller::from_settings(&self.runner, &self.resolver, self.settings);
        let report = match installer.install_redirect_rules(&daemon, &proxy) {
            Ok(report) => report,
            Err(e) => {
                // A leftover daemon would hold the port on the next attempt
                daemon.abort().await;
                return Err(e);
            }
        };
        ctx.transition(StartupState::RulesInstalled)?;

        info!(
            "Transparent proxy active: TCP traffic redirected through {} (daemon PID {})",
            proxy.endpoint(),
            daemon.pid()
        );

        Ok(RoutingMode::Proxied {
            endpoint: proxy.endpoint(),
            daemon,
            report,
        })
    }

    /// Where the store lives, or why there is none to consult
    fn locate_store(&self) -> Result<std::result::Result<ConnectionTarget, DirectReason>> {
        let Some(url) = self.settings.database_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(Err(DirectReason::NoStore));
        };

        match ConnectionTarget::parse(url.trim())? {
            StoreLocation::Postgres(target) => Ok(Ok(target)),
            StoreLocation::Unsupported(scheme) => Ok(Err(DirectReason::UnsupportedStore(scheme))),
        }
    }
}

fn skip_absent(ctx: &mut StartupContext, reason: DirectReason) -> Result<RoutingMode> {
    match &reason {
        DirectReason::SchemaAbsent => info!(
            "Configuration table not found, assuming fresh deployment; continuing without proxy"
        ),
        DirectReason::StoreTimedOut | DirectReason::StoreUnavailable(_) => {
            warn!("{}; continuing with direct connections", reason)
        }
        _ => info!("{}; continuing with direct connections", reason),
    }
    ctx.transition(StartupState::ConfigAbsent)?;
    ctx.transition(StartupState::Skipped)?;
    Ok(RoutingMode::Direct(reason))
}

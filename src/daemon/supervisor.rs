//! Redirect daemon supervisor
//!
//! Launches the redirect daemon as a child process and waits, with a bounded
//! poll, until it accepts connections on its local port. A daemon that exits
//! or never starts listening is a fatal startup failure.

use std::fmt;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::process::{Child, Command};
use tokio::time::sleep;

use crate::common::{port_accepts, BootstrapError, Result};
use crate::config::BootstrapSettings;
use crate::store::ProxyConfig;
use super::render::write_config;

/// Liveness of the supervised daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// Launched, not yet accepting connections
    Starting,
    /// Process running and listening
    Alive,
    /// Process has exited
    Dead,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Alive => write!(f, "alive"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

/// Handle to the running redirect daemon
///
/// Once startup succeeds the daemon lives as long as the container; only a
/// failed startup stops it through [`DaemonHandle::abort`].
#[derive(Debug)]
pub struct DaemonHandle {
    pid: u32,
    local_port: u16,
    state: DaemonState,
    child: Option<Child>,
}

impl DaemonHandle {
    /// Handle for a daemon already known to be live
    pub fn new(pid: u32, local_port: u16) -> Self {
        Self { pid, local_port, state: DaemonState::Alive, child: None }
    }

    /// Handle owning a child process already known to be live
    pub fn for_child(child: Child, local_port: u16) -> Self {
        let pid = child.id().unwrap_or_default();
        Self { pid, local_port, state: DaemonState::Alive, child: Some(child) }
    }

    fn from_child(pid: u32, local_port: u16, child: Child) -> Self {
        Self { pid, local_port, state: DaemonState::Starting, child: Some(child) }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Port the daemon accepts redirected connections on
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Re-check whether the child process is still running
    pub fn refresh(&mut self) -> DaemonState {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Redirect daemon {} exited with {}", self.pid, status);
                    self.state = DaemonState::Dead;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Cannot query redirect daemon {}: {}", self.pid, e);
                }
            }
        }
        self.state
    }
}

impl DaemonHandle {
    /// Kill and reap the child, if this handle owns one
    pub async fn abort(&mut self) {
        let pid = self.pid;
        if self.state != DaemonState::Dead {
            if let Some(child) = self.child.as_mut() {
                info!("Stopping redirect daemon {}", pid);
                if let Err(e) = child.kill().await {
                    warn!("Cannot stop redirect daemon {}: {}", pid, e);
                }
            }
        }
        self.state = DaemonState::Dead;
    }
}

/// Starts the redirect daemon
pub trait DaemonLauncher {
    /// Start the daemon for an enabled, validated configuration
    fn start(&self, proxy: &ProxyConfig) -> impl Future<Output = Result<DaemonHandle>>;
}

/// Launches `redsocks` (or a compatible daemon) as a child process
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    pub binary: PathBuf,
    pub config_path: PathBuf,
    pub local_port: u16,
    pub health_timeout: Duration,
    pub poll_interval: Duration,
}

impl ProcessLauncher {
    /// Launcher configured from the bootstrap settings
    pub fn from_settings(settings: &BootstrapSettings) -> Self {
        Self {
            binary: settings.daemon_binary.clone(),
            config_path: settings.daemon_config_path.clone(),
            local_port: settings.redirect_port,
            health_timeout: settings.daemon_health_timeout(),
            poll_interval: settings.daemon_poll_interval(),
        }
    }

    fn local_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.local_port))
    }

    /// Poll until the daemon listens, exits, or the timeout elapses
    async fn await_healthy(&self, handle: &mut DaemonHandle) -> Result<()> {
        let deadline = Instant::now() + self.health_timeout;
        let addr = self.local_addr();

        loop {
            if handle.refresh() == DaemonState::Dead {
                return Err(BootstrapError::DaemonStartup(format!(
                    "{} (pid {}) exited during startup",
                    self.binary.display(),
                    handle.pid
                )));
            }

            if port_accepts(addr, self.poll_interval).await {
                break;
            }

            if Instant::now() >= deadline {
                break;
            }
            sleep(self.poll_interval).await;
        }

        // Final determination: it must be running and listening
        if handle.refresh() == DaemonState::Dead {
            return Err(BootstrapError::DaemonStartup(format!(
                "{} (pid {}) exited during startup",
                self.binary.display(),
                handle.pid
            )));
        }
        if !port_accepts(addr, self.poll_interval).await {
            return Err(BootstrapError::DaemonStartup(format!(
                "{} (pid {}) is not accepting connections on {} after {:?}",
                self.binary.display(),
                handle.pid,
                addr,
                self.health_timeout
            )));
        }

        handle.state = DaemonState::Alive;
        Ok(())
    }
}

impl DaemonLauncher for ProcessLauncher {
    async fn start(&self, proxy: &ProxyConfig) -> Result<DaemonHandle> {
        if !proxy.enabled {
            return Err(BootstrapError::ConfigurationInvalid(
                "refusing to start the redirect daemon for a disabled proxy".to_string(),
            ));
        }
        proxy.validate()?;

        // Something else on our port would make the health check meaningless
        if port_accepts(self.local_addr(), self.poll_interval).await {
            return Err(BootstrapError::DaemonStartup(format!(
                "local redirect port {} is already in use",
                self.local_port
            )));
        }

        write_config(&self.config_path, proxy, self.local_port)?;
        info!("Rendered redirect daemon configuration at {}", self.config_path.display());

        let child = Command::new(&self.binary)
            .arg("-c")
            .arg(&self.config_path)
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| BootstrapError::DaemonStartup(format!(
                "failed to launch {}: {}",
                self.binary.display(),
                e
            )))?;

        let pid = child.id().unwrap_or_default();
        info!("Redirect daemon started with PID {}", pid);

        let mut handle = DaemonHandle::from_child(pid, self.local_port, child);
        if let Err(e) = self.await_healthy(&mut handle).await {
            handle.abort().await;
            return Err(e);
        }

        info!("Redirect daemon is live on port {}", self.local_port);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::net::TcpListener;

    fn proxy() -> ProxyConfig {
        ProxyConfig {
            enabled: true,
            host: "proxy.example".to_string(),
            port: 1080,
            username: "a".to_string(),
            password: "b".to_string(),
        }
    }

    fn launcher(binary: &str, dir: &std::path::Path, local_port: u16) -> ProcessLauncher {
        ProcessLauncher {
            binary: PathBuf::from(binary),
            config_path: dir.join("redsocks.conf"),
            local_port,
            health_timeout: Duration::from_millis(300),
            poll_interval: Duration::from_millis(20),
        }
    }

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_disabled_config_is_rejected() {
        let dir = tempdir().unwrap();
        let launcher = launcher("redsocks", dir.path(), free_port().await);
        let disabled = ProxyConfig { enabled: false, ..proxy() };
        let err = launcher.start(&disabled).await.unwrap_err();
        assert!(matches!(err, BootstrapError::ConfigurationInvalid(_)));
        assert!(!dir.path().join("redsocks.conf").exists());
    }

    #[tokio::test]
    async fn test_missing_binary_is_startup_failure() {
        let dir = tempdir().unwrap();
        let launcher = launcher("/nonexistent/redsocks", dir.path(), free_port().await);
        let err = launcher.start(&proxy()).await.unwrap_err();
        assert!(matches!(err, BootstrapError::DaemonStartup(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exiting_daemon_is_startup_failure() {
        let dir = tempdir().unwrap();
        // `true -c <path>` exits immediately
        let launcher = launcher("true", dir.path(), free_port().await);
        let err = launcher.start(&proxy()).await.unwrap_err();
        assert!(matches!(err, BootstrapError::DaemonStartup(_)));
        assert!(dir.path().join("redsocks.conf").exists());
    }

    #[tokio::test]
    async fn test_occupied_port_is_startup_failure() {
        let dir = tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let launcher = launcher("redsocks", dir.path(), port);
        let err = launcher.start(&proxy()).await.unwrap_err();
        assert!(err.to_string().contains("already in use"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abort_kills_child() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let mut handle = DaemonHandle::for_child(child, 12345);
        assert_eq!(handle.state(), DaemonState::Alive);

        handle.abort().await;
        assert_eq!(handle.state(), DaemonState::Dead);
        let status = handle.child.as_mut().unwrap().try_wait().unwrap();
        assert!(status.is_some());
    }

    #[test]
    fn test_external_handle_is_alive() {
        let mut handle = DaemonHandle::new(42, 12345);
        assert_eq!(handle.pid(), 42);
        assert_eq!(handle.local_port(), 12345);
        assert_eq!(handle.refresh(), DaemonState::Alive);
    }
}

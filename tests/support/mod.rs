//! Test doubles for the store, the redirect daemon and the packet filter

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use tproxy_bootstrap::common::{CommandOutput, CommandRunner, HostResolver};
use tproxy_bootstrap::daemon::{DaemonHandle, DaemonLauncher};
use tproxy_bootstrap::store::{ConnectionTarget, SettingsSource, StoreProbe, StoreRead};
use tproxy_bootstrap::{BootstrapError, ProxyConfig, Result};

pub const PG_URL: &str = "postgresql://pbuser:pbpass@db:5432/pbarr";

/// Proxy rows as stored by the application
pub fn proxy_rows(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Rows of a complete, enabled proxy configuration
pub fn enabled_rows(host: &str) -> HashMap<String, String> {
    proxy_rows(&[
        ("socks5_enabled", "true"),
        ("socks5_host", host),
        ("socks5_port", "1080"),
        ("socks5_user", "u"),
        ("socks5_pass", "p"),
    ])
}

/// Probe that reports ready from the given attempt on, or never
#[derive(Clone)]
pub struct FakeProbe {
    ready_from: Option<u32>,
    pub calls: Rc<Cell<u32>>,
}

impl FakeProbe {
    pub fn ready() -> Self {
        Self::ready_from(1)
    }

    pub fn ready_from(attempt: u32) -> Self {
        Self { ready_from: Some(attempt), calls: Rc::new(Cell::new(0)) }
    }

    pub fn never() -> Self {
        Self { ready_from: None, calls: Rc::new(Cell::new(0)) }
    }
}

impl StoreProbe for FakeProbe {
    async fn probe(&self, _target: &ConnectionTarget, _limit: Duration) -> bool {
        let attempt = self.calls.get() + 1;
        self.calls.set(attempt);
        self.ready_from.is_some_and(|from| attempt >= from)
    }
}

/// Store returning a fixed read outcome
#[derive(Clone)]
pub struct FakeSource {
    read: StoreRead,
    pub calls: Rc<Cell<u32>>,
}

impl FakeSource {
    pub fn rows(rows: HashMap<String, String>) -> Self {
        Self::returning(StoreRead::Rows(rows))
    }

    pub fn returning(read: StoreRead) -> Self {
        Self { read, calls: Rc::new(Cell::new(0)) }
    }
}

impl SettingsSource for FakeSource {
    async fn read_rows(&self, _target: &ConnectionTarget) -> StoreRead {
        self.calls.set(self.calls.get() + 1);
        self.read.clone()
    }
}

/// Launcher that pretends to start the daemon
#[derive(Clone)]
pub struct FakeLauncher {
    fail_with: Option<String>,
    spawn_child: bool,
    local_port: u16,
    pub started: Rc<RefCell<Vec<ProxyConfig>>>,
    /// PIDs of real child processes handed out
    pub pids: Rc<RefCell<Vec<u32>>>,
}

impl FakeLauncher {
    pub fn healthy(local_port: u16) -> Self {
        Self {
            fail_with: None,
            spawn_child: false,
            local_port,
            started: Rc::default(),
            pids: Rc::default(),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self { fail_with: Some(reason.to_string()), ..Self::healthy(12345) }
    }

    /// Hands out a real long-running child in place of the daemon
    pub fn with_child(local_port: u16) -> Self {
        Self { spawn_child: true, ..Self::healthy(local_port) }
    }

    pub fn calls(&self) -> usize {
        self.started.borrow().len()
    }
}

impl DaemonLauncher for FakeLauncher {
    async fn start(&self, proxy: &ProxyConfig) -> Result<DaemonHandle> {
        self.started.borrow_mut().push(proxy.clone());
        if let Some(reason) = &self.fail_with {
            return Err(BootstrapError::DaemonStartup(reason.clone()));
        }
        if self.spawn_child {
            let child = tokio::process::Command::new("sleep").arg("30").spawn()?;
            let handle = DaemonHandle::for_child(child, self.local_port);
            self.pids.borrow_mut().push(handle.pid());
            return Ok(handle);
        }
        Ok(DaemonHandle::new(4242, self.local_port))
    }
}

/// Whether a process with this PID still exists
pub fn process_exists(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Resolver with a fixed answer
#[derive(Clone, Copy)]
pub struct FixedResolver(pub Option<Ipv4Addr>);

impl HostResolver for FixedResolver {
    fn resolve_ipv4(&self, host: &str) -> Option<Ipv4Addr> {
        host.parse().ok().or(self.0)
    }
}

/// In-memory `nat` table understanding `-S -N -F -A -C`
#[derive(Clone)]
pub struct FakeIptables {
    chains: Rc<RefCell<BTreeMap<String, Vec<String>>>>,
    commands: Rc<RefCell<Vec<String>>>,
    fail_on: Option<String>,
}

impl Default for FakeIptables {
    fn default() -> Self {
        let chains = ["PREROUTING", "INPUT", "OUTPUT", "POSTROUTING"]
            .into_iter()
            .map(|c| (c.to_string(), Vec::new()))
            .collect();
        Self { chains: Rc::new(RefCell::new(chains)), commands: Rc::default(), fail_on: None }
    }
}

impl FakeIptables {
    /// Reject the first command whose text contains `needle`
    pub fn failing_on(needle: &str) -> Self {
        Self { fail_on: Some(needle.to_string()), ..Self::default() }
    }

    /// Rule specs of a chain, in order
    pub fn rules(&self, chain: &str) -> Vec<String> {
        self.chains.borrow().get(chain).cloned().unwrap_or_default()
    }

    pub fn has_chain(&self, chain: &str) -> bool {
        self.chains.borrow().contains_key(chain)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    /// Commands that changed the table
    pub fn mutations(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| [" -N ", " -F ", " -A "].iter().any(|op| c.contains(op)))
            .collect()
    }

    /// Full table contents
    pub fn snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.chains.borrow().clone()
    }
}

impl CommandRunner for FakeIptables {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let line = format!("{} {}", program, args.join(" "));
        self.commands.borrow_mut().push(line.clone());

        if let Some(needle) = &self.fail_on {
            if line.contains(needle.as_str()) {
                return Ok(CommandOutput::failed("iptables: Permission denied (you must be root)."));
            }
        }

        if args.len() < 4 || args[0] != "-t" || args[1] != "nat" {
            return Ok(CommandOutput::failed("unsupported table"));
        }
        let (op, chain, spec) = (args[2].as_str(), args[3].clone(), args[4..].join(" "));

        let mut chains = self.chains.borrow_mut();
        let result = match op {
            "-S" => chains.contains_key(&chain),
            "-N" if chains.contains_key(&chain) => false,
            "-N" => chains.insert(chain.clone(), Vec::new()).is_none(),
            "-F" => chains.get_mut(&chain).map(Vec::clear).is_some(),
            "-A" => chains.get_mut(&chain).map(|rules| rules.push(spec)).is_some(),
            "-C" => chains.get(&chain).is_some_and(|rules| rules.contains(&spec)),
            _ => false,
        };

        Ok(if result {
            CommandOutput::ok()
        } else {
            CommandOutput::failed(format!("iptables: {} {} failed", op, chain))
        })
    }
}

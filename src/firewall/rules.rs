//! Redirect rule planning
//!
//! The dedicated chain is evaluated first-match-wins, so rule order carries
//! meaning: every bypass rule precedes the single catch-all redirect.

use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use once_cell::sync::Lazy;

/// Why a destination range bypasses the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassClass {
    /// "This host" and loopback
    Loopback,
    /// 169.254.0.0/16
    LinkLocal,
    /// RFC1918
    Private,
    /// The proxy's own address
    ProxySelf,
}

/// Destination a rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Any,
    Cidr(Ipv4Net),
}

/// What a matching packet is subjected to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Leave the chain untouched (`RETURN`)
    Bypass(BypassClass),
    /// Rewrite the destination to the local daemon port
    RedirectToPort(u16),
}

/// One rule of the dedicated chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectRule {
    pub destination: Destination,
    pub action: RuleAction,
    /// Zero-based position in the chain
    pub position: usize,
}

/// Fixed bypass ranges, in evaluation order
static BYPASS_RANGES: Lazy<Vec<(Ipv4Net, BypassClass)>> = Lazy::new(|| {
    vec![
        (net(Ipv4Addr::new(0, 0, 0, 0), 8), BypassClass::Loopback),
        (net(Ipv4Addr::new(127, 0, 0, 0), 8), BypassClass::Loopback),
        (net(Ipv4Addr::new(169, 254, 0, 0), 16), BypassClass::LinkLocal),
        (net(Ipv4Addr::new(10, 0, 0, 0), 8), BypassClass::Private),
        (net(Ipv4Addr::new(172, 16, 0, 0), 12), BypassClass::Private),
        (net(Ipv4Addr::new(192, 168, 0, 0), 16), BypassClass::Private),
    ]
});

fn net(addr: Ipv4Addr, prefix: u8) -> Ipv4Net {
    // Prefixes above are all <= 32
    Ipv4Net::new(addr, prefix).unwrap_or_else(|_| Ipv4Net::from(addr))
}

/// Loopback range excluded from the OUTPUT hook
pub fn loopback_net() -> Ipv4Net {
    BYPASS_RANGES[1].0
}

/// Plan the ordered rule set for the dedicated chain
///
/// `proxy_ip` is the resolved proxy address; when `None`, no self-exclusion
/// rule can be installed.
pub fn plan_rules(proxy_ip: Option<Ipv4Addr>, redirect_port: u16) -> Vec<RedirectRule> {
    let bypasses = BYPASS_RANGES
        .iter()
        .map(|(range, class)| (Destination::Cidr(*range), RuleAction::Bypass(*class)));

    let self_exclusion = proxy_ip.map(|ip| {
        (Destination::Cidr(Ipv4Net::from(ip)), RuleAction::Bypass(BypassClass::ProxySelf))
    });

    let redirect = (Destination::Any, RuleAction::RedirectToPort(redirect_port));

    bypasses
        .chain(self_exclusion)
        .chain(std::iter::once(redirect))
        .enumerate()
        .map(|(position, (destination, action))| RedirectRule { destination, action, position })
        .collect()
}

impl RedirectRule {
    /// `iptables` rule specification, without the `-A <chain>` prefix
    pub fn to_rule_spec(&self) -> Vec<String> {
        let mut spec = Vec::new();
        if let Destination::Cidr(range) = self.destination {
            spec.push("-d".to_string());
            spec.push(range.to_string());
        }
        match self.action {
            RuleAction::Bypass(_) => {
                spec.push("-j".to_string());
                spec.push("RETURN".to_string());
            }
            RuleAction::RedirectToPort(port) => {
                spec.extend(["-p", "tcp", "-j", "REDIRECT", "--to-ports"].map(String::from));
                spec.push(port.to_string());
            }
        }
        spec
    }

    pub fn is_bypass(&self) -> bool {
        matches!(self.action, RuleAction::Bypass(_))
    }
}

impl fmt::Display for RedirectRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let destination = match self.destination {
            Destination::Any => "any".to_string(),
            Destination::Cidr(range) => range.to_string(),
        };
        match self.action {
            RuleAction::Bypass(class) => write!(f, "#{} bypass {} ({:?})", self.position, destination, class),
            RuleAction::RedirectToPort(port) => {
                write!(f, "#{} redirect {} tcp -> :{}", self.position, destination, port)
            }
        }
    }
}

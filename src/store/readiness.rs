//! Readiness gate
//!
//! Blocks startup until the configuration store accepts connections. The gate
//! polls at a fixed interval and gives up after a fixed number of attempts, so
//! the total wait is bounded by `attempts × interval`.

use std::future::Future;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::time::{sleep, timeout};

use crate::common::port_accepts;
use super::target::ConnectionTarget;

/// Lightweight liveness probe against the store
pub trait StoreProbe {
    /// Whether the store accepts connections right now
    ///
    /// `limit` bounds how long a single probe may take.
    fn probe(&self, target: &ConnectionTarget, limit: Duration) -> impl Future<Output = bool>;
}

/// Probe that checks the store's TCP port accepts connections
///
/// Like `pg_isready`, it needs no credentials.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

impl StoreProbe for TcpProbe {
    async fn probe(&self, target: &ConnectionTarget, limit: Duration) -> bool {
        let address = target.address();

        // One deadline covers resolution and every connect attempt
        let attempt = async {
            let addrs = match tokio::net::lookup_host(address.as_str()).await {
                Ok(addrs) => addrs.collect::<Vec<_>>(),
                Err(e) => {
                    debug!("Cannot resolve store address {}: {}", address, e);
                    return false;
                }
            };

            for addr in addrs {
                if port_accepts(addr, limit).await {
                    return true;
                }
            }
            false
        };

        timeout(limit, attempt).await.unwrap_or(false)
    }
}

/// Bounded retry policy for the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Probes before giving up (at least one is always made)
    pub max_attempts: u32,
    /// Fixed spacing between probe starts
    pub interval: Duration,
}

impl ReadinessPolicy {
    /// Longest time the gate can block
    pub fn upper_bound(&self) -> Duration {
        self.interval * self.max_attempts.max(1)
    }
}

/// Result of waiting for the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The store accepted a connection after `attempts` probes
    Ready { attempts: u32 },
    /// No probe succeeded within the policy
    TimedOut { attempts: u32 },
}

/// Wait until the store is ready or the policy is exhausted
pub async fn wait_until_ready<P: StoreProbe>(
    probe: &P,
    target: &ConnectionTarget,
    policy: ReadinessPolicy,
) -> Readiness {
    let attempts = policy.max_attempts.max(1);
    info!("Waiting for configuration store at {} (up to {} attempts)", target.address(), attempts);

    for attempt in 1..=attempts {
        let started = Instant::now();

        // A probe ignoring its limit still cannot stretch the schedule
        let ready = timeout(policy.interval, probe.probe(target, policy.interval))
            .await
            .unwrap_or(false);
        if ready {
            info!("Configuration store is ready (attempt {})", attempt);
            return Readiness::Ready { attempts: attempt };
        }

        debug!("Store not ready yet (attempt {}/{})", attempt, attempts);

        if attempt < attempts {
            // Keep probe starts on a fixed schedule
            let spent = started.elapsed();
            if spent < policy.interval {
                sleep(policy.interval - spent).await;
            }
        }
    }

    warn!(
        "Configuration store at {} not ready after {} attempts",
        target.address(),
        attempts
    );
    Readiness::TimedOut { attempts }
}

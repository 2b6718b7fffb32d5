// SPDX-License-Identifier: Apache-2.0

//! `Advertiser`: the periodic health-evaluation / announce-withdraw
//! dispatcher, and the `HealthyPrefixSet` it publishes for the `Learner`'s
//! peer-up reconciliation.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::address::NextHopSelector;
use crate::channel::MessageChannel;
use crate::health::HealthChecker;
use crate::prefix::IPPrefix;

/// Write-line deadline for announce/withdraw commands (spec §5).
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// One locally-originated prefix and the conjunctive set of checkers that
/// gate its advertisement.
pub struct AdvertisePrefix {
    pub prefix: IPPrefix,
    pub checkers: Vec<Box<dyn HealthChecker>>,
}

impl AdvertisePrefix {
    pub fn new(prefix: IPPrefix, checkers: Vec<Box<dyn HealthChecker>>) -> Self {
        Self { prefix, checkers }
    }

    /// `true` iff every checker returns `true`; vacuously `true` for a
    /// prefix with no checkers configured.
    async fn is_healthy(&self) -> bool {
        join_all(self.checkers.iter().map(|c| c.check()))
            .await
            .into_iter()
            .all(|ok| ok)
    }
}

/// The write half of the last-successful-cycle prefix set: only the
/// `Advertiser` holds this.
pub struct HealthyPrefixSet {
    tx: watch::Sender<BTreeSet<IPPrefix>>,
}

impl HealthyPrefixSet {
    fn new() -> (Self, HealthyPrefixSetReader) {
        let (tx, rx) = watch::channel(BTreeSet::new());
        (Self { tx }, HealthyPrefixSetReader(rx))
    }

    fn set(&self, prefixes: BTreeSet<IPPrefix>) {
        // Only fails if every receiver has been dropped, which is fine:
        // nothing is listening for peer-up reconciliation anymore.
        let _ = self.tx.send(prefixes);
    }
}

/// Read-only handle to the `HealthyPrefixSet`, held by the `Learner`.
#[derive(Clone)]
pub struct HealthyPrefixSetReader(watch::Receiver<BTreeSet<IPPrefix>>);

impl HealthyPrefixSetReader {
    pub fn snapshot(&self) -> BTreeSet<IPPrefix> {
        self.0.borrow().clone()
    }

    /// A reader with no paired `Advertiser`, for tests that only need to
    /// control what the Learner sees as the healthy set.
    #[cfg(test)]
    pub(crate) fn test_with(prefixes: BTreeSet<IPPrefix>) -> Self {
        let (_tx, rx) = watch::channel(prefixes);
        Self(rx)
    }
}

pub struct Advertiser {
    prefixes: Vec<AdvertisePrefix>,
    next_hop: NextHopSelector,
    interval: Duration,
    withdraw_on_exit: bool,
    channel: MessageChannel,
    healthy: HealthyPrefixSet,
}

impl Advertiser {
    pub fn new(
        prefixes: Vec<AdvertisePrefix>,
        next_hop: NextHopSelector,
        interval: Duration,
        withdraw_on_exit: bool,
        channel: MessageChannel,
    ) -> (Self, HealthyPrefixSetReader) {
        let (healthy, reader) = HealthyPrefixSet::new();
        (
            Self {
                prefixes,
                next_hop,
                interval,
                withdraw_on_exit,
                channel,
                healthy,
            },
            reader,
        )
    }

    /// Configured prefixes this advertiser manages, exposed so the Learner
    /// can build the internal-network filter.
    pub fn prefixes(&self) -> impl Iterator<Item = &IPPrefix> {
        self.prefixes.iter().map(|p| &p.prefix)
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let start = Instant::now();
            self.run_cycle().await;
            let elapsed = start.elapsed();
            let remaining = self.interval.saturating_sub(elapsed);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        if self.withdraw_on_exit {
            info!("withdrawing all advertised prefixes on exit");
            self.withdraw_all().await;
        }
    }

    async fn run_cycle(&mut self) {
        let mut advertise = BTreeSet::new();
        let mut withdraw = BTreeSet::new();

        let evaluations = join_all(self.prefixes.iter().map(|p| async move {
            let healthy = p.is_healthy().await;
            (p.prefix, healthy)
        }))
        .await;

        for (prefix, healthy) in evaluations {
            if healthy {
                advertise.insert(prefix);
            } else {
                withdraw.insert(prefix);
            }
        }

        let mut all_announced = true;
        for prefix in &advertise {
            let line = format!("announce route {prefix} next-hop {}", self.next_hop);
            if let Err(e) = self.channel.write_line(&line, WRITE_TIMEOUT).await {
                error!(%prefix, error = %e, "failed to announce, marking cycle unhealthy");
                all_announced = false;
            }
        }

        if all_announced {
            self.healthy.set(advertise);
        } else {
            // Fail-safe: a partial announce leaves the speaker's session in
            // an unknown state, so nothing is considered healthy.
            self.healthy.set(BTreeSet::new());
        }

        for prefix in &withdraw {
            let line = format!("withdraw route {prefix} next-hop {}", self.next_hop);
            if let Err(e) = self.channel.write_line(&line, WRITE_TIMEOUT).await {
                warn!(%prefix, error = %e, "failed to withdraw");
            }
        }
    }

    async fn withdraw_all(&self) {
        for prefix in self.prefixes() {
            let line = format!("withdraw route {prefix} next-hop {}", self.next_hop);
            if let Err(e) = self.channel.write_line(&line, WRITE_TIMEOUT).await {
                warn!(%prefix, error = %e, "failed to withdraw on exit");
            }
        }
    }
}

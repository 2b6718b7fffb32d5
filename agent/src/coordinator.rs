// SPDX-License-Identifier: Apache-2.0

//! `Coordinator`: process lifecycle. Launches the Advertiser and the
//! optional Learner, and tears both down — plus the FIBConsumer — in the
//! order the shutdown sequence requires.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::advertiser::Advertiser;
use crate::consumer::FIBConsumer;
use crate::learner::Learner;

pub struct Coordinator {
    cancel: CancellationToken,
    advertiser_handle: JoinHandle<()>,
    learner_handle: Option<JoinHandle<()>>,
    consumer_handle: JoinHandle<()>,
}

impl Coordinator {
    /// Spawns the Advertiser, the optional Learner, and the FIBConsumer as
    /// independent tasks sharing one cancellation token.
    pub fn spawn(advertiser: Advertiser, learner: Option<Learner>, consumer: FIBConsumer) -> Self {
        let cancel = CancellationToken::new();

        let consumer_handle = tokio::spawn(consumer.run(cancel.clone()));
        let advertiser_handle = tokio::spawn(advertiser.run(cancel.clone()));
        let learner_handle = learner.map(|l| tokio::spawn(l.run(cancel.clone())));

        Self {
            cancel,
            advertiser_handle,
            learner_handle,
            consumer_handle,
        }
    }

    /// A clone of the shared token; wire this to a signal handler (SIGINT,
    /// ctrl-c) to trigger shutdown from outside.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for cancellation (from any clone of the token), then tears
    /// down in the spec-mandated order: Advertiser's optional
    /// withdraw-on-exit completes before the Learner and FIBConsumer are
    /// allowed to finish draining.
    pub async fn run_until_cancelled(self) {
        self.cancel.cancelled().await;
        self.shutdown().await;
    }

    async fn shutdown(self) {
        info!("coordinator shutting down");

        if let Err(e) = self.advertiser_handle.await {
            error!(error = %e, "advertiser task panicked");
        }

        if let Some(handle) = self.learner_handle {
            if let Err(e) = handle.await {
                error!(error = %e, "learner task panicked");
            }
        }

        if let Err(e) = self.consumer_handle.await {
            error!(error = %e, "fib consumer task panicked");
        }

        info!("coordinator shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::address::NextHopSelector;
    use crate::advertiser::AdvertisePrefix;
    use crate::channel::MessageChannel;
    use crate::fib::Fib;
    use crate::health::HealthChecker;
    use crate::parser::MessageParser;
    use crate::prefix::IPPrefix;

    struct AlwaysHealthy;

    #[async_trait]
    impl HealthChecker for AlwaysHealthy {
        async fn check(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn shuts_down_promptly_after_cancellation() {
        let (advertise_channel, _advertise_side) = MessageChannel::test_pair();
        let prefixes = vec![AdvertisePrefix::new(
            IPPrefix::parse("69::/32").unwrap(),
            vec![Box::new(AlwaysHealthy)],
        )];
        let (advertiser, healthy_reader) = Advertiser::new(
            prefixes,
            NextHopSelector::SelfAddress,
            Duration::from_secs(3600),
            false,
            advertise_channel,
        );

        let (learn_channel, _learn_side) = MessageChannel::test_pair();
        let (consumer, sender) = FIBConsumer::new(Vec::<Box<dyn Fib>>::new(), false);
        let learner = Learner::new(
            learn_channel,
            MessageParser::default(),
            healthy_reader,
            vec![IPPrefix::parse("69::/32").unwrap()],
            false,
            Duration::from_millis(50),
            sender,
        );

        let coordinator = Coordinator::spawn(advertiser, Some(learner), consumer);
        let token = coordinator.cancellation_token();
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), coordinator.run_until_cancelled())
            .await
            .expect("coordinator did not shut down promptly");
    }
}

// SPDX-License-Identifier: Apache-2.0

//! `Learner`: reads the speaker's message stream, parses it into intents,
//! applies the internal-network filter, and enqueues the result for the
//! `FIBConsumer`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::advertiser::HealthyPrefixSetReader;
use crate::channel::{ChannelError, MessageChannel};
use crate::consumer::IntentSender;
use crate::fib::{FibIntent, FibOperation};
use crate::parser::MessageParser;
use crate::prefix::IPPrefix;

/// Acknowledgement line the speaker sends that carries no intents.
const DONE_LINE: &str = "done";

pub struct Learner {
    channel: MessageChannel,
    parser: MessageParser,
    healthy: HealthyPrefixSetReader,
    local_prefixes: Vec<IPPrefix>,
    allow_default: bool,
    read_timeout: Duration,
    sender: IntentSender,
}

impl Learner {
    pub fn new(
        channel: MessageChannel,
        parser: MessageParser,
        healthy: HealthyPrefixSetReader,
        local_prefixes: Vec<IPPrefix>,
        allow_default: bool,
        read_timeout: Duration,
        sender: IntentSender,
    ) -> Self {
        Self {
            channel,
            parser,
            healthy,
            local_prefixes,
            allow_default,
            read_timeout,
            sender,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("learner cancelled");
                    return;
                }
                line = self.channel.read_line(self.read_timeout) => line,
            };

            match line {
                Ok(text) if text == DONE_LINE => continue,
                Ok(text) => self.handle_line(&text).await,
                Err(ChannelError::Timeout) => continue,
                Err(ChannelError::ChannelClosed) => {
                    info!("speaker channel closed");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "error reading from speaker channel");
                }
            }
        }
    }

    async fn handle_line(&self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "dropping line that is not valid JSON");
                return;
            }
        };

        let healthy = self.healthy.snapshot();
        let intents = match self.parser.parse(&value, Some(&healthy)) {
            Ok(intents) => intents,
            Err(e) => {
                error!(error = %e, "message parser rejected message");
                return;
            }
        };

        let filtered = self.filter_and_sort(intents);
        if filtered.is_empty() {
            return;
        }

        debug!(count = filtered.len(), "enqueuing fib intent batch");
        if self.sender.send(filtered).is_err() {
            error!("fib consumer is gone, dropping intent batch");
        }
    }

    /// spec §4.5: drop any learnt intent whose prefix equals or is a subnet
    /// of a locally-advertised prefix, unless it is the default route and
    /// `allow_default` is set. `RemoveAllRoutes` bypasses the filter
    /// entirely. Output is sorted IPv4-then-IPv6.
    fn filter_and_sort(&self, intents: Vec<FibIntent>) -> Vec<FibIntent> {
        let mut kept: Vec<FibIntent> = intents
            .into_iter()
            .filter(|intent| {
                if intent.operation == FibOperation::RemoveAllRoutes {
                    return true;
                }
                if intent.prefix.is_default() && self.allow_default {
                    return true;
                }
                !self
                    .local_prefixes
                    .iter()
                    .any(|local| local.overlaps(&intent.prefix))
            })
            .collect();

        kept.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        kept
    }
}

// SPDX-License-Identifier: Apache-2.0

//! `FIBConsumer`: the single drain point for learnt-route intent batches.
//! Every intent in a batch is applied concurrently, fanned out to every
//! configured FIB backend; the `LearntRouteMirror` is mutated only after
//! the whole batch succeeds, so a partial failure leaves the mirror
//! untouched (spec §5 ordering guarantees).

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::fib::{Fib, FibIntent, FibOperation};
use crate::mirror::LearntRouteMirror;

/// Handle held by the `Learner` to push a parsed intent batch onto the
/// consumer's unbounded queue. Cloning shares the same queue.
#[derive(Clone)]
pub struct IntentSender(mpsc::UnboundedSender<Vec<FibIntent>>);

impl IntentSender {
    /// Fails only if the consumer has already shut down.
    pub fn send(&self, batch: Vec<FibIntent>) -> Result<(), Vec<FibIntent>> {
        self.0.send(batch).map_err(|e| e.0)
    }
}

pub struct FIBConsumer {
    fibs: Vec<Box<dyn Fib>>,
    dry_run: bool,
    mirror: LearntRouteMirror,
    queue: mpsc::UnboundedReceiver<Vec<FibIntent>>,
}

impl FIBConsumer {
    pub fn new(fibs: Vec<Box<dyn Fib>>, dry_run: bool) -> (Self, IntentSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                fibs,
                dry_run,
                mirror: LearntRouteMirror::new(),
                queue: rx,
            },
            IntentSender(tx),
        )
    }

    /// Exposed for a Coordinator-owned diagnostic snapshot only; no other
    /// component may hold a reference into the mirror while the consumer
    /// is running.
    pub fn mirror(&self) -> &LearntRouteMirror {
        &self.mirror
    }

    /// Drains the queue until it closes (every `IntentSender` dropped) or
    /// `cancel` fires. Batches are independent of one another, but within
    /// one batch every intent runs concurrently and the mirror is only
    /// mutated once the whole batch has succeeded (spec §5).
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("fib consumer cancelled");
                    return;
                }
                batch = self.queue.recv() => batch,
            };

            let Some(batch) = batch else {
                info!("fib consumer queue closed");
                return;
            };

            self.apply_batch(batch).await;
        }
    }

    async fn apply_batch(&mut self, batch: Vec<FibIntent>) {
        if self.dry_run {
            info!(count = batch.len(), "dry run: skipping fib application");
            return;
        }

        let outcomes = join_all(batch.iter().map(|intent| self.run_fib_ops(intent))).await;
        let batch_len = batch.len();

        if outcomes.iter().all(|ok| *ok) {
            for intent in batch {
                self.commit(intent);
            }
            debug!(count = batch_len, "mirror updated for batch");
        } else {
            warn!(
                count = batch_len,
                "fib batch had a failing intent, leaving mirror unchanged"
            );
        }
    }

    /// Fans `intent` out to every configured FIB backend concurrently and
    /// reports whether every backend reported success. Never mutates the
    /// mirror — that only happens once the whole enclosing batch is known
    /// to have succeeded.
    async fn run_fib_ops(&self, intent: &FibIntent) -> bool {
        let results = match intent.operation {
            FibOperation::Nothing => return true,
            FibOperation::AddRoute => {
                let Some(next_hop) = intent.next_hop else {
                    error!(prefix = %intent.prefix, "AddRoute with null next-hop, skipping");
                    return false;
                };
                join_all(
                    self.fibs
                        .iter()
                        .map(|fib| fib.add_route(intent.prefix, next_hop)),
                )
                .await
            }
            FibOperation::RemoveRoute => {
                let Some(next_hop) = intent.next_hop else {
                    error!(prefix = %intent.prefix, "RemoveRoute with null next-hop, skipping");
                    return false;
                };
                join_all(
                    self.fibs
                        .iter()
                        .map(|fib| fib.del_route(intent.prefix, next_hop)),
                )
                .await
            }
            FibOperation::RemoveAllRoutes => {
                join_all(self.fibs.iter().map(|fib| fib.del_all_routes(intent.next_hop))).await
            }
        };

        let mut all_succeeded = true;
        for result in &results {
            match result {
                Ok(true) => {}
                Ok(false) => {
                    all_succeeded = false;
                    warn!(?intent, "fib operation returned false");
                }
                Err(e) => {
                    all_succeeded = false;
                    error!(?intent, error = %e, "fib operation failed");
                }
            }
        }
        all_succeeded
    }

    /// Applies `intent`'s effect to the mirror. Only ever called for
    /// intents whose FIB operations already succeeded.
    fn commit(&mut self, intent: FibIntent) {
        match intent.operation {
            FibOperation::AddRoute => {
                // next_hop validated Some in run_fib_ops.
                self.mirror.add(intent.prefix, intent.next_hop.unwrap());
            }
            FibOperation::RemoveRoute => {
                self.mirror.remove(intent.prefix, intent.next_hop.unwrap());
            }
            FibOperation::RemoveAllRoutes => {
                self.mirror.clear();
            }
            FibOperation::Nothing => {}
        }
    }
}

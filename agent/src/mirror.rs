// SPDX-License-Identifier: Apache-2.0

//! `LearntRouteMirror`: the FIBConsumer's private record of what it has
//! successfully installed from the learnt-route stream.

use std::collections::{BTreeMap, BTreeSet};

use crate::address::IPAddress;
use crate::prefix::IPPrefix;

/// Maps `prefix -> {next_hop}`. Mutated only after a batch of FIB
/// operations succeeds; never read outside the `FIBConsumer` that owns it
/// (spec §5: "no outside reader is permitted to avoid torn views").
#[derive(Default, Debug)]
pub struct LearntRouteMirror {
    routes: BTreeMap<IPPrefix, BTreeSet<IPAddress>>,
}

impl LearntRouteMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `next_hop` under `prefix`, creating the set if absent.
    pub fn add(&mut self, prefix: IPPrefix, next_hop: IPAddress) {
        self.routes.entry(prefix).or_default().insert(next_hop);
    }

    /// Removes `next_hop` from `prefix`'s set, dropping the key entirely if
    /// the set becomes empty.
    pub fn remove(&mut self, prefix: IPPrefix, next_hop: IPAddress) {
        if let Some(next_hops) = self.routes.get_mut(&prefix) {
            next_hops.remove(&next_hop);
            if next_hops.is_empty() {
                self.routes.remove(&prefix);
            }
        }
    }

    /// Empties the mirror. Snapshots no state beyond `clear`'s own
    /// implementation — callers iterating `prefixes()` beforehand must copy
    /// what they need, since this drops every key at once.
    pub fn clear(&mut self) {
        self.routes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn next_hops(&self, prefix: &IPPrefix) -> Option<&BTreeSet<IPAddress>> {
        self.routes.get(prefix)
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &IPPrefix> {
        self.routes.keys()
    }

    #[cfg(test)]
    fn contains(&self, prefix: &IPPrefix, next_hop: &IPAddress) -> bool {
        self.routes
            .get(prefix)
            .is_some_and(|set| set.contains(next_hop))
    }
}

// SPDX-License-Identifier: Apache-2.0

//! `FibIntent`: the unit of work produced by the message parser and
//! consumed by the `FIBConsumer`.

use crate::address::IPAddress;
use crate::prefix::IPPrefix;

/// The operation half of a `FibIntent`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FibOperation {
    Nothing,
    AddRoute,
    RemoveRoute,
    RemoveAllRoutes,
}

/// An immutable instruction to install or remove a route from the
/// configured FIB backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FibIntent {
    pub prefix: IPPrefix,
    pub next_hop: Option<IPAddress>,
    pub operation: FibOperation,
}

impl FibIntent {
    pub fn add_route(prefix: IPPrefix, next_hop: IPAddress) -> Self {
        Self {
            prefix,
            next_hop: Some(next_hop),
            operation: FibOperation::AddRoute,
        }
    }

    pub fn remove_route(prefix: IPPrefix, next_hop: IPAddress) -> Self {
        Self {
            prefix,
            next_hop: Some(next_hop),
            operation: FibOperation::RemoveRoute,
        }
    }

    /// `next_hop = None` means "all mirror-tracked routes regardless of
    /// next-hop". `prefix` is an unread placeholder (`::/0`): the consumer
    /// never inspects it for this variant, and no wire message to the
    /// speaker depends on it.
    pub fn remove_all_routes(next_hop: Option<IPAddress>) -> Self {
        Self {
            prefix: IPPrefix::root_v6(),
            next_hop,
            operation: FibOperation::RemoveAllRoutes,
        }
    }
}

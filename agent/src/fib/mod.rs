// SPDX-License-Identifier: Apache-2.0

//! `FIB`: the capability trait implemented by each forwarding-table
//! backend, and its concrete `LinuxFIB` implementation.

pub mod intent;
pub mod linux;

pub use intent::{FibIntent, FibOperation};
pub use linux::LinuxFIB;

use async_trait::async_trait;
use thiserror::Error;

use crate::address::IPAddress;
use crate::prefix::IPPrefix;
use crate::process::ProcessError;

#[derive(Error, Debug)]
pub enum FibError {
    #[error("unknown FIB backend '{0}'")]
    UnknownBackend(String),

    #[error("prefix_limit is set but backend '{0}' does not support checking it")]
    PrefixLimitUnsupported(String),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Per-backend policy knobs, set from `learn.*` configuration keys.
#[derive(Clone, Copy, Debug)]
pub struct FibPolicy {
    pub allow_default: bool,
    pub allow_ll_nexthop: bool,
    pub prefix_limit: u32,
    pub use_sudo: bool,
}

impl Default for FibPolicy {
    fn default() -> Self {
        Self {
            allow_default: false,
            allow_ll_nexthop: false,
            prefix_limit: 0,
            use_sudo: true,
        }
    }
}

/// Capability interface implemented by every forwarding-table backend.
///
/// `add_route`/`del_route` operate on one `(prefix, next_hop)` adjacency;
/// `del_all_routes` enumerates and removes every route the agent itself
/// installed (identified by its distinguishing metric), optionally scoped
/// to one next-hop.
#[async_trait]
pub trait Fib: Send + Sync {
    /// A human-readable name matching the `learn.fibs` configuration entry
    /// (e.g. `"Linux"`).
    fn name(&self) -> &str;

    async fn add_route(&self, prefix: IPPrefix, next_hop: IPAddress) -> Result<bool, FibError>;

    async fn del_route(&self, prefix: IPPrefix, next_hop: IPAddress) -> Result<bool, FibError>;

    async fn del_all_routes(&self, next_hop: Option<IPAddress>) -> Result<bool, FibError>;

    async fn check_for_route(&self, prefix: IPPrefix, next_hop: IPAddress)
    -> Result<bool, FibError>;

    /// `0` means unlimited. A backend that cannot honor a nonzero limit
    /// must fail construction rather than silently ignore it (spec §4.6,
    /// §7 — prefix_limit set with no backend support is a fatal
    /// configuration error).
    fn check_prefix_limit(&self) -> u32;
}

/// Build the named FIB backend, or fail with a configuration error if the
/// name is unknown.
pub fn build_fib(name: &str, policy: FibPolicy) -> Result<Box<dyn Fib>, FibError> {
    match name {
        "Linux" => Ok(Box::new(LinuxFIB::new(policy))),
        other => Err(FibError::UnknownBackend(other.to_string())),
    }
}

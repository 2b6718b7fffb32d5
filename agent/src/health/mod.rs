// SPDX-License-Identifier: Apache-2.0

//! `HealthChecker`: the capability trait polled once per advertise cycle,
//! and its `PingChecker` implementation.

pub mod ping;

pub use ping::PingChecker;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HealthCheckerError {
    #[error("unknown health checker class '{0}'")]
    UnknownClass(String),

    #[error("invalid configuration for checker class '{class}': {reason}")]
    InvalidConfig { class: String, reason: String },
}

/// Produces a boolean reachability verdict for a target. Implementations
/// must never propagate a runtime error out of `check` — any failure to
/// run the underlying probe is itself evidence of unhealthiness and must
/// be folded into `false`.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check(&self) -> bool;
}

/// Build the named checker from its class and keyword arguments, or fail
/// with a configuration error if the class is unrecognized.
pub fn build_checker(
    class: &str,
    kwargs: &serde_json::Value,
) -> Result<Box<dyn HealthChecker>, HealthCheckerError> {
    match class {
        "PingChecker" => Ok(Box::new(PingChecker::from_kwargs(kwargs)?)),
        other => Err(HealthCheckerError::UnknownClass(other.to_string())),
    }
}

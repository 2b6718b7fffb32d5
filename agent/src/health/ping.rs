// SPDX-License-Identifier: Apache-2.0

//! `PingChecker`: spawns the platform's ICMP/ICMPv6 ping utility and
//! interprets its exit status as a reachability verdict.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{HealthChecker, HealthCheckerError};
use crate::address::IPAddress;
use crate::process::ProcessRunner;

const DEFAULT_COUNT: u32 = 2;
const DEFAULT_TIMEOUT_S: u64 = 5;

fn ping_binary(target: &IPAddress) -> &'static str {
    if target.is_ipv6() {
        "ping6"
    } else {
        "ping"
    }
}

#[derive(Clone, Debug)]
pub struct PingChecker {
    target: IPAddress,
    count: u32,
    timeout_s: u64,
    /// Omitted on Darwin, where the platform ping has no `-w` deadline flag.
    wait_s: Option<u64>,
}

impl PingChecker {
    pub fn new(target: IPAddress, count: u32, timeout_s: u64, wait_s: Option<u64>) -> Self {
        Self {
            target,
            count,
            timeout_s,
            wait_s,
        }
    }

    pub fn from_kwargs(kwargs: &serde_json::Value) -> Result<Self, HealthCheckerError> {
        let invalid = |reason: String| HealthCheckerError::InvalidConfig {
            class: "PingChecker".to_string(),
            reason,
        };

        let target_str = kwargs
            .get("target")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid("missing 'target'".to_string()))?;
        let target = IPAddress::parse(target_str)
            .map_err(|e| invalid(format!("invalid 'target': {e}")))?;

        let count = kwargs
            .get("count")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(DEFAULT_COUNT);

        let timeout_s = kwargs
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_S);

        let wait_s = if cfg!(target_os = "macos") {
            None
        } else {
            Some(
                kwargs
                    .get("wait")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(timeout_s.saturating_sub(1)),
            )
        };

        Ok(Self::new(target, count, timeout_s, wait_s))
    }
}

#[async_trait]
impl HealthChecker for PingChecker {
    async fn check(&self) -> bool {
        let binary = ping_binary(&self.target);
        let mut args = vec!["-c".to_string(), self.count.to_string()];
        if let Some(wait) = self.wait_s {
            args.push("-w".to_string());
            args.push(wait.to_string());
        }
        args.push(self.target.to_string());

        match ProcessRunner::run(binary, &args, None, Duration::from_secs(self.timeout_s)).await {
            Ok(outcome) => {
                let healthy = outcome.succeeded();
                debug!(target = %self.target, healthy, "ping health check completed");
                healthy
            }
            Err(e) => {
                warn!(target = %self.target, error = %e, "ping health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let kwargs = serde_json::json!({ "target": "127.0.0.1" });
        let checker = PingChecker::from_kwargs(&kwargs).unwrap();
        assert_eq!(checker.count, DEFAULT_COUNT);
        assert_eq!(checker.timeout_s, DEFAULT_TIMEOUT_S);
        if cfg!(target_os = "macos") {
            assert_eq!(checker.wait_s, None);
        } else {
            assert_eq!(checker.wait_s, Some(DEFAULT_TIMEOUT_S - 1));
        }
    }

    #[test]
    fn missing_target_is_invalid_config() {
        let kwargs = serde_json::json!({});
        assert!(PingChecker::from_kwargs(&kwargs).is_err());
    }

    #[tokio::test]
    async fn check_is_true_for_loopback() {
        let checker = PingChecker::new(IPAddress::parse("127.0.0.1").unwrap(), 1, 5, Some(4));
        // Exercises the real `ping` binary; loopback is reachable in every
        // sandbox this test runs in.
        assert!(checker.check().await);
    }

    #[tokio::test]
    async fn check_is_false_on_timeout() {
        // A count of 1 against an address with no route and a near-zero
        // timeout should never observably succeed.
        let checker = PingChecker::new(IPAddress::parse("192.0.2.1").unwrap(), 1, 0, Some(0));
        assert!(!checker.check().await);
    }
}

// SPDX-License-Identifier: Apache-2.0

//! `LinuxFIB`: drives the Linux kernel routing table through `/sbin/ip`
//! (`/usr/local/bin/ip` on Darwin), optionally under `sudo`.
//!
//! Every route the agent installs carries the distinguishing metric
//! `31337`; `del_all_routes` and `check_for_route` recognize the agent's
//! own routes by that metric rather than by tracking installed routes
//! itself, so a restart can still recognize and clean up its own state.

use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;

use super::{Fib, FibError, FibPolicy};
use crate::address::IPAddress;
use crate::prefix::IPPrefix;
use crate::process::ProcessRunner;

/// The metric tag the agent stamps onto every route it installs.
pub const AGENT_METRIC: u32 = 31337;

const IP_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

#[cfg(target_os = "macos")]
const IP_BINARY: &str = "/usr/local/bin/ip";
#[cfg(not(target_os = "macos"))]
const IP_BINARY: &str = "/sbin/ip";

pub struct LinuxFIB {
    policy: FibPolicy,
}

impl LinuxFIB {
    pub fn new(policy: FibPolicy) -> Self {
        Self { policy }
    }

    /// Build the token list for `ip route {add,delete} …`, exactly per the
    /// command table: `[sudo] ip {-4|-6} route {add|delete} {default|prefix}
    /// via [inet6] <next-hop> metric 31337`.
    fn gen_route_command(
        &self,
        verb: &str,
        prefix: IPPrefix,
        next_hop: IPAddress,
    ) -> Vec<String> {
        let mut tokens = Vec::new();
        if self.policy.use_sudo {
            tokens.push("sudo".to_string());
        }
        tokens.push("ip".to_string());
        tokens.push(if prefix.is_ipv4() { "-4" } else { "-6" }.to_string());
        tokens.push("route".to_string());
        tokens.push(verb.to_string());
        tokens.push(if prefix.is_default() {
            "default".to_string()
        } else {
            prefix.to_string()
        });
        tokens.push("via".to_string());
        if prefix.is_ipv4() && next_hop.is_ipv6() {
            tokens.push("inet6".to_string());
        }
        tokens.push(next_hop.to_string());
        tokens.push("metric".to_string());
        tokens.push(AGENT_METRIC.to_string());
        tokens
    }

    /// `tokens` is the conceptual command as spec'd (literal `"ip"`, no
    /// absolute path). Substitutes the real `ip` binary path before
    /// spawning; the leading `"sudo"` token, if present, becomes the
    /// program itself.
    async fn run_ip(&self, tokens: Vec<String>) -> Result<bool, FibError> {
        let resolved: Vec<String> = tokens
            .into_iter()
            .map(|t| if t == "ip" { IP_BINARY.to_string() } else { t })
            .collect();
        let (program, args) = resolved
            .split_first()
            .expect("gen_route_command always yields at least the 'ip' token");
        let outcome = ProcessRunner::run(program, args, None, IP_COMMAND_TIMEOUT).await?;
        Ok(outcome.succeeded())
    }

    async fn show_route_table(&self, version: IpVersion) -> Result<String, FibError> {
        let flag = match version {
            IpVersion::V4 => "-4",
            IpVersion::V6 => "-6",
        };
        let args = vec![flag.to_string(), "route".to_string(), "show".to_string()];
        let outcome = ProcessRunner::run(IP_BINARY, &args, None, IP_COMMAND_TIMEOUT).await?;
        Ok(outcome.stdout_str().into_owned())
    }
}

#[derive(Clone, Copy)]
enum IpVersion {
    V4,
    V6,
}

/// Strip a leading `"inet6 "` token (present when the captured next-hop of
/// a v4 prefix is itself a v6 address) before the text is re-parsed.
fn strip_inet6(s: &str) -> &str {
    s.strip_prefix("inet6 ").unwrap_or(s)
}

#[async_trait]
impl Fib for LinuxFIB {
    fn name(&self) -> &str {
        "Linux"
    }

    async fn add_route(&self, prefix: IPPrefix, next_hop: IPAddress) -> Result<bool, FibError> {
        if prefix.is_default() && !self.policy.allow_default {
            return Ok(false);
        }
        if next_hop.is_link_local() && !self.policy.allow_ll_nexthop {
            return Ok(false);
        }
        let cmd = self.gen_route_command("add", prefix, next_hop);
        self.run_ip(cmd).await
    }

    async fn del_route(&self, prefix: IPPrefix, next_hop: IPAddress) -> Result<bool, FibError> {
        let cmd = self.gen_route_command("delete", prefix, next_hop);
        self.run_ip(cmd).await
    }

    async fn del_all_routes(&self, next_hop: Option<IPAddress>) -> Result<bool, FibError> {
        let mut deleted_any = false;
        for version in [IpVersion::V4, IpVersion::V6] {
            let table = self.show_route_table(version).await?;
            for (prefix_text, route_next_hop) in enumerate_agent_routes(&table, next_hop) {
                let Ok(prefix) = prefix_text.parse::<IPPrefix>() else {
                    continue;
                };
                if self.del_route(prefix, route_next_hop).await.unwrap_or(false) {
                    deleted_any = true;
                }
            }
        }
        Ok(deleted_any)
    }

    async fn check_for_route(
        &self,
        prefix: IPPrefix,
        next_hop: IPAddress,
    ) -> Result<bool, FibError> {
        let version = if prefix.is_ipv4() {
            IpVersion::V4
        } else {
            IpVersion::V6
        };
        let table = self.show_route_table(version).await?;
        let prefix_text = if prefix.is_default() {
            "default".to_string()
        } else {
            prefix.to_string()
        };
        let pattern = format!(
            r"{} via.*{}.*metric {}.*",
            regex::escape(&prefix_text),
            regex::escape(&next_hop.to_string()),
            AGENT_METRIC
        );
        let re = Regex::new(&pattern).expect("generated pattern is valid");
        Ok(re.is_match(&table))
    }

    /// Unimplemented, matching the Python base class's default: `Linux`
    /// never enforces a prefix limit, so `0` unconditionally. A nonzero
    /// `learn.prefix_limit` against this backend is a fatal configuration
    /// error (spec §4.6, §7), caught by `Config::validate`.
    fn check_prefix_limit(&self) -> u32 {
        0
    }
}

/// Parse `ip route show` output, yielding `(prefix_text, next_hop)` for
/// every line bearing the agent's metric, scoped to `next_hop` when given.
fn enumerate_agent_routes(
    table: &str,
    next_hop: Option<IPAddress>,
) -> Vec<(String, IPAddress)> {
    let mut out = Vec::new();
    if let Some(target) = next_hop {
        let pattern = format!(
            r"(.*) via.*{}.*metric {}.*",
            regex::escape(&target.to_string()),
            AGENT_METRIC
        );
        let re = Regex::new(&pattern).expect("generated pattern is valid");
        for line in table.lines() {
            if let Some(caps) = re.captures(line) {
                if let Some(prefix) = caps.get(1) {
                    out.push((prefix.as_str().trim().to_string(), target));
                }
            }
        }
    } else {
        let pattern = format!(r"(.*) via (.*) dev .*metric {AGENT_METRIC}");
        let re = Regex::new(&pattern).expect("generated pattern is valid");
        for line in table.lines() {
            if let Some(caps) = re.captures(line) {
                let (Some(prefix), Some(raw_next_hop)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };
                let next_hop_text = strip_inet6(raw_next_hop.as_str().trim());
                if let Ok(addr) = IPAddress::parse(next_hop_text) {
                    out.push((prefix.as_str().trim().to_string(), addr));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fib(use_sudo: bool) -> LinuxFIB {
        LinuxFIB::new(FibPolicy {
            allow_default: true,
            allow_ll_nexthop: true,
            prefix_limit: 0,
            use_sudo,
        })
    }

    #[test]
    fn gen_route_command_v4_add_non_default() {
        let f = fib(true);
        let prefix = IPPrefix::parse("10.0.0.0/8").unwrap();
        let nh = IPAddress::parse("10.0.0.1").unwrap();
        assert_eq!(
            f.gen_route_command("add", prefix, nh),
            vec![
                "sudo", "ip", "-4", "route", "add", "10.0.0.0/8", "via", "10.0.0.1", "metric",
                "31337"
            ]
        );
    }

    #[test]
    fn gen_route_command_v4_delete_default_no_sudo() {
        let f = fib(false);
        let prefix = IPPrefix::root_v4();
        let nh = IPAddress::parse("10.0.0.1").unwrap();
        assert_eq!(
            f.gen_route_command("delete", prefix, nh),
            vec!["ip", "-4", "route", "delete", "default", "via", "10.0.0.1", "metric", "31337"]
        );
    }

    #[test]
    fn gen_route_command_v6_add() {
        let f = fib(true);
        let prefix = IPPrefix::parse("70::/32").unwrap();
        let nh = IPAddress::parse("2000:69::1").unwrap();
        assert_eq!(
            f.gen_route_command("add", prefix, nh),
            vec![
                "sudo", "ip", "-6", "route", "add", "70::/32", "via", "2000:69::1", "metric",
                "31337"
            ]
        );
    }

    #[test]
    fn gen_route_command_v4_prefix_v6_next_hop_gets_inet6() {
        let f = fib(true);
        let prefix = IPPrefix::parse("10.0.0.0/8").unwrap();
        let nh = IPAddress::parse("2000:69::1").unwrap();
        assert_eq!(
            f.gen_route_command("add", prefix, nh),
            vec![
                "sudo", "ip", "-4", "route", "add", "10.0.0.0/8", "via", "inet6", "2000:69::1",
                "metric", "31337"
            ]
        );
    }

    #[test]
    fn gen_route_command_v6_default_delete() {
        let f = fib(true);
        let prefix = IPPrefix::root_v6();
        let nh = IPAddress::parse("fc00:0:0:69::2").unwrap();
        assert_eq!(
            f.gen_route_command("delete", prefix, nh),
            vec![
                "sudo", "ip", "-6", "route", "delete", "default", "via", "fc00:0:0:69::2",
                "metric", "31337"
            ]
        );
    }

    #[test]
    fn enumerate_routes_with_next_hop_filter() {
        let table = "70::/32 via fc00:0:0:69::2  dev eth0 metric 31337\n\
                     80::/32 via fc00:0:0:69::3  dev eth0 metric 31337\n";
        let target = IPAddress::parse("fc00:0:0:69::2").unwrap();
        let routes = enumerate_agent_routes(table, Some(target));
        assert_eq!(routes, vec![("70::/32".to_string(), target)]);
    }

    #[test]
    fn enumerate_routes_without_filter_captures_next_hop() {
        let table = "70::/32 via fc00:0:0:69::2 dev eth0 metric 31337\n";
        let routes = enumerate_agent_routes(table, None);
        assert_eq!(
            routes,
            vec![(
                "70::/32".to_string(),
                IPAddress::parse("fc00:0:0:69::2").unwrap()
            )]
        );
    }

    #[test]
    fn enumerate_routes_strips_inet6_token() {
        let table = "10.0.0.0/8 via inet6 fc00:0:0:69::2 dev eth0 metric 31337\n";
        let routes = enumerate_agent_routes(table, None);
        assert_eq!(
            routes,
            vec![(
                "10.0.0.0/8".to_string(),
                IPAddress::parse("fc00:0:0:69::2").unwrap()
            )]
        );
    }

    #[tokio::test]
    async fn add_route_rejects_default_without_allow() {
        let f = LinuxFIB::new(FibPolicy {
            allow_default: false,
            allow_ll_nexthop: true,
            prefix_limit: 0,
            use_sudo: true,
        });
        // add_route's guard runs before any subprocess is spawned, so this
        // is safe to call without a real `ip` binary present.
        let result = f
            .add_route(IPPrefix::root_v4(), IPAddress::parse("10.0.0.1").unwrap())
            .await;
        assert_eq!(result.unwrap(), false);
    }

    #[tokio::test]
    async fn add_route_rejects_link_local_next_hop_without_allow() {
        let f = LinuxFIB::new(FibPolicy {
            allow_default: true,
            allow_ll_nexthop: false,
            prefix_limit: 0,
            use_sudo: true,
        });
        let result = f
            .add_route(
                IPPrefix::parse("10.0.0.0/8").unwrap(),
                IPAddress::parse("169.254.0.1").unwrap(),
            )
            .await;
        assert_eq!(result.unwrap(), false);
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Type to represent IP-version neutral network prefixes.

use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PrefixError {
    #[error("'{0}' is not a valid prefix")]
    Invalid(String),
}

/// An IPv4 or IPv6 network: address plus prefix length. Totally ordered by
/// `(version, address, length)` for deterministic output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IPPrefix {
    V4(Ipv4Net),
    V6(Ipv6Net),
}

impl IPPrefix {
    /// `0.0.0.0/0`.
    pub fn root_v4() -> Self {
        IPPrefix::V4(Ipv4Net::new(Ipv4Addr::UNSPECIFIED, 0).expect("0.0.0.0/0 is valid"))
    }

    /// `::/0`.
    pub fn root_v6() -> Self {
        IPPrefix::V6(Ipv6Net::new(Ipv6Addr::UNSPECIFIED, 0).expect("::/0 is valid"))
    }

    pub fn parse(s: &str) -> Result<Self, PrefixError> {
        if let Ok(v4) = Ipv4Net::from_str(s) {
            return Ok(IPPrefix::V4(v4));
        }
        if let Ok(v6) = Ipv6Net::from_str(s) {
            return Ok(IPPrefix::V6(v6));
        }
        Err(PrefixError::Invalid(s.to_string()))
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self, IPPrefix::V4(_))
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self, IPPrefix::V6(_))
    }

    /// `true` iff this is `0.0.0.0/0` or `::/0`.
    pub fn is_default(&self) -> bool {
        match self {
            IPPrefix::V4(n) => n.prefix_len() == 0,
            IPPrefix::V6(n) => n.prefix_len() == 0,
        }
    }

    pub fn prefix_len(&self) -> u8 {
        match self {
            IPPrefix::V4(n) => n.prefix_len(),
            IPPrefix::V6(n) => n.prefix_len(),
        }
    }

    pub fn network(&self) -> IpAddr {
        match self {
            IPPrefix::V4(n) => IpAddr::V4(n.network()),
            IPPrefix::V6(n) => IpAddr::V6(n.network()),
        }
    }

    fn as_ip_net(&self) -> IpNet {
        match self {
            IPPrefix::V4(n) => IpNet::V4(*n),
            IPPrefix::V6(n) => IpNet::V6(*n),
        }
    }

    /// `true` iff `self` and `other` are the same family and one contains
    /// the other's network (i.e. their ranges overlap as nested prefixes).
    /// Two unrelated prefixes of different families never overlap.
    pub fn overlaps(&self, other: &IPPrefix) -> bool {
        match (self, other) {
            (IPPrefix::V4(a), IPPrefix::V4(b)) => a.contains(b) || b.contains(a),
            (IPPrefix::V6(a), IPPrefix::V6(b)) => a.contains(b) || b.contains(a),
            _ => false,
        }
    }
}

impl fmt::Display for IPPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IPPrefix::V4(n) => write!(f, "{n}"),
            IPPrefix::V6(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for IPPrefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IPPrefix::parse(s)
    }
}

fn version_rank(p: &IPPrefix) -> u8 {
    match p {
        IPPrefix::V4(_) => 4,
        IPPrefix::V6(_) => 6,
    }
}

impl PartialOrd for IPPrefix {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IPPrefix {
    fn cmp(&self, other: &Self) -> Ordering {
        version_rank(self)
            .cmp(&version_rank(other))
            .then_with(|| self.network().cmp(&other.network()))
            .then_with(|| self.prefix_len().cmp(&other.prefix_len()))
    }
}

impl From<Ipv4Net> for IPPrefix {
    fn from(net: Ipv4Net) -> Self {
        IPPrefix::V4(net)
    }
}

impl From<Ipv6Net> for IPPrefix {
    fn from(net: Ipv6Net) -> Self {
        IPPrefix::V6(net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_v4_and_v6() {
        assert!(matches!(IPPrefix::parse("10.0.0.0/8"), Ok(IPPrefix::V4(_))));
        assert!(matches!(IPPrefix::parse("fc00::/7"), Ok(IPPrefix::V6(_))));
    }

    #[test]
    fn rejects_garbage() {
        assert!(IPPrefix::parse("not a prefix").is_err());
    }

    #[test]
    fn default_routes() {
        assert!(IPPrefix::root_v4().is_default());
        assert!(IPPrefix::root_v6().is_default());
        assert!(!IPPrefix::parse("10.0.0.0/8").unwrap().is_default());
    }

    #[test]
    fn overlap_is_bidirectional_and_family_scoped() {
        let summary = IPPrefix::parse("69::/32").unwrap();
        let narrower = IPPrefix::parse("69::/64").unwrap();
        let unrelated = IPPrefix::parse("11:69::/64").unwrap();
        let v4 = IPPrefix::parse("6.9.6.0/24").unwrap();

        assert!(summary.overlaps(&narrower));
        assert!(narrower.overlaps(&summary));
        assert!(!summary.overlaps(&unrelated));
        assert!(!summary.overlaps(&v4));
    }

    #[test]
    fn ordering_is_by_version_then_address_then_length() {
        let mut prefixes = vec![
            IPPrefix::parse("14:69::/64").unwrap(),
            IPPrefix::parse("6.9.6.0/24").unwrap(),
            IPPrefix::parse("11:69::/64").unwrap(),
        ];
        prefixes.sort();
        assert_eq!(
            prefixes,
            vec![
                IPPrefix::parse("6.9.6.0/24").unwrap(),
                IPPrefix::parse("11:69::/64").unwrap(),
                IPPrefix::parse("14:69::/64").unwrap(),
            ]
        );
    }
}

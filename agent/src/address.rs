// SPDX-License-Identifier: Apache-2.0

//! `IPAddress`: a host address classified as link-local or not, and
//! validated against the BGP speaker's `next-hop` token grammar.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use thiserror::Error;

/// The literal token the BGP speaker understands in place of a concrete
/// next-hop: "use my own address".
pub const SELF_NEXT_HOP: &str = "self";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("'{0}' is not a valid IP address")]
    InvalidAddress(String),
}

/// An IPv4 or IPv6 host address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IPAddress(IpAddr);

impl IPAddress {
    pub fn new(addr: IpAddr) -> Self {
        Self(addr)
    }

    pub fn parse(s: &str) -> Result<Self, AddressError> {
        IpAddr::from_str(s)
            .map(Self)
            .map_err(|_| AddressError::InvalidAddress(s.to_string()))
    }

    pub fn as_ip_addr(&self) -> IpAddr {
        self.0
    }

    pub fn is_ipv4(&self) -> bool {
        self.0.is_ipv4()
    }

    pub fn is_ipv6(&self) -> bool {
        self.0.is_ipv6()
    }

    /// `169.254.0.0/16` for v4, `fe80::/10` for v6.
    pub fn is_link_local(&self) -> bool {
        match self.0 {
            IpAddr::V4(v4) => is_v4_link_local(v4),
            IpAddr::V6(v6) => is_v6_link_local(v6),
        }
    }
}

fn is_v4_link_local(addr: Ipv4Addr) -> bool {
    let octets = addr.octets();
    octets[0] == 169 && octets[1] == 254
}

fn is_v6_link_local(addr: Ipv6Addr) -> bool {
    let segments = addr.segments();
    (segments[0] & 0xffc0) == 0xfe80
}

impl fmt::Display for IPAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<IpAddr> for IPAddress {
    fn from(addr: IpAddr) -> Self {
        Self(addr)
    }
}

/// Either the literal `self` token or a validated `IPAddress`, as emitted
/// on the wire to the BGP speaker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextHopSelector {
    SelfAddress,
    Address(IPAddress),
}

impl NextHopSelector {
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if s.eq_ignore_ascii_case(SELF_NEXT_HOP) {
            Ok(NextHopSelector::SelfAddress)
        } else {
            Ok(NextHopSelector::Address(IPAddress::parse(s)?))
        }
    }
}

impl fmt::Display for NextHopSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextHopSelector::SelfAddress => write!(f, "{SELF_NEXT_HOP}"),
            NextHopSelector::Address(addr) => write!(f, "{addr}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_next_hop_accepts_self_case_insensitive() {
        assert_eq!(
            NextHopSelector::parse("SELF").unwrap(),
            NextHopSelector::SelfAddress
        );
        assert_eq!(
            NextHopSelector::parse("self").unwrap(),
            NextHopSelector::SelfAddress
        );
    }

    #[test]
    fn validate_next_hop_accepts_parseable_address() {
        let parsed = NextHopSelector::parse("2000:69::1").unwrap();
        assert_eq!(
            parsed,
            NextHopSelector::Address(IPAddress::parse("2000:69::1").unwrap())
        );
    }

    #[test]
    fn validate_next_hop_rejects_garbage() {
        assert!(NextHopSelector::parse("not-an-address").is_err());
    }

    #[test]
    fn link_local_v4() {
        let addr = IPAddress::parse("169.254.1.1").unwrap();
        assert!(addr.is_link_local());
        let addr = IPAddress::parse("10.0.0.1").unwrap();
        assert!(!addr.is_link_local());
    }

    #[test]
    fn link_local_v6() {
        let addr = IPAddress::parse("fe80::1").unwrap();
        assert!(addr.is_link_local());
        let addr = IPAddress::parse("2001:db8::1").unwrap();
        assert!(!addr.is_link_local());
    }
}

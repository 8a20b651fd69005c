//! IP address type used as next-hop identity.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IP address that can be either IPv4 or IPv6.
///
/// Ordering places every IPv4 address before every IPv6 address, then
/// compares octets, so the type can key ordered maps.
///
/// ```
/// use sonic_types::IpAddress;
///
/// let a: IpAddress = "10.0.0.1".parse().unwrap();
/// let b: IpAddress = "fc00::1".parse().unwrap();
/// assert!(a < b);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum IpAddress {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl IpAddress {
    pub const V4_UNSPECIFIED: IpAddress = IpAddress::V4(Ipv4Addr::UNSPECIFIED);

    pub const fn is_ipv4(&self) -> bool {
        matches!(self, IpAddress::V4(_))
    }

    pub const fn is_ipv6(&self) -> bool {
        matches!(self, IpAddress::V6(_))
    }

    /// Returns true for `0.0.0.0` and `::`.
    pub fn is_zero(&self) -> bool {
        match self {
            IpAddress::V4(a) => a.is_unspecified(),
            IpAddress::V6(a) => a.is_unspecified(),
        }
    }

    /// Returns true if this is an IPv6 link-local address (fe80::/10).
    pub fn is_link_local(&self) -> bool {
        match self {
            IpAddress::V4(_) => false,
            IpAddress::V6(a) => (a.segments()[0] & 0xffc0) == 0xfe80,
        }
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpAddress::V4(a) => a.fmt(f),
            IpAddress::V6(a) => a.fmt(f),
        }
    }
}

impl FromStr for IpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<IpAddr>()
            .map(IpAddress::from)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl TryFrom<String> for IpAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpAddress> for String {
    fn from(ip: IpAddress) -> Self {
        ip.to_string()
    }
}

impl From<IpAddr> for IpAddress {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(a) => IpAddress::V4(a),
            IpAddr::V6(a) => IpAddress::V6(a),
        }
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        IpAddress::V4(addr)
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(addr: Ipv6Addr) -> Self {
        IpAddress::V6(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_both_families() {
        let v4: IpAddress = "10.0.0.1".parse().unwrap();
        assert!(v4.is_ipv4());
        assert_eq!(v4.to_string(), "10.0.0.1");

        let v6: IpAddress = "2001:db8::1".parse().unwrap();
        assert!(v6.is_ipv6());
        assert_eq!(v6.to_string(), "2001:db8::1");
    }

    #[test]
    fn test_invalid_address() {
        let result = "10.0.0.256".parse::<IpAddress>();
        assert_eq!(
            result,
            Err(ParseError::InvalidIpAddress("10.0.0.256".to_string()))
        );
    }

    #[test]
    fn test_ordering_is_total() {
        let mut addrs: Vec<IpAddress> = ["fc00::1", "10.0.0.2", "10.0.0.1"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        addrs.sort();
        let rendered: Vec<String> = addrs.iter().map(|a| a.to_string()).collect();
        assert_eq!(rendered, vec!["10.0.0.1", "10.0.0.2", "fc00::1"]);
    }

    #[test]
    fn test_zero_and_link_local() {
        assert!(IpAddress::V4_UNSPECIFIED.is_zero());
        assert!("::".parse::<IpAddress>().unwrap().is_zero());
        assert!("fe80::1".parse::<IpAddress>().unwrap().is_link_local());
        assert!(!"fc00::1".parse::<IpAddress>().unwrap().is_link_local());
    }
}

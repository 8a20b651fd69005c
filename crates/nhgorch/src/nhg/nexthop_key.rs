//! Identity of a single next hop.
//!
//! Canonical string form: `[labels+]ip[@alias]`. The overlay form appends the
//! VXLAN VNI and router MAC: `ip@alias@vni@mac`.

use serde::{Deserialize, Serialize};
use sonic_types::{IpAddress, LabelStack, MacAddress, ParseError};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separates ip, alias, vni and mac inside one next hop.
pub const NH_DELIMITER: char = '@';

/// Separates next hops inside a group key.
pub const NHG_DELIMITER: char = ',';

/// Separates the MPLS label stack from the rest of the next hop.
pub const LABELSTACK_DELIMITER: char = '+';

/// Next-hop flags maintained by neighbor resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NextHopFlags(u32);

impl NextHopFlags {
    pub const NONE: Self = Self(0);
    /// Egress interface is operationally down.
    pub const IF_DOWN: Self = Self(1 << 0);

    pub fn is_if_down(&self) -> bool {
        self.0 & Self::IF_DOWN.0 != 0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for NextHopFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for NextHopFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NextHopKeyError {
    #[error("group delimiter found in single next hop: {0}")]
    GroupDelimiter(String),

    #[error("invalid next hop format: {0}")]
    InvalidFormat(String),

    #[error("invalid VNI in next hop: {0}")]
    InvalidVni(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A single next hop.
///
/// Field order defines the derived ordering: labels, ip, alias, vni, mac.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NextHopKey {
    label_stack: LabelStack,
    ip_address: IpAddress,
    alias: String,
    vni: u32,
    mac_address: MacAddress,
}

impl NextHopKey {
    pub fn new(ip_address: IpAddress, alias: impl Into<String>) -> Self {
        Self {
            label_stack: LabelStack::default(),
            ip_address,
            alias: alias.into(),
            vni: 0,
            mac_address: MacAddress::ZERO,
        }
    }

    pub fn with_labels(mut self, label_stack: LabelStack) -> Self {
        self.label_stack = label_stack;
        self
    }

    pub fn with_overlay(mut self, vni: u32, mac_address: MacAddress) -> Self {
        self.vni = vni;
        self.mac_address = mac_address;
        self
    }

    /// Parses the overlay form `ip@alias@vni@mac`.
    pub fn parse_overlay(s: &str) -> Result<Self, NextHopKeyError> {
        if s.contains(NHG_DELIMITER) {
            return Err(NextHopKeyError::GroupDelimiter(s.to_string()));
        }

        let (label_stack, rest) = split_labels(s)?;
        let tokens: Vec<&str> = rest.split(NH_DELIMITER).collect();
        if tokens.len() != 4 {
            return Err(NextHopKeyError::InvalidFormat(s.to_string()));
        }

        let vni = tokens[2]
            .parse::<u32>()
            .map_err(|_| NextHopKeyError::InvalidVni(s.to_string()))?;

        Ok(Self {
            label_stack,
            ip_address: tokens[0].parse()?,
            alias: tokens[1].to_string(),
            vni,
            mac_address: tokens[3].parse()?,
        })
    }

    /// Serializes including the overlay fields. Inverse of [`Self::parse_overlay`].
    pub fn to_string_overlay(&self) -> String {
        format!(
            "{}{}{}{}{}",
            self, NH_DELIMITER, self.vni, NH_DELIMITER, self.mac_address
        )
    }

    /// The same next hop without its label stack.
    pub fn ip_key(&self) -> NextHopKey {
        Self {
            label_stack: LabelStack::default(),
            ..self.clone()
        }
    }

    pub fn is_labeled(&self) -> bool {
        !self.label_stack.is_empty()
    }

    pub fn ip_address(&self) -> &IpAddress {
        &self.ip_address
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn label_stack(&self) -> &LabelStack {
        &self.label_stack
    }

    pub fn vni(&self) -> u32 {
        self.vni
    }

    pub fn mac_address(&self) -> &MacAddress {
        &self.mac_address
    }
}

fn split_labels(s: &str) -> Result<(LabelStack, &str), NextHopKeyError> {
    match s.split_once(LABELSTACK_DELIMITER) {
        Some((labels, rest)) => Ok((labels.parse()?, rest)),
        None => Ok((LabelStack::default(), s)),
    }
}

impl FromStr for NextHopKey {
    type Err = NextHopKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(NHG_DELIMITER) {
            return Err(NextHopKeyError::GroupDelimiter(s.to_string()));
        }

        let (label_stack, rest) = split_labels(s)?;
        let tokens: Vec<&str> = rest.split(NH_DELIMITER).collect();
        let (ip, alias) = match tokens.as_slice() {
            [ip] => (*ip, ""),
            [ip, alias] => (*ip, *alias),
            _ => return Err(NextHopKeyError::InvalidFormat(s.to_string())),
        };

        Ok(Self::new(ip.parse()?, alias).with_labels(label_stack))
    }
}

impl fmt::Display for NextHopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_labeled() {
            write!(f, "{}{}", self.label_stack, LABELSTACK_DELIMITER)?;
        }
        write!(f, "{}{}{}", self.ip_address, NH_DELIMITER, self.alias)
    }
}

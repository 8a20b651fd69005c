//! Identity of a logical next hop group.

use super::nexthop_key::{NextHopKey, NextHopKeyError, NHG_DELIMITER};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Weight given to a next hop when none is specified.
pub const DEFAULT_WEIGHT: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NextHopGroupKeyError {
    #[error("empty next hop group")]
    Empty,

    #[error("invalid weight '{0}'")]
    InvalidWeight(String),

    #[error(transparent)]
    NextHop(#[from] NextHopKeyError),
}

/// Ordered next hop to weight mapping.
///
/// Equality and ordering only consider the weighted members; the overlay flag
/// selects the serialization form.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NextHopGroupKey {
    nexthops: BTreeMap<NextHopKey, u8>,
    #[serde(skip)]
    overlay: bool,
}

impl NextHopGroupKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a comma list of next hops with a parallel comma list of weights.
    ///
    /// A weight list whose length differs from the next hop list is ignored
    /// and every next hop gets [`DEFAULT_WEIGHT`].
    pub fn with_weights(nexthops: &str, weights: &str) -> Result<Self, NextHopGroupKeyError> {
        Self::parse_with(nexthops, weights, false)
    }

    /// Parses overlay next hops (`ip@alias@vni@mac`).
    pub fn parse_overlay(nexthops: &str, weights: &str) -> Result<Self, NextHopGroupKeyError> {
        Self::parse_with(nexthops, weights, true)
    }

    fn parse_with(
        nexthops: &str,
        weights: &str,
        overlay: bool,
    ) -> Result<Self, NextHopGroupKeyError> {
        if nexthops.is_empty() {
            return Err(NextHopGroupKeyError::Empty);
        }

        let nhv: Vec<&str> = nexthops.split(NHG_DELIMITER).collect();
        let wtv: Vec<&str> = if weights.is_empty() {
            Vec::new()
        } else {
            weights.split(NHG_DELIMITER).collect()
        };
        let use_weights = wtv.len() == nhv.len();

        let mut key = Self {
            nexthops: BTreeMap::new(),
            overlay,
        };
        for (i, nh) in nhv.iter().enumerate() {
            let nh = if overlay {
                NextHopKey::parse_overlay(nh)?
            } else {
                nh.parse()?
            };
            let weight = if use_weights {
                parse_weight(wtv[i])?
            } else {
                DEFAULT_WEIGHT
            };
            key.add(nh, weight);
        }

        Ok(key)
    }

    /// Adds a next hop. An existing next hop keeps its weight.
    pub fn add(&mut self, nh: NextHopKey, weight: u8) {
        self.nexthops.entry(nh).or_insert(weight);
    }

    pub fn remove(&mut self, nh: &NextHopKey) {
        self.nexthops.remove(nh);
    }

    pub fn next_hops(&self) -> BTreeSet<NextHopKey> {
        self.nexthops.keys().cloned().collect()
    }

    pub fn next_hops_with_weights(&self) -> &BTreeMap<NextHopKey, u8> {
        &self.nexthops
    }

    pub fn weight(&self, nh: &NextHopKey) -> Option<u8> {
        self.nexthops.get(nh).copied()
    }

    pub fn len(&self) -> usize {
        self.nexthops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nexthops.is_empty()
    }

    pub fn contains_next_hop(&self, nh: &NextHopKey) -> bool {
        self.nexthops.contains_key(nh)
    }

    /// True if every next hop of `other` is in this key, weights ignored.
    pub fn contains_group(&self, other: &NextHopGroupKey) -> bool {
        other.nexthops.keys().all(|nh| self.contains_next_hop(nh))
    }

    pub fn is_overlay(&self) -> bool {
        self.overlay
    }

    /// Comma list of weights in next hop order.
    pub fn weights_string(&self) -> String {
        self.nexthops
            .values()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn parse_weight(s: &str) -> Result<u8, NextHopGroupKeyError> {
    s.trim()
        .parse::<u8>()
        .map_err(|_| NextHopGroupKeyError::InvalidWeight(s.to_string()))
}

impl PartialEq for NextHopGroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.nexthops == other.nexthops
    }
}

impl Eq for NextHopGroupKey {}

impl PartialOrd for NextHopGroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NextHopGroupKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.nexthops.cmp(&other.nexthops)
    }
}

impl FromStr for NextHopGroupKey {
    type Err = NextHopGroupKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::with_weights(s, "")
    }
}

impl From<NextHopKey> for NextHopGroupKey {
    fn from(nh: NextHopKey) -> Self {
        let mut key = Self::new();
        key.add(nh, DEFAULT_WEIGHT);
        key
    }
}

impl fmt::Display for NextHopGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, nh) in self.nexthops.keys().enumerate() {
            if i > 0 {
                write!(f, "{}", NHG_DELIMITER)?;
            }
            if self.overlay {
                f.write_str(&nh.to_string_overlay())?;
            } else {
                write!(f, "{}", nh)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn nh(s: &str) -> NextHopKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_canonicalizes_order() {
        let key: NextHopGroupKey = "10.0.0.3@Ethernet8,10.0.0.1@Ethernet0".parse().unwrap();
        assert_eq!(key.len(), 2);
        assert_eq!(key.to_string(), "10.0.0.1@Ethernet0,10.0.0.3@Ethernet8");
        assert_eq!(key.weights_string(), "1,1");
    }

    #[test]
    fn test_weights() {
        let key =
            NextHopGroupKey::with_weights("10.0.0.1@Ethernet0,10.0.0.3@Ethernet8", "5,2").unwrap();
        assert_eq!(key.weight(&nh("10.0.0.1@Ethernet0")), Some(5));
        assert_eq!(key.weight(&nh("10.0.0.3@Ethernet8")), Some(2));
    }

    #[test]
    fn test_weight_count_mismatch_defaults() {
        let key =
            NextHopGroupKey::with_weights("10.0.0.1@Ethernet0,10.0.0.3@Ethernet8", "5").unwrap();
        assert_eq!(key.weights_string(), "1,1");
    }

    #[test]
    fn test_invalid_weight() {
        assert!(matches!(
            NextHopGroupKey::with_weights("10.0.0.1@Ethernet0", "300"),
            Err(NextHopGroupKeyError::InvalidWeight(_))
        ));
        assert!(matches!(
            "".parse::<NextHopGroupKey>(),
            Err(NextHopGroupKeyError::Empty)
        ));
    }

    #[test]
    fn test_duplicate_keeps_first_weight() {
        let key =
            NextHopGroupKey::with_weights("10.0.0.1@Ethernet0,10.0.0.1@Ethernet0", "4,9").unwrap();
        assert_eq!(key.len(), 1);
        assert_eq!(key.weight(&nh("10.0.0.1@Ethernet0")), Some(4));
    }

    #[test]
    fn test_equality_includes_weights() {
        let a = NextHopGroupKey::with_weights("10.0.0.1@Ethernet0,10.0.0.3@Ethernet8", "1,1").unwrap();
        let b = NextHopGroupKey::with_weights("10.0.0.1@Ethernet0,10.0.0.3@Ethernet8", "5,1").unwrap();
        assert_ne!(a, b);
        assert!(a.contains_group(&b));
    }

    #[test]
    fn test_contains_and_remove() {
        let mut key: NextHopGroupKey =
            "10.0.0.1@Ethernet0,10.0.0.3@Ethernet8,10.0.0.5@Ethernet16".parse().unwrap();
        let single = NextHopGroupKey::from(nh("10.0.0.3@Ethernet8"));

        assert!(key.contains_group(&single));
        assert!(key.contains_next_hop(&nh("10.0.0.5@Ethernet16")));

        key.remove(&nh("10.0.0.3@Ethernet8"));
        assert!(!key.contains_group(&single));
        assert_eq!(key.len(), 2);
    }

    #[test]
    fn test_overlay_serialization() {
        let key = NextHopGroupKey::parse_overlay(
            "10.0.0.1@Vlan100@1000@00:11:22:33:44:55,10.0.0.2@Vlan100@1000@00:11:22:33:44:66",
            "",
        )
        .unwrap();
        assert!(key.is_overlay());
        assert_eq!(
            key.to_string(),
            "10.0.0.1@Vlan100@1000@00:11:22:33:44:55,10.0.0.2@Vlan100@1000@00:11:22:33:44:66"
        );
    }
}

//! MAC address type carried by overlay next hops.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 48-bit Ethernet MAC address.
///
/// ```
/// use sonic_types::MacAddress;
///
/// let mac: MacAddress = "00-11-22-33-44-55".parse().unwrap();
/// assert_eq!(mac.to_string(), "00:11:22:33:44:55");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const ZERO: MacAddress = MacAddress([0; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let separator = if s.contains(':') { ':' } else { '-' };
        let invalid = || ParseError::InvalidMacAddress(s.to_string());

        let mut bytes = [0u8; 6];
        let mut count = 0;
        for part in s.split(separator) {
            if count == 6 || part.len() != 2 {
                return Err(invalid());
            }
            bytes[count] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
            count += 1;
        }
        if count != 6 {
            return Err(invalid());
        }
        Ok(MacAddress(bytes))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> String {
        mac.to_string()
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_separators() {
        let colon: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        let hyphen: MacAddress = "00-11-22-33-44-55".parse().unwrap();
        assert_eq!(colon, hyphen);
        assert_eq!(colon.as_bytes(), &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    }

    #[test]
    fn test_display_lowercase() {
        let mac = MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_zero_default() {
        assert!(MacAddress::default().is_zero());
        assert_eq!(MacAddress::default(), MacAddress::ZERO);
    }

    #[test]
    fn test_invalid_format() {
        assert!("invalid".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44:55:66".parse::<MacAddress>().is_err());
        assert!("gg:11:22:33:44:55".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_ordering() {
        let low: MacAddress = "00:00:00:00:00:01".parse().unwrap();
        let high: MacAddress = "00:00:00:00:01:00".parse().unwrap();
        assert!(low < high);
    }
}

//! Common SONiC types for network switch orchestration.
//!
//! Value types shared by the next-hop-group sync layer:
//!
//! - [`IpAddress`]: IPv4 and IPv6 addresses with a total order
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`LabelStack`]: MPLS label stacks with an optional [`MplsOp`]

mod ip;
mod label;
mod mac;

pub use ip::IpAddress;
pub use label::{LabelStack, MplsOp, LABEL_DELIMITER, MAX_LABEL};
pub use mac::MacAddress;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid MPLS label: {0}")]
    InvalidLabel(String),
}

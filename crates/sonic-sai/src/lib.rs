//! Safe Rust bindings for SAI (Switch Abstraction Interface).
//!
//! This crate provides type-safe object ids and trait-based wrappers around
//! the SAI next-hop-group and switch API tables.
//!
//! # Architecture
//!
//! - [`types`]: Core SAI types including type-safe object IDs
//! - [`error`]: Error types and status handling
//! - [`api`]: API tables (next-hop group, switch)
//!
//! # Example
//!
//! ```ignore
//! use sonic_sai::api::{NextHopGroupApi, NextHopGroupAttr, NextHopGroupType};
//! use sonic_sai::{NextHopGroupOid, SaiResult};
//!
//! fn create_ecmp(api: &dyn NextHopGroupApi) -> SaiResult<NextHopGroupOid> {
//!     api.create_next_hop_group(&[NextHopGroupAttr::Type(NextHopGroupType::Ecmp)])
//! }
//! ```

pub mod api;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use types::{
    NextHopGroupKind, NextHopGroupMemberKind, NextHopGroupMemberOid, NextHopGroupOid,
    NextHopKind, NextHopOid, RawSaiObjectId, SaiObjectId, SaiObjectKind, SwitchKind, SwitchOid,
    SAI_NULL_OBJECT_ID,
};

pub use error::{SaiError, SaiResult, SaiStatus};

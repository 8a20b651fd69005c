//! Safe wrappers for SAI API functions.
//!
//! Each submodule exposes a SAI API table as a trait so the orchestration
//! layer can run against the vendor SAI or an in-memory double.
//!
//! # Available API Modules
//!
//! - [`next_hop_group`]: Next-hop groups and their members (bulk capable)
//! - [`switch`]: Switch-level capability queries

pub mod next_hop_group;
pub mod switch;

pub use next_hop_group::{
    NextHopGroupApi, NextHopGroupAttr, NextHopGroupMemberAttr, NextHopGroupType,
};
pub use switch::SwitchApi;

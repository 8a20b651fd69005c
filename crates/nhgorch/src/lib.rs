//! SONiC next hop group orchestration.
//!
//! Translates `NEXTHOP_GROUP_TABLE` and `CLASS_BASED_NEXT_HOP_GROUP_TABLE`
//! entries from APPL_DB into SAI next hop group objects, and serves the
//! resulting group ids to route installation by group index.
//!
//! ```text
//! [APPL_DB] ──> [Consumer] ──> [NhgOrch] ──> [NextHopGroupApi] ──> [ASIC]
//!                                  │
//!                  [NeighborResolver] [CrmCounters] [NhgBudget]
//! ```
//!
//! Collaborators are reached through traits ([`neigh::NeighborResolver`],
//! [`crm::CrmCounters`], [`switch::SwitchCapabilitySink`] and the SAI API
//! traits). [`sim`] provides in-memory implementations of all of them.

pub mod audit;
pub mod crm;
pub mod neigh;
pub mod nhg;
pub mod sim;
pub mod switch;

pub use nhg::{
    GroupView, NextHopGroupKey, NextHopKey, NhgBudget, NhgContext, NhgKind, NhgOrch,
    NhgOrchConfig, NhgOrchError, NhgOrchStats,
};

//! NhgOrch - next hop group orchestration.
//!
//! Two group kinds share one lifecycle:
//!
//! - [`Nhg`]: an ECMP group of weighted next hops. A single next hop group
//!   has no hardware object and borrows the next hop's id.
//! - [`CbfNhg`]: a class-based group whose members are plain groups,
//!   selected by forwarding class.
//!
//! Both are built on [`GroupCommon`], generic over the [`GroupMember`] kind,
//! which owns bulk member sync/desync. Hardware group objects are counted
//! against a [`NhgBudget`]; when it runs out, a multi-member plain group is
//! stood in for by a temporary single next hop group until it can be
//! promoted.

mod budget;
mod cbf;
mod common;
mod config;
mod context;
mod group;
mod group_key;
mod member;
mod nexthop_key;
mod orch;
mod table;
mod validation;

pub use budget::{NhgBudget, DEFAULT_MAX_ECMP_GROUP_SIZE, DEFAULT_NUMBER_OF_ECMP_GROUPS};
pub use cbf::{CbfNhg, CbfNhgMember};
pub use common::GroupCommon;
pub use config::{ConfigError, NhgOrchConfig, PLATFORM_ENV_VAR};
pub use context::NhgContext;
pub use group::{Nhg, WeightedNhgMember};
pub use group_key::{NextHopGroupKey, NextHopGroupKeyError, DEFAULT_WEIGHT};
pub use member::{GroupMember, MemberCore};
pub use nexthop_key::{
    NextHopFlags, NextHopKey, NextHopKeyError, LABELSTACK_DELIMITER, NHG_DELIMITER, NH_DELIMITER,
};
pub use orch::{
    GroupView, NhgKind, NhgOrch, NhgOrchError, NhgOrchStats, CBF_NEXTHOP_GROUP_TABLE,
    NEXTHOP_GROUP_TABLE,
};
pub use table::{NhgEntry, NhgTable};
pub use validation::{validate_cbf_data, CbfData, CbfValidationError, FC_MAX_VAL, MAX_CBF_MEMBERS};

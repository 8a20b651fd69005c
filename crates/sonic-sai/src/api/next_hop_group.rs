//! Safe wrapper for SAI next-hop group API.
//!
//! Member creation and removal are bulked: one call carries N independent
//! entries and returns N independent results, in input order.

use crate::error::SaiResult;
use crate::types::{NextHopGroupMemberOid, NextHopGroupOid, RawSaiObjectId};
use std::fmt;

/// Next-hop group type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NextHopGroupType {
    /// Hash-based multipath over weighted next hops.
    #[default]
    Ecmp,
    /// Member selected by the packet's forwarding class.
    ClassBased,
}

impl fmt::Display for NextHopGroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextHopGroupType::Ecmp => write!(f, "SAI_NEXT_HOP_GROUP_TYPE_DYNAMIC_UNORDERED_ECMP"),
            NextHopGroupType::ClassBased => write!(f, "SAI_NEXT_HOP_GROUP_TYPE_CLASS_BASED"),
        }
    }
}

/// Group-level attributes (`SAI_NEXT_HOP_GROUP_ATTR_*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextHopGroupAttr {
    Type(NextHopGroupType),
    /// (forwarding class, member index) pairs.
    ForwardingClassToIndexMap(Vec<(u8, u8)>),
}

/// Member-level attributes (`SAI_NEXT_HOP_GROUP_MEMBER_ATTR_*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextHopGroupMemberAttr {
    NextHopGroupId(NextHopGroupOid),
    /// A next hop, or for class-based groups another group.
    NextHopId(RawSaiObjectId),
    Weight(u32),
    Index(u8),
}

impl NextHopGroupMemberAttr {
    /// Finds the `NEXT_HOP_ID` value in an attribute list.
    pub fn next_hop_id(attrs: &[NextHopGroupMemberAttr]) -> Option<RawSaiObjectId> {
        attrs.iter().find_map(|a| match a {
            NextHopGroupMemberAttr::NextHopId(id) => Some(*id),
            _ => None,
        })
    }

    /// Finds the `NEXT_HOP_GROUP_ID` value in an attribute list.
    pub fn group_id(attrs: &[NextHopGroupMemberAttr]) -> Option<NextHopGroupOid> {
        attrs.iter().find_map(|a| match a {
            NextHopGroupMemberAttr::NextHopGroupId(id) => Some(*id),
            _ => None,
        })
    }
}

/// The `sai_next_hop_group_api_t` table.
pub trait NextHopGroupApi: Send + Sync {
    fn create_next_hop_group(&self, attrs: &[NextHopGroupAttr]) -> SaiResult<NextHopGroupOid>;

    fn remove_next_hop_group(&self, oid: NextHopGroupOid) -> SaiResult<()>;

    fn set_next_hop_group_attribute(
        &self,
        oid: NextHopGroupOid,
        attr: &NextHopGroupAttr,
    ) -> SaiResult<()>;

    /// Bulk create. The result vector has one entry per attribute list.
    fn create_next_hop_group_members(
        &self,
        members: &[Vec<NextHopGroupMemberAttr>],
    ) -> Vec<SaiResult<NextHopGroupMemberOid>>;

    /// Bulk remove. The result vector has one entry per member id.
    fn remove_next_hop_group_members(&self, oids: &[NextHopGroupMemberOid])
        -> Vec<SaiResult<()>>;

    fn set_next_hop_group_member_attribute(
        &self,
        oid: NextHopGroupMemberOid,
        attr: &NextHopGroupMemberAttr,
    ) -> SaiResult<()>;
}

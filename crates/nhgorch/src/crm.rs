//! Critical resource monitoring counters touched by next hop groups.
//!
//! The counters are observational. Capacity enforcement is done by
//! [`crate::nhg::NhgBudget`], not here.

use crate::warn_log;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrmResourceType {
    NexthopGroup,
    NexthopGroupMember,
}

impl CrmResourceType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NexthopGroup => "nexthop_group",
            Self::NexthopGroupMember => "nexthop_group_member",
        }
    }
}

impl fmt::Display for CrmResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Used-counter bookkeeping exposed by CrmOrch.
pub trait CrmCounters: Send + Sync {
    fn inc_crm_used(&self, resource: CrmResourceType);
    fn dec_crm_used(&self, resource: CrmResourceType);
}

/// In-process used counters.
#[derive(Debug, Default)]
pub struct CrmUsage {
    nexthop_group: AtomicU32,
    nexthop_group_member: AtomicU32,
}

impl CrmUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn used(&self, resource: CrmResourceType) -> u32 {
        self.counter(resource).load(Ordering::SeqCst)
    }

    fn counter(&self, resource: CrmResourceType) -> &AtomicU32 {
        match resource {
            CrmResourceType::NexthopGroup => &self.nexthop_group,
            CrmResourceType::NexthopGroupMember => &self.nexthop_group_member,
        }
    }
}

impl CrmCounters for CrmUsage {
    fn inc_crm_used(&self, resource: CrmResourceType) {
        self.counter(resource).fetch_add(1, Ordering::SeqCst);
    }

    fn dec_crm_used(&self, resource: CrmResourceType) {
        let result = self
            .counter(resource)
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));
        if result.is_err() {
            warn_log!("CrmOrch", resource = %resource, "Used counter already 0");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_inc_dec() {
        let crm = CrmUsage::new();
        crm.inc_crm_used(CrmResourceType::NexthopGroup);
        crm.inc_crm_used(CrmResourceType::NexthopGroupMember);
        crm.inc_crm_used(CrmResourceType::NexthopGroupMember);
        crm.dec_crm_used(CrmResourceType::NexthopGroupMember);

        assert_eq!(crm.used(CrmResourceType::NexthopGroup), 1);
        assert_eq!(crm.used(CrmResourceType::NexthopGroupMember), 1);
    }

    #[test]
    fn test_dec_saturates_at_zero() {
        let crm = CrmUsage::new();
        crm.dec_crm_used(CrmResourceType::NexthopGroup);
        assert_eq!(crm.used(CrmResourceType::NexthopGroup), 0);
    }

    #[test]
    fn test_resource_names() {
        assert_eq!(CrmResourceType::NexthopGroup.to_string(), "nexthop_group");
        assert_eq!(
            CrmResourceType::NexthopGroupMember.to_string(),
            "nexthop_group_member"
        );
    }
}

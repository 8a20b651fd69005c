//! Group member lifecycle shared by plain and class-based groups.

use super::context::NhgContext;
use crate::crm::CrmResourceType;
use crate::error_log;
use sonic_sai::api::NextHopGroupMemberAttr;
use sonic_sai::{NextHopGroupMemberOid, NextHopGroupOid, RawSaiObjectId};
use std::fmt;

/// Behavior a member must provide so [`super::GroupCommon`] can bulk sync and
/// desync it.
///
/// `Env` is whatever the member needs to resolve its hardware target beyond
/// the shared [`NhgContext`]: nothing for next hops, the plain group table for
/// class-based members.
pub trait GroupMember {
    type Key: Ord + Clone + fmt::Display;
    type Env: ?Sized;

    fn key(&self) -> &Self::Key;

    fn gm_id(&self) -> NextHopGroupMemberOid;

    fn is_synced(&self) -> bool {
        self.gm_id().is_valid()
    }

    /// Hardware object the member points at, or `SAI_NULL_OBJECT_ID` when it
    /// cannot be resolved.
    fn target_id(&self, ctx: &NhgContext, env: &Self::Env) -> RawSaiObjectId;

    /// Resolvable but left out of the group for now.
    fn is_skipped(&self, _ctx: &NhgContext, _env: &Self::Env) -> bool {
        false
    }

    fn member_attrs(
        &self,
        group_id: NextHopGroupOid,
        target: RawSaiObjectId,
    ) -> Vec<NextHopGroupMemberAttr>;

    fn sync(&mut self, ctx: &NhgContext, env: &Self::Env, gm_id: NextHopGroupMemberOid);

    fn desync(&mut self, ctx: &NhgContext, env: &Self::Env);
}

/// Key and hardware id of a member, with the CRM accounting every member
/// kind shares.
#[derive(Debug)]
pub struct MemberCore<K: fmt::Display> {
    key: K,
    gm_id: NextHopGroupMemberOid,
}

impl<K: fmt::Display> MemberCore<K> {
    pub fn new(key: K) -> Self {
        Self {
            key,
            gm_id: NextHopGroupMemberOid::NULL,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn gm_id(&self) -> NextHopGroupMemberOid {
        self.gm_id
    }

    pub fn is_synced(&self) -> bool {
        self.gm_id.is_valid()
    }

    /// Panics if already synced or `gm_id` is null.
    pub fn sync(&mut self, ctx: &NhgContext, gm_id: NextHopGroupMemberOid) {
        if self.is_synced() || gm_id.is_null() {
            panic!(
                "invalid SAI ID {} assigned to next hop group member {} with current SAI ID {}",
                gm_id, self.key, self.gm_id
            );
        }
        self.gm_id = gm_id;
        ctx.crm.inc_crm_used(CrmResourceType::NexthopGroupMember);
    }

    /// Panics if not synced.
    pub fn desync(&mut self, ctx: &NhgContext) {
        if !self.is_synced() {
            panic!("desyncing next hop group member {} which is not synced", self.key);
        }
        self.gm_id = NextHopGroupMemberOid::NULL;
        ctx.crm.dec_crm_used(CrmResourceType::NexthopGroupMember);
    }
}

impl<K: fmt::Display> Drop for MemberCore<K> {
    fn drop(&mut self) {
        if self.is_synced() {
            error_log!(
                "NhgOrch",
                member = %self.key,
                gm_id = %self.gm_id,
                "Deleting next hop group member which is still synced"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::sim_context;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sync_desync_counts() {
        let (ctx, env) = sim_context(16);
        let mut core = MemberCore::new("group1".to_string());

        core.sync(&ctx, NextHopGroupMemberOid::from_raw_unchecked(0x2d00));
        assert!(core.is_synced());
        assert_eq!(env.crm.used(CrmResourceType::NexthopGroupMember), 1);

        core.desync(&ctx);
        assert!(!core.is_synced());
        assert_eq!(env.crm.used(CrmResourceType::NexthopGroupMember), 0);
    }

    #[test]
    #[should_panic(expected = "invalid SAI ID")]
    fn test_double_sync_panics() {
        let (ctx, _env) = sim_context(16);
        let mut core = MemberCore::new("group1".to_string());
        core.sync(&ctx, NextHopGroupMemberOid::from_raw_unchecked(0x2d00));
        core.sync(&ctx, NextHopGroupMemberOid::from_raw_unchecked(0x2d01));
    }

    #[test]
    #[should_panic(expected = "invalid SAI ID")]
    fn test_sync_null_panics() {
        let (ctx, _env) = sim_context(16);
        MemberCore::new("group1".to_string()).sync(&ctx, NextHopGroupMemberOid::NULL);
    }

    #[test]
    #[should_panic(expected = "not synced")]
    fn test_desync_unsynced_panics() {
        let (ctx, _env) = sim_context(16);
        MemberCore::new("group1".to_string()).desync(&ctx);
    }
}

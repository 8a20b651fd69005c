//! Group skeleton shared by plain and class-based groups.
//!
//! Owns the hardware group id and the keyed member collection, and
//! implements bulk member sync/desync once for every [`GroupMember`] kind.
//! Bulk calls report per-entry results; each entry is accounted on its own
//! so a failed sibling never skews counters.

use super::context::NhgContext;
use super::member::GroupMember;
use crate::crm::CrmResourceType;
use crate::{debug_log, error_log, info_log, warn_log};
use sonic_sai::api::NextHopGroupAttr;
use sonic_sai::{NextHopGroupMemberOid, NextHopGroupOid, RawSaiObjectId, SAI_NULL_OBJECT_ID};
use std::collections::BTreeMap;

pub struct GroupCommon<M: GroupMember> {
    id: RawSaiObjectId,
    members: BTreeMap<M::Key, M>,
    ctx: NhgContext,
}

impl<M: GroupMember> GroupCommon<M> {
    pub fn new(ctx: NhgContext) -> Self {
        Self {
            id: SAI_NULL_OBJECT_ID,
            members: BTreeMap::new(),
            ctx,
        }
    }

    pub fn id(&self) -> RawSaiObjectId {
        self.id
    }

    pub fn is_synced(&self) -> bool {
        self.id != SAI_NULL_OBJECT_ID
    }

    pub fn ctx(&self) -> &NhgContext {
        &self.ctx
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn has_member(&self, key: &M::Key) -> bool {
        self.members.contains_key(key)
    }

    pub fn member(&self, key: &M::Key) -> Option<&M> {
        self.members.get(key)
    }

    pub fn member_mut(&mut self, key: &M::Key) -> Option<&mut M> {
        self.members.get_mut(key)
    }

    pub fn members(&self) -> impl Iterator<Item = &M> {
        self.members.values()
    }

    pub fn member_keys(&self) -> Vec<M::Key> {
        self.members.keys().cloned().collect()
    }

    pub fn insert(&mut self, member: M) {
        self.members.insert(member.key().clone(), member);
    }

    pub fn remove(&mut self, key: &M::Key) -> Option<M> {
        self.members.remove(key)
    }

    pub fn clear_members(&mut self) {
        self.members.clear();
    }

    /// Points the group at an existing object without creating one.
    pub fn set_alias_id(&mut self, id: RawSaiObjectId) {
        self.id = id;
    }

    pub fn clear_id(&mut self) {
        self.id = SAI_NULL_OBJECT_ID;
    }

    /// Creates the hardware group object and accounts it.
    ///
    /// The caller must have checked [`super::NhgBudget::has_capacity`].
    pub fn create_group(&mut self, name: &str, attrs: &[NextHopGroupAttr]) -> bool {
        match self.ctx.sai.create_next_hop_group(attrs) {
            Ok(oid) => {
                self.id = oid.as_raw();
                self.ctx.crm.inc_crm_used(CrmResourceType::NexthopGroup);
                self.ctx.budget.inc();
                info_log!("NhgOrch", group = %name, id = %oid, "Next hop group created");
                true
            }
            Err(e) => {
                error_log!("NhgOrch", group = %name, error = %e, "Failed to create next hop group");
                false
            }
        }
    }

    /// Removes the hardware group object. The id is kept on failure.
    pub fn remove_group(&mut self, name: &str) -> bool {
        let oid = NextHopGroupOid::from_raw_unchecked(self.id);
        match self.ctx.sai.remove_next_hop_group(oid) {
            Ok(()) => {
                self.ctx.crm.dec_crm_used(CrmResourceType::NexthopGroup);
                self.ctx.budget.dec();
                self.id = SAI_NULL_OBJECT_ID;
                info_log!("NhgOrch", group = %name, id = %oid, "Next hop group removed");
                true
            }
            Err(e) => {
                error_log!(
                    "NhgOrch",
                    group = %name,
                    id = %oid,
                    error = %e,
                    "Failed to remove next hop group"
                );
                false
            }
        }
    }

    /// Bulk creates the given members.
    ///
    /// Already synced and unknown members are skipped, as are members the
    /// member kind asks to skip. Fails immediately, before any hardware call,
    /// if a member cannot be resolved.
    pub fn sync_members(&mut self, env: &M::Env, keys: &[M::Key]) -> bool {
        let group_id = NextHopGroupOid::from_raw_unchecked(self.id);
        let mut syncing: Vec<M::Key> = Vec::new();
        let mut attrs = Vec::new();

        for key in keys {
            let Some(member) = self.members.get(key) else {
                warn_log!("NhgOrch", member = %key, "Member to sync not found in group");
                continue;
            };

            if member.is_synced() {
                continue;
            }

            let target = member.target_id(&self.ctx, env);
            if target == SAI_NULL_OBJECT_ID {
                warn_log!(
                    "NhgOrch",
                    member = %key,
                    group_id = %group_id,
                    "Failed to get next hop for group member"
                );
                return false;
            }

            if member.is_skipped(&self.ctx, env) {
                info_log!("NhgOrch", member = %key, "Skipping group member, interface is down");
                continue;
            }

            attrs.push(member.member_attrs(group_id, target));
            syncing.push(key.clone());
        }

        if syncing.is_empty() {
            return true;
        }

        let results = self.ctx.sai.create_next_hop_group_members(&attrs);
        if results.len() != syncing.len() {
            error_log!(
                "NhgOrch",
                expected = syncing.len(),
                got = results.len(),
                "Bulk member create returned wrong number of results"
            );
        }

        let mut success = results.len() == syncing.len();
        for (key, result) in syncing.iter().zip(results) {
            match result {
                Ok(gm_id) if gm_id.is_valid() => {
                    if let Some(member) = self.members.get_mut(key) {
                        member.sync(&self.ctx, env, gm_id);
                    }
                }
                Ok(_) => {
                    error_log!("NhgOrch", member = %key, "Group member created with null id");
                    success = false;
                }
                Err(e) => {
                    error_log!(
                        "NhgOrch",
                        member = %key,
                        group_id = %group_id,
                        error = %e,
                        "Failed to create next hop group member"
                    );
                    success = false;
                }
            }
        }

        debug_log!("NhgOrch", group_id = %group_id, success, "Synced group members");
        success
    }

    /// Bulk removes the given synced members. Members removed successfully
    /// stay desynced even if siblings fail.
    pub fn desync_members(&mut self, env: &M::Env, keys: &[M::Key]) -> bool {
        let mut removing: Vec<M::Key> = Vec::new();
        let mut oids: Vec<NextHopGroupMemberOid> = Vec::new();

        for key in keys {
            if let Some(member) = self.members.get(key) {
                if member.is_synced() {
                    oids.push(member.gm_id());
                    removing.push(key.clone());
                }
            }
        }

        if removing.is_empty() {
            return true;
        }

        let results = self.ctx.sai.remove_next_hop_group_members(&oids);
        let mut success = results.len() == removing.len();
        for (key, result) in removing.iter().zip(results) {
            match result {
                Ok(()) => {
                    if let Some(member) = self.members.get_mut(key) {
                        member.desync(&self.ctx, env);
                    }
                }
                Err(e) => {
                    error_log!(
                        "NhgOrch",
                        member = %key,
                        error = %e,
                        "Could not remove next hop group member"
                    );
                    success = false;
                }
            }
        }

        success
    }

    /// Desyncs every member, then removes the group object.
    pub fn desync(&mut self, name: &str, env: &M::Env) -> bool {
        if !self.is_synced() {
            return true;
        }

        let keys = self.member_keys();
        if !self.desync_members(env, &keys) {
            error_log!("NhgOrch", group = %name, "Failed to desync group members");
            return false;
        }

        self.remove_group(name)
    }
}

impl<M: GroupMember> std::fmt::Debug for GroupCommon<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupCommon")
            .field("id", &format_args!("{:#x}", self.id))
            .field("members", &self.members.len())
            .finish()
    }
}

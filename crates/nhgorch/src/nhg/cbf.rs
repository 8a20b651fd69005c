//! Class-based forwarding (CBF) next hop groups.
//!
//! Members are plain groups referenced by index. Each member's position is
//! fixed at creation, so a reorder rebuilds every member. Members whose
//! plain group is temporary are tracked until that group is promoted.

use super::common::GroupCommon;
use super::context::NhgContext;
use super::group::Nhg;
use super::member::{GroupMember, MemberCore};
use super::table::NhgTable;
use crate::{error_log, info_log, warn_log};
use sonic_sai::api::{NextHopGroupAttr, NextHopGroupMemberAttr, NextHopGroupType};
use sonic_sai::{NextHopGroupMemberOid, NextHopGroupOid, RawSaiObjectId, SAI_NULL_OBJECT_ID};
use std::collections::BTreeMap;

/// A plain group referenced from a CBF group.
#[derive(Debug)]
pub struct CbfNhgMember {
    core: MemberCore<String>,
    index: u8,
}

impl CbfNhgMember {
    pub fn new(key: impl Into<String>, index: u8) -> Self {
        Self {
            core: MemberCore::new(key.into()),
            index,
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    /// Points the member at a new plain group id.
    pub fn update_nh_attr(&self, ctx: &NhgContext, nhg_id: RawSaiObjectId) -> bool {
        match ctx.sai.set_next_hop_group_member_attribute(
            self.core.gm_id(),
            &NextHopGroupMemberAttr::NextHopId(nhg_id),
        ) {
            Ok(()) => true,
            Err(e) => {
                error_log!(
                    "CbfNhgOrch",
                    member = %self.core.key(),
                    error = %e,
                    "Failed to update CBF member next hop attribute"
                );
                false
            }
        }
    }
}

impl GroupMember for CbfNhgMember {
    type Key = String;
    type Env = NhgTable<Nhg>;

    fn key(&self) -> &String {
        self.core.key()
    }

    fn gm_id(&self) -> NextHopGroupMemberOid {
        self.core.gm_id()
    }

    fn target_id(&self, _ctx: &NhgContext, nhgs: &NhgTable<Nhg>) -> RawSaiObjectId {
        match nhgs.get(self.core.key()) {
            Some(entry) if entry.nhg.is_synced() => entry.nhg.id(),
            Some(_) => {
                warn_log!("CbfNhgOrch", member = %self.core.key(), "Member group is not synced");
                SAI_NULL_OBJECT_ID
            }
            None => {
                warn_log!("CbfNhgOrch", member = %self.core.key(), "Member group does not exist");
                SAI_NULL_OBJECT_ID
            }
        }
    }

    fn member_attrs(
        &self,
        group_id: NextHopGroupOid,
        target: RawSaiObjectId,
    ) -> Vec<NextHopGroupMemberAttr> {
        vec![
            NextHopGroupMemberAttr::NextHopGroupId(group_id),
            NextHopGroupMemberAttr::NextHopId(target),
            NextHopGroupMemberAttr::Index(self.index),
        ]
    }

    fn sync(&mut self, ctx: &NhgContext, nhgs: &NhgTable<Nhg>, gm_id: NextHopGroupMemberOid) {
        self.core.sync(ctx, gm_id);
        if let Some(entry) = nhgs.get(self.core.key()) {
            entry.inc_ref();
        }
    }

    fn desync(&mut self, ctx: &NhgContext, nhgs: &NhgTable<Nhg>) {
        if !self.core.is_synced() {
            return;
        }
        self.core.desync(ctx);
        if let Some(entry) = nhgs.get(self.core.key()) {
            entry.dec_ref(self.core.key());
        }
    }
}

/// A class-based forwarding group.
pub struct CbfNhg {
    index: String,
    common: GroupCommon<CbfNhgMember>,
    member_order: Vec<String>,
    class_map: BTreeMap<u8, u8>,
    /// Temporary member groups and their id when last observed.
    temp_nhgs: BTreeMap<String, RawSaiObjectId>,
}

impl CbfNhg {
    pub fn new(
        index: impl Into<String>,
        members: Vec<String>,
        class_map: BTreeMap<u8, u8>,
        ctx: NhgContext,
    ) -> Self {
        let mut nhg = Self {
            index: index.into(),
            common: GroupCommon::new(ctx),
            member_order: Vec::new(),
            class_map,
            temp_nhgs: BTreeMap::new(),
        };
        nhg.set_members(members);
        nhg
    }

    fn set_members(&mut self, members: Vec<String>) {
        self.common.clear_members();
        for (i, member) in members.iter().enumerate() {
            // Validation caps the member count at 256.
            self.common.insert(CbfNhgMember::new(member.clone(), i as u8));
        }
        self.member_order = members;
    }

    fn class_map_attr(&self) -> NextHopGroupAttr {
        NextHopGroupAttr::ForwardingClassToIndexMap(
            self.class_map.iter().map(|(fc, idx)| (*fc, *idx)).collect(),
        )
    }

    /// Starts tracking synced members that reference temporary groups.
    fn record_temps(&mut self, nhgs: &NhgTable<Nhg>) {
        for member in self.common.members() {
            if !member.is_synced() {
                continue;
            }
            if let Some(entry) = nhgs.get(member.key()) {
                if entry.nhg.is_temp() {
                    self.temp_nhgs
                        .entry(member.key().clone())
                        .or_insert_with(|| entry.nhg.id());
                }
            }
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn id(&self) -> RawSaiObjectId {
        self.common.id()
    }

    pub fn is_synced(&self) -> bool {
        self.common.is_synced()
    }

    pub fn len(&self) -> usize {
        self.common.len()
    }

    pub fn is_empty(&self) -> bool {
        self.common.is_empty()
    }

    pub fn members(&self) -> &[String] {
        &self.member_order
    }

    pub fn member(&self, key: &str) -> Option<&CbfNhgMember> {
        self.common.member(&key.to_string())
    }

    pub fn class_map(&self) -> &BTreeMap<u8, u8> {
        &self.class_map
    }

    pub fn has_temps(&self) -> bool {
        !self.temp_nhgs.is_empty()
    }

    pub fn temp_members(&self) -> impl Iterator<Item = &String> {
        self.temp_nhgs.keys()
    }

    /// Creates the group object and its members.
    ///
    /// The caller must have checked the group budget.
    pub fn sync(&mut self, nhgs: &NhgTable<Nhg>) -> bool {
        if self.is_synced() {
            return true;
        }

        let attrs = [
            NextHopGroupAttr::Type(NextHopGroupType::ClassBased),
            self.class_map_attr(),
        ];
        if !self.common.create_group(&self.index, &attrs) {
            return false;
        }

        let keys = self.member_order.clone();
        let success = self.common.sync_members(nhgs, &keys);
        self.record_temps(nhgs);

        if !success {
            warn_log!("CbfNhgOrch", index = %self.index, "Failed to sync CBF group members");
        }
        success
    }

    pub fn desync(&mut self, nhgs: &NhgTable<Nhg>) -> bool {
        if !self.is_synced() {
            return true;
        }

        if !self.common.desync(&self.index, nhgs) {
            return false;
        }

        self.temp_nhgs.clear();
        true
    }

    /// Applies a new member list and class map.
    pub fn update(
        &mut self,
        nhgs: &NhgTable<Nhg>,
        members: Vec<String>,
        class_map: BTreeMap<u8, u8>,
    ) -> bool {
        if self.member_order == members {
            if !self.refresh_temps(nhgs) {
                return false;
            }

            let keys = self.member_order.clone();
            let success = self.common.sync_members(nhgs, &keys);
            self.record_temps(nhgs);
            if !success {
                warn_log!("CbfNhgOrch", index = %self.index, "Failed to sync CBF group members");
                return false;
            }
        } else {
            info_log!(
                "CbfNhgOrch",
                index = %self.index,
                members = ?members,
                "CBF group members changed, rebuilding members"
            );

            let keys = self.common.member_keys();
            if !self.common.desync_members(nhgs, &keys) {
                error_log!("CbfNhgOrch", index = %self.index, "Failed to desync CBF group members");
                return false;
            }
            self.temp_nhgs.clear();
            self.set_members(members);

            let keys = self.member_order.clone();
            let success = self.common.sync_members(nhgs, &keys);
            self.record_temps(nhgs);
            if !success {
                warn_log!("CbfNhgOrch", index = %self.index, "Failed to sync CBF group members");
                return false;
            }
        }

        if class_map != self.class_map {
            let previous = std::mem::replace(&mut self.class_map, class_map);
            let oid = NextHopGroupOid::from_raw_unchecked(self.common.id());
            if let Err(e) = self
                .common
                .ctx()
                .sai
                .set_next_hop_group_attribute(oid, &self.class_map_attr())
            {
                error_log!(
                    "CbfNhgOrch",
                    index = %self.index,
                    error = %e,
                    "Failed to update CBF group class map"
                );
                self.class_map = previous;
                return false;
            }
        }

        true
    }

    /// Re-points members whose temporary group changed id and stops tracking
    /// promoted groups.
    fn refresh_temps(&mut self, nhgs: &NhgTable<Nhg>) -> bool {
        let tracked: Vec<(String, RawSaiObjectId)> =
            self.temp_nhgs.iter().map(|(k, v)| (k.clone(), *v)).collect();

        for (key, last_id) in tracked {
            let Some(entry) = nhgs.get(&key) else {
                continue;
            };
            let current_id = entry.nhg.id();

            if current_id != last_id {
                if let Some(member) = self.common.member(&key) {
                    if member.is_synced() && !member.update_nh_attr(self.common.ctx(), current_id)
                    {
                        return false;
                    }
                }
                info_log!(
                    "CbfNhgOrch",
                    index = %self.index,
                    member = %key,
                    "Updated CBF member to new group id"
                );
            }

            if entry.nhg.is_temp() {
                self.temp_nhgs.insert(key, current_id);
            } else {
                info_log!("CbfNhgOrch", index = %self.index, member = %key, "Member group promoted");
                self.temp_nhgs.remove(&key);
            }
        }

        true
    }
}

impl std::fmt::Debug for CbfNhg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CbfNhg")
            .field("index", &self.index)
            .field("id", &format_args!("{:#x}", self.id()))
            .field("members", &self.member_order)
            .field("class_map", &self.class_map)
            .finish()
    }
}

impl Drop for CbfNhg {
    fn drop(&mut self) {
        if self.is_synced() {
            error_log!(
                "CbfNhgOrch",
                index = %self.index,
                "Destroying CBF next hop group which is still synced"
            );
        }
    }
}

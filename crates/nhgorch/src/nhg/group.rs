//! Plain (non class-based) next hop groups.
//!
//! A group with one next hop has no hardware group object: its id is the
//! next hop's id. A group with two or more next hops is an ECMP group object
//! with one weighted member per next hop.

use super::common::GroupCommon;
use super::context::NhgContext;
use super::group_key::{NextHopGroupKey, DEFAULT_WEIGHT};
use super::member::{GroupMember, MemberCore};
use super::nexthop_key::{NextHopFlags, NextHopKey};
use super::orch::NhgOrchError;
use crate::neigh::NeighborResolver;
use crate::{debug_log, error_log, info_log, warn_log};
use rand::Rng;
use sonic_sai::api::{NextHopGroupAttr, NextHopGroupMemberAttr, NextHopGroupType};
use sonic_sai::{NextHopGroupMemberOid, NextHopGroupOid, RawSaiObjectId, SAI_NULL_OBJECT_ID};
use std::sync::Arc;

/// A next hop inside an ECMP group.
pub struct WeightedNhgMember {
    core: MemberCore<NextHopKey>,
    weight: u8,
    neigh: Arc<dyn NeighborResolver>,
}

impl WeightedNhgMember {
    pub fn new(key: NextHopKey, weight: u8, neigh: Arc<dyn NeighborResolver>) -> Self {
        Self {
            core: MemberCore::new(key),
            weight,
            neigh,
        }
    }

    pub fn weight(&self) -> u8 {
        self.weight
    }

    pub fn is_labeled(&self) -> bool {
        self.core.key().is_labeled()
    }

    /// Stores the new weight and pushes it to hardware if synced.
    pub fn update_weight(&mut self, ctx: &NhgContext, weight: u8) -> bool {
        debug_log!(
            "NhgOrch",
            member = %self.core.key(),
            from = self.weight,
            to = weight,
            "Updating group member weight"
        );
        self.weight = weight;

        if !self.core.is_synced() {
            return true;
        }

        match ctx.sai.set_next_hop_group_member_attribute(
            self.core.gm_id(),
            &NextHopGroupMemberAttr::Weight(u32::from(weight)),
        ) {
            Ok(()) => true,
            Err(e) => {
                warn_log!(
                    "NhgOrch",
                    member = %self.core.key(),
                    error = %e,
                    "Failed to update group member weight"
                );
                false
            }
        }
    }
}

impl GroupMember for WeightedNhgMember {
    type Key = NextHopKey;
    type Env = ();

    fn key(&self) -> &NextHopKey {
        self.core.key()
    }

    fn gm_id(&self) -> NextHopGroupMemberOid {
        self.core.gm_id()
    }

    /// Resolves the next hop, creating a labeled next hop on top of its
    /// resolved root when needed.
    fn target_id(&self, _ctx: &NhgContext, _env: &()) -> RawSaiObjectId {
        let key = self.core.key();
        if self.neigh.has_next_hop(key) {
            return self.neigh.get_next_hop_id(key).as_raw();
        }

        if key.is_labeled() && self.neigh.has_next_hop(&key.ip_key()) {
            info_log!("NhgOrch", next_hop = %key, "Creating labeled next hop");
            self.neigh.add_next_hop(key);
            return self.neigh.get_next_hop_id(key).as_raw();
        }

        SAI_NULL_OBJECT_ID
    }

    fn is_skipped(&self, _ctx: &NhgContext, _env: &()) -> bool {
        self.neigh
            .is_next_hop_flag_set(self.core.key(), NextHopFlags::IF_DOWN)
    }

    fn member_attrs(
        &self,
        group_id: NextHopGroupOid,
        target: RawSaiObjectId,
    ) -> Vec<NextHopGroupMemberAttr> {
        vec![
            NextHopGroupMemberAttr::NextHopGroupId(group_id),
            NextHopGroupMemberAttr::NextHopId(target),
            NextHopGroupMemberAttr::Weight(u32::from(self.weight)),
        ]
    }

    fn sync(&mut self, ctx: &NhgContext, _env: &(), gm_id: NextHopGroupMemberOid) {
        self.core.sync(ctx, gm_id);
        self.neigh.increase_next_hop_ref_count(self.core.key());
    }

    fn desync(&mut self, ctx: &NhgContext, _env: &()) {
        if !self.core.is_synced() {
            return;
        }
        self.core.desync(ctx);
        self.neigh.decrease_next_hop_ref_count(self.core.key());
    }
}

impl Drop for WeightedNhgMember {
    fn drop(&mut self) {
        let key = self.core.key();
        if key.is_labeled()
            && self.neigh.has_next_hop(key)
            && self.neigh.get_next_hop_ref_count(key) == 0
        {
            info_log!("NhgOrch", next_hop = %key, "Deleting labeled next hop");
            self.neigh.remove_next_hop(key);
        }
    }
}

/// A plain next hop group.
pub struct Nhg {
    key: NextHopGroupKey,
    common: GroupCommon<WeightedNhgMember>,
    is_temp: bool,
}

impl Nhg {
    pub fn new(key: NextHopGroupKey, ctx: NhgContext) -> Self {
        let mut common = GroupCommon::new(ctx);
        for (nh, weight) in key.next_hops_with_weights() {
            let neigh = Arc::clone(&common.ctx().neigh);
            common.insert(WeightedNhgMember::new(nh.clone(), *weight, neigh));
        }
        Self {
            key,
            common,
            is_temp: false,
        }
    }

    /// Builds a temporary single next hop stand-in for `key`.
    ///
    /// The next hop is picked uniformly among those whose unlabeled root is
    /// resolved. The group is not synced.
    pub fn create_temp<R: Rng + ?Sized>(
        key: &NextHopGroupKey,
        ctx: NhgContext,
        rng: &mut R,
    ) -> Result<Self, NhgOrchError> {
        let candidates: Vec<&NextHopKey> = key
            .next_hops_with_weights()
            .keys()
            .filter(|nh| ctx.neigh.has_next_hop(&nh.ip_key()))
            .collect();

        if candidates.is_empty() {
            info_log!("NhgOrch", key = %key, "No valid next hop to sync temporary group");
            return Err(NhgOrchError::NoResolvableNextHop(key.to_string()));
        }

        let chosen = candidates[rng.gen_range(0..candidates.len())].clone();
        info_log!(
            "NhgOrch",
            key = %key,
            next_hop = %chosen,
            "Using next hop for temporary group"
        );

        let mut nhg = Self::new(NextHopGroupKey::from(chosen), ctx);
        nhg.is_temp = true;
        Ok(nhg)
    }

    pub fn key(&self) -> &NextHopGroupKey {
        &self.key
    }

    pub fn id(&self) -> RawSaiObjectId {
        self.common.id()
    }

    pub fn is_synced(&self) -> bool {
        self.common.is_synced()
    }

    pub fn is_temp(&self) -> bool {
        self.is_temp
    }

    /// True when synced and every member not skipped for a down interface
    /// has a hardware member.
    pub fn is_fully_synced(&self) -> bool {
        if !self.is_synced() {
            return false;
        }
        if self.common.len() == 1 {
            return true;
        }
        let ctx = self.common.ctx();
        self.common
            .members()
            .all(|member| member.is_synced() || member.is_skipped(ctx, &()))
    }

    pub fn len(&self) -> usize {
        self.common.len()
    }

    pub fn is_empty(&self) -> bool {
        self.common.is_empty()
    }

    pub fn has_member(&self, nh: &NextHopKey) -> bool {
        self.common.has_member(nh)
    }

    pub fn member(&self, nh: &NextHopKey) -> Option<&WeightedNhgMember> {
        self.common.member(nh)
    }

    /// Programs the group. No-op when already synced.
    pub fn sync(&mut self) -> bool {
        if self.is_synced() {
            debug_log!("NhgOrch", key = %self.key, "Group is already synced");
            return true;
        }

        if self.common.len() == 1 {
            let target = match self.common.members().next() {
                Some(member) => member.target_id(self.common.ctx(), &()),
                None => SAI_NULL_OBJECT_ID,
            };
            if target == SAI_NULL_OBJECT_ID {
                warn_log!("NhgOrch", key = %self.key, "Next hop is not synced");
                return false;
            }
            self.common.set_alias_id(target);
            return true;
        }

        let name = self.key.to_string();
        if !self
            .common
            .create_group(&name, &[NextHopGroupAttr::Type(NextHopGroupType::Ecmp)])
        {
            return false;
        }

        let keys = self.common.member_keys();
        if !self.common.sync_members(&(), &keys) {
            warn_log!("NhgOrch", key = %name, "Failed to create next hop group members");
            return false;
        }

        true
    }

    /// Releases the group. On failure the group stays synced; members
    /// already removed stay removed.
    pub fn desync(&mut self) -> bool {
        if !self.is_synced() {
            return true;
        }

        if self.common.len() == 1 {
            self.common.clear_id();
            return true;
        }

        let name = self.key.to_string();
        self.common.desync(&name, &())
    }

    /// Moves the group to `new_key`.
    ///
    /// Transitions to or from a single next hop, or on an unsynced group,
    /// replace the group wholesale and so change its id. Multi-member to
    /// multi-member updates keep the id: removed members are desynced
    /// before new ones are synced.
    pub fn update(&mut self, new_key: &NextHopGroupKey) -> bool {
        info_log!("NhgOrch", from = %self.key, to = %new_key, "Updating next hop group");

        if new_key.len() == 1 || self.common.len() == 1 || !self.is_synced() {
            let was_synced = self.is_synced();
            if was_synced && !self.desync() {
                warn_log!("NhgOrch", key = %self.key, "Failed to release group being replaced");
                return false;
            }

            *self = Self::new(new_key.clone(), self.common.ctx().clone());
            return !was_synced || self.sync();
        }

        self.key = new_key.clone();
        let mut new_members = new_key.next_hops_with_weights().clone();
        let mut removed: Vec<NextHopKey> = Vec::new();

        for nh in self.common.member_keys() {
            match new_members.remove(&nh) {
                None => removed.push(nh),
                Some(weight) => {
                    let ctx = self.common.ctx().clone();
                    let Some(member) = self.common.member_mut(&nh) else {
                        continue;
                    };
                    if member.weight() != weight && !member.update_weight(&ctx, weight) {
                        warn_log!("NhgOrch", member = %nh, "Failed to update member weight");
                        return false;
                    }
                }
            }
        }

        if !self.common.desync_members(&(), &removed) {
            warn_log!("NhgOrch", key = %self.key, "Failed to desync removed members");
            return false;
        }
        for nh in &removed {
            self.common.remove(nh);
        }

        for (nh, weight) in new_members {
            let neigh = Arc::clone(&self.common.ctx().neigh);
            self.common.insert(WeightedNhgMember::new(nh, weight, neigh));
        }

        let keys = self.common.member_keys();
        if !self.common.sync_members(&(), &keys) {
            warn_log!("NhgOrch", key = %self.key, "Failed to sync new members");
            return false;
        }

        true
    }

    /// Adds a member whose next hop became usable.
    pub fn validate_next_hop(&mut self, nh: &NextHopKey) -> bool {
        if self.common.len() == 1 {
            return true;
        }
        self.common.sync_members(&(), std::slice::from_ref(nh))
    }

    /// Removes a member whose next hop became unusable.
    pub fn invalidate_next_hop(&mut self, nh: &NextHopKey) -> bool {
        if self.common.len() == 1 {
            return true;
        }
        self.common.desync_members(&(), std::slice::from_ref(nh))
    }

    /// Weight of a member, or the default for unknown next hops.
    pub fn weight_of(&self, nh: &NextHopKey) -> u8 {
        self.common
            .member(nh)
            .map_or(DEFAULT_WEIGHT, WeightedNhgMember::weight)
    }
}

impl std::fmt::Debug for Nhg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nhg")
            .field("key", &self.key.to_string())
            .field("id", &format_args!("{:#x}", self.id()))
            .field("is_temp", &self.is_temp)
            .finish()
    }
}

impl Drop for Nhg {
    fn drop(&mut self) {
        if self.is_synced() && self.common.len() > 1 {
            error_log!(
                "NhgOrch",
                key = %self.key,
                id = %format_args!("{:#x}", self.id()),
                "Destroying next hop group which is still synced"
            );
        }
    }
}

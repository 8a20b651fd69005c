//! In-memory backends for the collaborators of the next hop group layer.
//!
//! `nhgorchd` runs against these when replaying recorded change feeds, and the
//! tests use them to observe hardware calls. [`SimSai`] records every
//! next-hop-group call in order.

use crate::crm::CrmUsage;
use crate::neigh::NeighborResolver;
use crate::nhg::{NextHopFlags, NextHopKey, NhgBudget, NhgContext};
use crate::switch::SwitchCapabilitySink;
use serde::Deserialize;
use sonic_orch_common::KeyOpFieldsValues;
use sonic_sai::api::{
    NextHopGroupApi, NextHopGroupAttr, NextHopGroupMemberAttr, NextHopGroupType, SwitchApi,
};
use sonic_sai::{
    NextHopGroupMemberOid, NextHopGroupOid, NextHopOid, RawSaiObjectId, SaiError, SaiResult,
    SaiStatus,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const GROUP_OID_BASE: RawSaiObjectId = 0x5000_0000_0000;
const MEMBER_OID_BASE: RawSaiObjectId = 0x2d00_0000_0000;
const NEXT_HOP_OID_BASE: RawSaiObjectId = 0x4000_0000_0000;

/// One recorded next hop group API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaiCall {
    CreateGroup {
        oid: RawSaiObjectId,
        group_type: NextHopGroupType,
    },
    RemoveGroup {
        oid: RawSaiObjectId,
    },
    SetGroupAttr {
        oid: RawSaiObjectId,
        attr: NextHopGroupAttr,
    },
    CreateMembers {
        count: usize,
    },
    RemoveMembers {
        count: usize,
    },
    SetMemberAttr {
        oid: NextHopGroupMemberOid,
        attr: NextHopGroupMemberAttr,
    },
}

/// A call to fail once. Bulk faults fail only the first entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SimFault {
    CreateGroup,
    RemoveGroup,
    SetGroupAttr,
    CreateMember,
    RemoveMember,
    SetMemberAttr,
}

#[derive(Debug)]
struct SimMember {
    group: RawSaiObjectId,
    attrs: Vec<NextHopGroupMemberAttr>,
}

#[derive(Debug, Default)]
struct SaiState {
    next_oid: RawSaiObjectId,
    groups: BTreeMap<RawSaiObjectId, NextHopGroupType>,
    members: BTreeMap<RawSaiObjectId, SimMember>,
    calls: Vec<SaiCall>,
    faults: BTreeSet<SimFault>,
}

impl SaiState {
    fn alloc(&mut self, base: RawSaiObjectId) -> RawSaiObjectId {
        self.next_oid += 1;
        base | self.next_oid
    }

    fn take_fault(&mut self, fault: SimFault) -> bool {
        self.faults.remove(&fault)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Next hop group and switch API backed by maps.
#[derive(Debug, Default)]
pub struct SimSai {
    state: Mutex<SaiState>,
    max_ecmp_groups: Option<u32>,
}

impl SimSai {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value reported for `SAI_SWITCH_ATTR_NUMBER_OF_ECMP_GROUPS`. Without
    /// one the query fails.
    pub fn with_max_ecmp_groups(mut self, max: u32) -> Self {
        self.max_ecmp_groups = Some(max);
        self
    }

    pub fn fail_next(&self, fault: SimFault) {
        lock(&self.state).faults.insert(fault);
    }

    pub fn calls(&self) -> Vec<SaiCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    pub fn group_count(&self) -> usize {
        lock(&self.state).groups.len()
    }

    pub fn member_count(&self) -> usize {
        lock(&self.state).members.len()
    }

    /// Members of a group in creation order, as (member id, next hop id).
    pub fn group_members(&self, group: RawSaiObjectId) -> Vec<(RawSaiObjectId, RawSaiObjectId)> {
        lock(&self.state)
            .members
            .iter()
            .filter(|(_, m)| m.group == group)
            .map(|(oid, m)| {
                (
                    *oid,
                    NextHopGroupMemberAttr::next_hop_id(&m.attrs).unwrap_or_default(),
                )
            })
            .collect()
    }

    pub fn group_type(&self, group: RawSaiObjectId) -> Option<NextHopGroupType> {
        lock(&self.state).groups.get(&group).copied()
    }
}

impl NextHopGroupApi for SimSai {
    fn create_next_hop_group(&self, attrs: &[NextHopGroupAttr]) -> SaiResult<NextHopGroupOid> {
        let mut state = lock(&self.state);
        if state.take_fault(SimFault::CreateGroup) {
            return Err(SaiError::table_full("NEXT_HOP_GROUP"));
        }

        let group_type = attrs
            .iter()
            .find_map(|a| match a {
                NextHopGroupAttr::Type(t) => Some(*t),
                _ => None,
            })
            .unwrap_or_default();

        let oid = state.alloc(GROUP_OID_BASE);
        state.groups.insert(oid, group_type);
        state.calls.push(SaiCall::CreateGroup { oid, group_type });
        Ok(NextHopGroupOid::from_raw_unchecked(oid))
    }

    fn remove_next_hop_group(&self, oid: NextHopGroupOid) -> SaiResult<()> {
        let mut state = lock(&self.state);
        let raw = oid.as_raw();
        if state.take_fault(SimFault::RemoveGroup) {
            return Err(SaiError::from_status(SaiStatus::Failure));
        }
        if !state.groups.contains_key(&raw) {
            return Err(SaiError::not_found(oid.to_string()));
        }
        if state.members.values().any(|m| m.group == raw) {
            return Err(SaiError::object_in_use(oid.to_string()));
        }

        state.groups.remove(&raw);
        state.calls.push(SaiCall::RemoveGroup { oid: raw });
        Ok(())
    }

    fn set_next_hop_group_attribute(
        &self,
        oid: NextHopGroupOid,
        attr: &NextHopGroupAttr,
    ) -> SaiResult<()> {
        let mut state = lock(&self.state);
        if state.take_fault(SimFault::SetGroupAttr) {
            return Err(SaiError::from_status(SaiStatus::Failure));
        }
        if !state.groups.contains_key(&oid.as_raw()) {
            return Err(SaiError::not_found(oid.to_string()));
        }

        state.calls.push(SaiCall::SetGroupAttr {
            oid: oid.as_raw(),
            attr: attr.clone(),
        });
        Ok(())
    }

    fn create_next_hop_group_members(
        &self,
        members: &[Vec<NextHopGroupMemberAttr>],
    ) -> Vec<SaiResult<NextHopGroupMemberOid>> {
        let mut state = lock(&self.state);
        state.calls.push(SaiCall::CreateMembers {
            count: members.len(),
        });

        let mut fail_first = state.take_fault(SimFault::CreateMember);
        members
            .iter()
            .map(|attrs| {
                if std::mem::take(&mut fail_first) {
                    return Err(SaiError::from_status(SaiStatus::InsufficientResources));
                }

                let group = NextHopGroupMemberAttr::group_id(attrs)
                    .ok_or_else(|| SaiError::invalid_parameter("missing NEXT_HOP_GROUP_ID"))?;
                if !state.groups.contains_key(&group.as_raw()) {
                    return Err(SaiError::not_found(group.to_string()));
                }
                match NextHopGroupMemberAttr::next_hop_id(attrs) {
                    Some(nh) if nh != 0 => {}
                    _ => return Err(SaiError::invalid_parameter("missing NEXT_HOP_ID")),
                }

                let oid = state.alloc(MEMBER_OID_BASE);
                state.members.insert(
                    oid,
                    SimMember {
                        group: group.as_raw(),
                        attrs: attrs.clone(),
                    },
                );
                Ok(NextHopGroupMemberOid::from_raw_unchecked(oid))
            })
            .collect()
    }

    fn remove_next_hop_group_members(&self, oids: &[NextHopGroupMemberOid]) -> Vec<SaiResult<()>> {
        let mut state = lock(&self.state);
        state.calls.push(SaiCall::RemoveMembers { count: oids.len() });

        let mut fail_first = state.take_fault(SimFault::RemoveMember);
        oids.iter()
            .map(|oid| {
                if std::mem::take(&mut fail_first) {
                    return Err(SaiError::from_status(SaiStatus::Failure));
                }
                state
                    .members
                    .remove(&oid.as_raw())
                    .map(|_| ())
                    .ok_or_else(|| SaiError::not_found(oid.to_string()))
            })
            .collect()
    }

    fn set_next_hop_group_member_attribute(
        &self,
        oid: NextHopGroupMemberOid,
        attr: &NextHopGroupMemberAttr,
    ) -> SaiResult<()> {
        let mut state = lock(&self.state);
        if state.take_fault(SimFault::SetMemberAttr) {
            return Err(SaiError::from_status(SaiStatus::Failure));
        }

        let Some(member) = state.members.get_mut(&oid.as_raw()) else {
            return Err(SaiError::not_found(oid.to_string()));
        };
        let slot = member
            .attrs
            .iter_mut()
            .find(|a| std::mem::discriminant(&**a) == std::mem::discriminant(attr));
        match slot {
            Some(existing) => *existing = attr.clone(),
            None => member.attrs.push(attr.clone()),
        }

        state.calls.push(SaiCall::SetMemberAttr {
            oid,
            attr: attr.clone(),
        });
        Ok(())
    }
}

impl SwitchApi for SimSai {
    fn get_number_of_ecmp_groups(&self) -> SaiResult<u32> {
        self.max_ecmp_groups
            .ok_or_else(|| SaiError::not_supported("SAI_SWITCH_ATTR_NUMBER_OF_ECMP_GROUPS"))
    }
}

#[derive(Debug)]
struct SimNextHop {
    id: NextHopOid,
    ref_count: u32,
    flags: NextHopFlags,
}

#[derive(Debug, Default)]
struct NeighState {
    next_id: RawSaiObjectId,
    next_hops: BTreeMap<NextHopKey, SimNextHop>,
}

impl NeighState {
    fn insert(&mut self, key: &NextHopKey) -> NextHopOid {
        if let Some(nh) = self.next_hops.get(key) {
            return nh.id;
        }
        self.next_id += 1;
        let id = NextHopOid::from_raw_unchecked(NEXT_HOP_OID_BASE | self.next_id);
        self.next_hops.insert(
            key.clone(),
            SimNextHop {
                id,
                ref_count: 0,
                flags: NextHopFlags::NONE,
            },
        );
        id
    }
}

/// Neighbor table holding resolved next hops.
#[derive(Debug, Default)]
pub struct SimNeighbors {
    state: Mutex<NeighState>,
}

impl SimNeighbors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a next hop, returning its id.
    pub fn add_resolved(&self, key: &NextHopKey) -> NextHopOid {
        lock(&self.state).insert(key)
    }

    pub fn set_if_down(&self, key: &NextHopKey, down: bool) {
        if let Some(nh) = lock(&self.state).next_hops.get_mut(key) {
            nh.flags = if down {
                NextHopFlags::IF_DOWN
            } else {
                NextHopFlags::NONE
            };
        }
    }

    pub fn ref_count(&self, key: &NextHopKey) -> u32 {
        lock(&self.state)
            .next_hops
            .get(key)
            .map_or(0, |nh| nh.ref_count)
    }

    pub fn len(&self) -> usize {
        lock(&self.state).next_hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NeighborResolver for SimNeighbors {
    fn has_next_hop(&self, key: &NextHopKey) -> bool {
        lock(&self.state).next_hops.contains_key(key)
    }

    fn get_next_hop_id(&self, key: &NextHopKey) -> NextHopOid {
        lock(&self.state)
            .next_hops
            .get(key)
            .map_or(NextHopOid::NULL, |nh| nh.id)
    }

    fn add_next_hop(&self, key: &NextHopKey) -> bool {
        let mut state = lock(&self.state);
        if !state.next_hops.contains_key(&key.ip_key()) {
            return false;
        }
        state.insert(key);
        true
    }

    fn increase_next_hop_ref_count(&self, key: &NextHopKey) {
        if let Some(nh) = lock(&self.state).next_hops.get_mut(key) {
            nh.ref_count += 1;
        }
    }

    fn decrease_next_hop_ref_count(&self, key: &NextHopKey) {
        if let Some(nh) = lock(&self.state).next_hops.get_mut(key) {
            nh.ref_count = nh.ref_count.saturating_sub(1);
        }
    }

    fn get_next_hop_ref_count(&self, key: &NextHopKey) -> u32 {
        self.ref_count(key)
    }

    fn is_next_hop_flag_set(&self, key: &NextHopKey, flag: NextHopFlags) -> bool {
        lock(&self.state)
            .next_hops
            .get(key)
            .is_some_and(|nh| nh.flags.contains(flag))
    }

    fn remove_next_hop(&self, key: &NextHopKey) -> bool {
        let mut state = lock(&self.state);
        match state.next_hops.get(key) {
            Some(nh) if nh.ref_count == 0 => {
                state.next_hops.remove(key);
                true
            }
            _ => false,
        }
    }
}

/// Records published switch capabilities.
#[derive(Debug, Default)]
pub struct SimCapabilities {
    fields: Mutex<BTreeMap<String, String>>,
}

impl SimCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<String> {
        lock(&self.fields).get(field).cloned()
    }
}

impl SwitchCapabilitySink for SimCapabilities {
    fn set_switch_capability(&self, fvs: &[(String, String)]) {
        let mut fields = lock(&self.fields);
        for (field, value) in fvs {
            fields.insert(field.clone(), value.clone());
        }
    }
}

/// Concrete handles behind a simulated [`NhgContext`].
#[derive(Debug, Clone)]
pub struct SimEnv {
    pub sai: Arc<SimSai>,
    pub neigh: Arc<SimNeighbors>,
    pub crm: Arc<CrmUsage>,
    pub budget: Arc<NhgBudget>,
}

impl SimEnv {
    pub fn context(&self) -> NhgContext {
        NhgContext::new(
            self.sai.clone(),
            self.neigh.clone(),
            self.crm.clone(),
            self.budget.clone(),
        )
    }
}

/// Builds a context over fresh simulated backends with a group ceiling of
/// `max_nhg_count`.
pub fn sim_context(max_nhg_count: u32) -> (NhgContext, SimEnv) {
    let env = SimEnv {
        sai: Arc::new(SimSai::new()),
        neigh: Arc::new(SimNeighbors::new()),
        crm: Arc::new(CrmUsage::new()),
        budget: Arc::new(NhgBudget::new(max_nhg_count)),
    };
    (env.context(), env)
}

/// A resolved neighbor in a replay file.
#[derive(Debug, Clone, Deserialize)]
pub struct NeighborRecord {
    /// `[labels+]ip@alias`
    pub next_hop: String,
    #[serde(default)]
    pub if_down: bool,
}

/// One change-feed entry in a replay file.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayOp {
    pub table: String,
    #[serde(flatten)]
    pub entry: KeyOpFieldsValues,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn nh(s: &str) -> NextHopKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_sai_bulk_and_group_removal() {
        let sai = SimSai::new();
        let group = sai
            .create_next_hop_group(&[NextHopGroupAttr::Type(NextHopGroupType::Ecmp)])
            .unwrap();

        let attrs = vec![
            NextHopGroupMemberAttr::NextHopGroupId(group),
            NextHopGroupMemberAttr::NextHopId(0x4001),
        ];
        let results = sai.create_next_hop_group_members(&[attrs.clone(), attrs]);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(sai.group_members(group.as_raw()).len(), 2);

        assert!(matches!(
            sai.remove_next_hop_group(group),
            Err(SaiError::ObjectInUse { .. })
        ));

        let oids: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        assert!(sai.remove_next_hop_group_members(&oids).iter().all(|r| r.is_ok()));
        assert!(sai.remove_next_hop_group(group).is_ok());
        assert_eq!(sai.group_count(), 0);
    }

    #[test]
    fn test_sai_fault_fails_first_entry_once() {
        let sai = SimSai::new();
        let group = sai.create_next_hop_group(&[]).unwrap();
        let attrs = vec![
            NextHopGroupMemberAttr::NextHopGroupId(group),
            NextHopGroupMemberAttr::NextHopId(0x4001),
        ];

        sai.fail_next(SimFault::CreateMember);
        let results = sai.create_next_hop_group_members(&[attrs.clone(), attrs.clone()]);
        assert!(results[0].is_err());
        assert!(results[1].is_ok());

        let results = sai.create_next_hop_group_members(&[attrs]);
        assert!(results[0].is_ok());
    }

    #[test]
    fn test_switch_query() {
        assert!(SimSai::new().get_number_of_ecmp_groups().is_err());
        assert_eq!(
            SimSai::new()
                .with_max_ecmp_groups(512)
                .get_number_of_ecmp_groups()
                .unwrap(),
            512
        );
    }

    #[test]
    fn test_neighbors() {
        let neigh = SimNeighbors::new();
        let id = neigh.add_resolved(&nh("10.0.0.1@Ethernet0"));
        assert_eq!(neigh.get_next_hop_id(&nh("10.0.0.1@Ethernet0")), id);
        assert!(neigh.get_next_hop_id(&nh("10.0.0.3@Ethernet4")).is_null());

        assert!(!neigh.add_next_hop(&nh("100+10.0.0.3@Ethernet4")));
        assert!(neigh.add_next_hop(&nh("100+10.0.0.1@Ethernet0")));

        neigh.increase_next_hop_ref_count(&nh("100+10.0.0.1@Ethernet0"));
        assert!(!neigh.remove_next_hop(&nh("100+10.0.0.1@Ethernet0")));
        neigh.decrease_next_hop_ref_count(&nh("100+10.0.0.1@Ethernet0"));
        assert!(neigh.remove_next_hop(&nh("100+10.0.0.1@Ethernet0")));

        neigh.set_if_down(&nh("10.0.0.1@Ethernet0"), true);
        assert!(neigh.is_next_hop_flag_set(&nh("10.0.0.1@Ethernet0"), NextHopFlags::IF_DOWN));
    }

    #[test]
    fn test_replay_op_parsing() {
        let op: ReplayOp = serde_json::from_str(
            r#"{"table": "NEXTHOP_GROUP_TABLE", "key": "group1", "op": "SET",
                "fvs": [["nexthop", "10.0.0.1"], ["ifname", "Ethernet0"]]}"#,
        )
        .unwrap();
        assert_eq!(op.table, "NEXTHOP_GROUP_TABLE");
        assert_eq!(op.entry.get_field("ifname"), Some("Ethernet0"));
    }
}

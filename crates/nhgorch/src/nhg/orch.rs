//! Next hop group orchestration.
//!
//! [`NhgOrch`] consumes `NEXTHOP_GROUP_TABLE` and
//! `CLASS_BASED_NEXT_HOP_GROUP_TABLE`, keeps one entry table per group kind
//! and serves both through a single index-keyed façade.

use super::budget::NhgBudget;
use super::cbf::CbfNhg;
use super::config::{ConfigError, NhgOrchConfig};
use super::context::NhgContext;
use super::group::Nhg;
use super::group_key::{NextHopGroupKey, NextHopGroupKeyError};
use super::nexthop_key::{NextHopKey, NH_DELIMITER, NHG_DELIMITER};
use super::table::NhgTable;
use super::validation::{validate_cbf_data, CbfValidationError};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::{audit_log, debug_log, error_log, info_log, warn_log};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use sonic_orch_common::{Consumer, ConsumerConfig, KeyOpFieldsValues, Operation, Orch, TaskStatus};
use sonic_sai::{RawSaiObjectId, SaiError};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub const NEXTHOP_GROUP_TABLE: &str = "NEXTHOP_GROUP_TABLE";
pub const CBF_NEXTHOP_GROUP_TABLE: &str = "CLASS_BASED_NEXT_HOP_GROUP_TABLE";

const FIELD_NEXTHOP: &str = "nexthop";
const FIELD_IFNAME: &str = "ifname";
const FIELD_WEIGHT: &str = "weight";
const FIELD_MEMBERS: &str = "members";
const FIELD_CLASS_MAP: &str = "class_map";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NhgOrchError {
    #[error("NHG not found: {0}")]
    NhgNotFound(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid CBF data: {0}")]
    InvalidCbf(String),
    #[error("No resolvable next hop in group: {0}")]
    NoResolvableNextHop(String),
    #[error("Unknown table: {0}")]
    UnknownTable(String),
    #[error("SAI error: {0}")]
    Sai(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<NextHopGroupKeyError> for NhgOrchError {
    fn from(e: NextHopGroupKeyError) -> Self {
        NhgOrchError::ParseError(e.to_string())
    }
}

impl From<CbfValidationError> for NhgOrchError {
    fn from(e: CbfValidationError) -> Self {
        NhgOrchError::InvalidCbf(e.to_string())
    }
}

impl From<SaiError> for NhgOrchError {
    fn from(e: SaiError) -> Self {
        NhgOrchError::Sai(e.to_string())
    }
}

impl From<ConfigError> for NhgOrchError {
    fn from(e: ConfigError) -> Self {
        NhgOrchError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NhgOrchError>;

/// Which table an index lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NhgKind {
    Plain,
    Cbf,
}

/// Read-only snapshot of a group, as handed to route installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupView {
    pub index: String,
    pub kind: NhgKind,
    pub id: RawSaiObjectId,
    /// Next hop group key, or the comma list of member indices for CBF.
    pub key: String,
    pub size: usize,
    pub is_temp: bool,
    pub ref_count: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NhgOrchStats {
    pub nhgs_created: u64,
    pub nhgs_updated: u64,
    pub nhgs_removed: u64,
    pub temp_nhgs_created: u64,
    pub cbf_nhgs_created: u64,
    pub cbf_nhgs_updated: u64,
    pub cbf_nhgs_removed: u64,
    pub invalid_entries: u64,
    pub retries: u64,
}

pub struct NhgOrch {
    ctx: NhgContext,
    config: NhgOrchConfig,
    stats: NhgOrchStats,
    nhg_consumer: Consumer,
    cbf_consumer: Consumer,
    nhgs: NhgTable<Nhg>,
    cbf_nhgs: NhgTable<CbfNhg>,
    rng: StdRng,
}

impl NhgOrch {
    pub fn new(ctx: NhgContext, config: NhgOrchConfig) -> Self {
        let rng = match config.temp_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let nhg_consumer = Consumer::new(
            ConsumerConfig::new(NEXTHOP_GROUP_TABLE).with_batch_size(config.consumer_batch_size),
        );
        let cbf_consumer = Consumer::new(
            ConsumerConfig::new(CBF_NEXTHOP_GROUP_TABLE)
                .with_batch_size(config.consumer_batch_size),
        );

        info_log!(
            "NhgOrch",
            max_nhg_count = ctx.budget.max(),
            "Next hop group orchestration initialized"
        );

        Self {
            ctx,
            config,
            stats: NhgOrchStats::default(),
            nhg_consumer,
            cbf_consumer,
            nhgs: NhgTable::new(),
            cbf_nhgs: NhgTable::new(),
            rng,
        }
    }

    pub fn config(&self) -> &NhgOrchConfig {
        &self.config
    }

    pub fn stats(&self) -> &NhgOrchStats {
        &self.stats
    }

    pub fn budget(&self) -> &Arc<NhgBudget> {
        &self.ctx.budget
    }

    /// Queues change-feed entries for the named table.
    pub fn add_to_sync(&mut self, table: &str, entries: Vec<KeyOpFieldsValues>) -> Result<()> {
        match table {
            NEXTHOP_GROUP_TABLE => self.nhg_consumer.add_to_sync(entries),
            CBF_NEXTHOP_GROUP_TABLE => self.cbf_consumer.add_to_sync(entries),
            _ => return Err(NhgOrchError::UnknownTable(table.to_string())),
        }
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.nhg_consumer.pending_count() + self.cbf_consumer.pending_count()
    }

    // ------------------------------------------------------------------
    // Façade
    // ------------------------------------------------------------------

    /// Resolves an index to its table. Plain groups shadow CBF groups.
    pub fn lookup(&self, index: &str) -> Option<NhgKind> {
        if self.nhgs.contains(index) {
            Some(NhgKind::Plain)
        } else if self.cbf_nhgs.contains(index) {
            Some(NhgKind::Cbf)
        } else {
            None
        }
    }

    pub fn has_nhg(&self, index: &str) -> bool {
        self.lookup(index).is_some()
    }

    pub fn get_nhg(&self, index: &str) -> Result<GroupView> {
        match self.lookup(index) {
            Some(NhgKind::Plain) => self.plain_view(index),
            Some(NhgKind::Cbf) => self.cbf_view(index),
            None => Err(NhgOrchError::NhgNotFound(index.to_string())),
        }
    }

    pub fn plain_group(&self, index: &str) -> Option<&Nhg> {
        self.nhgs.get(index).map(|e| &e.nhg)
    }

    pub fn cbf_group(&self, index: &str) -> Option<&CbfNhg> {
        self.cbf_nhgs.get(index).map(|e| &e.nhg)
    }

    /// Declares one more external user of the group. Returns the new count.
    pub fn inc_nhg_ref_count(&self, index: &str) -> Result<u32> {
        let count = match self.lookup(index) {
            Some(NhgKind::Plain) => self.nhgs.get(index).map(|e| e.inc_ref()),
            Some(NhgKind::Cbf) => self.cbf_nhgs.get(index).map(|e| e.inc_ref()),
            None => None,
        };
        let count = count.ok_or_else(|| NhgOrchError::NhgNotFound(index.to_string()))?;
        debug_log!("NhgOrch", index = %index, ref_count = count, "Increased group ref count");
        Ok(count)
    }

    /// Releases one external user of the group. Panics when the count is
    /// already 0.
    pub fn dec_nhg_ref_count(&self, index: &str) -> Result<u32> {
        let count = match self.lookup(index) {
            Some(NhgKind::Plain) => self.nhgs.get(index).map(|e| e.dec_ref(index)),
            Some(NhgKind::Cbf) => self.cbf_nhgs.get(index).map(|e| e.dec_ref(index)),
            None => None,
        };
        let count = count.ok_or_else(|| NhgOrchError::NhgNotFound(index.to_string()))?;
        debug_log!("NhgOrch", index = %index, ref_count = count, "Decreased group ref count");
        Ok(count)
    }

    /// Adds `nh` back to every multi-member group containing it.
    pub fn validate_next_hop(&mut self, nh: &NextHopKey) -> bool {
        let mut success = true;
        for (index, entry) in self.nhgs.iter_mut() {
            if entry.nhg.has_member(nh) && !entry.nhg.validate_next_hop(nh) {
                warn_log!("NhgOrch", index = %index, next_hop = %nh, "Failed to validate next hop");
                success = false;
            }
        }
        success
    }

    /// Removes `nh` from every multi-member group containing it.
    pub fn invalidate_next_hop(&mut self, nh: &NextHopKey) -> bool {
        let mut success = true;
        for (index, entry) in self.nhgs.iter_mut() {
            if entry.nhg.has_member(nh) && !entry.nhg.invalidate_next_hop(nh) {
                warn_log!("NhgOrch", index = %index, next_hop = %nh, "Failed to invalidate next hop");
                success = false;
            }
        }
        success
    }

    pub fn max_nhg_count(&self) -> u32 {
        self.ctx.budget.max()
    }

    pub fn synced_nhg_count(&self) -> u32 {
        self.ctx.budget.used()
    }

    /// Every group, plain groups first, in index order.
    pub fn dump(&self) -> Vec<GroupView> {
        let plain = self
            .nhgs
            .iter()
            .filter_map(|(index, _)| self.plain_view(index).ok());
        let cbf = self
            .cbf_nhgs
            .iter()
            .filter_map(|(index, _)| self.cbf_view(index).ok());
        plain.chain(cbf).collect()
    }

    fn plain_view(&self, index: &str) -> Result<GroupView> {
        let entry = self
            .nhgs
            .get(index)
            .ok_or_else(|| NhgOrchError::NhgNotFound(index.to_string()))?;
        Ok(GroupView {
            index: index.to_string(),
            kind: NhgKind::Plain,
            id: entry.nhg.id(),
            key: entry.nhg.key().to_string(),
            size: entry.nhg.len(),
            is_temp: entry.nhg.is_temp(),
            ref_count: entry.ref_count(),
        })
    }

    fn cbf_view(&self, index: &str) -> Result<GroupView> {
        let entry = self
            .cbf_nhgs
            .get(index)
            .ok_or_else(|| NhgOrchError::NhgNotFound(index.to_string()))?;
        Ok(GroupView {
            index: index.to_string(),
            kind: NhgKind::Cbf,
            id: entry.nhg.id(),
            key: entry.nhg.members().join(","),
            size: entry.nhg.len(),
            is_temp: false,
            ref_count: entry.ref_count(),
        })
    }

    // ------------------------------------------------------------------
    // Change-feed processing
    // ------------------------------------------------------------------

    /// Applies a drained batch and returns the entries to keep pending.
    fn process_batch(
        &mut self,
        kind: NhgKind,
        entries: Vec<KeyOpFieldsValues>,
    ) -> Vec<KeyOpFieldsValues> {
        let mut key_counts: BTreeMap<String, usize> = BTreeMap::new();
        for entry in &entries {
            *key_counts.entry(entry.key.clone()).or_default() += 1;
        }

        let mut unfinished = Vec::new();
        for entry in entries {
            debug_log!("NhgOrch", index = %entry.key, op = %entry.op, kind = ?kind, "Processing entry");

            let status = match entry.op {
                // A DEL sharing the batch with another operation on the same
                // index is superseded by it.
                Operation::Del if key_counts.get(&entry.key).copied().unwrap_or(0) > 1 => {
                    info_log!(
                        "NhgOrch",
                        index = %entry.key,
                        "Skipping delete, another operation is pending for the group"
                    );
                    TaskStatus::Ignore
                }
                Operation::Set => match kind {
                    NhgKind::Plain => self.process_nhg_set(&entry),
                    NhgKind::Cbf => self.process_cbf_set(&entry),
                },
                Operation::Del => match kind {
                    NhgKind::Plain => self.process_nhg_del(&entry.key),
                    NhgKind::Cbf => self.process_cbf_del(&entry.key),
                },
            };

            match status {
                TaskStatus::InvalidEntry => self.stats.invalid_entries += 1,
                s if s.keeps_pending() => {
                    self.stats.retries += 1;
                    unfinished.push(entry);
                }
                _ => {}
            }
        }

        unfinished
    }

    fn process_nhg_set(&mut self, entry: &KeyOpFieldsValues) -> TaskStatus {
        let index = entry.key.as_str();
        let key = match parse_nhg_fields(entry) {
            Ok(key) => key,
            Err(e) => {
                error_log!("NhgOrch", index = %index, error = %e, "Invalid next hop group entry");
                audit_log!(
                    AuditRecord::new(AuditCategory::ErrorCondition, "NhgOrch", "parse_nhg")
                        .with_object_id(index)
                        .with_object_type("next_hop_group")
                        .with_error(e.to_string())
                );
                return TaskStatus::InvalidEntry;
            }
        };

        if self.nhgs.contains(index) {
            self.update_nhg(index, key)
        } else {
            self.create_nhg(index, key)
        }
    }

    fn create_nhg(&mut self, index: &str, key: NextHopGroupKey) -> TaskStatus {
        info_log!("NhgOrch", index = %index, key = %key, "Adding next hop group");

        if key.len() > 1 && !self.ctx.budget.has_capacity() {
            warn_log!(
                "NhgOrch",
                index = %index,
                max = self.ctx.budget.max(),
                "Next hop group count reached its limit"
            );
            self.add_temp_nhg(index, &key);
            return TaskStatus::NeedRetry;
        }

        let mut nhg = Nhg::new(key, self.ctx.clone());
        if nhg.sync() {
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceCreate, "NhgOrch", "create_nhg")
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(index)
                    .with_object_type("next_hop_group")
                    .with_details(serde_json::json!({
                        "key": nhg.key().to_string(),
                        "sai_id": format!("{:#x}", nhg.id()),
                        "size": nhg.len(),
                    }))
            );
            self.nhgs.insert(index, nhg);
            self.stats.nhgs_created += 1;
            return TaskStatus::Success;
        }

        if !nhg.desync() {
            error_log!("NhgOrch", index = %index, "Failed to roll back next hop group");
        }
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceCreate, "NhgOrch", "create_nhg")
                .with_object_id(index)
                .with_object_type("next_hop_group")
                .with_error("failed to sync next hop group")
        );
        TaskStatus::Failed
    }

    /// Registers a temporary stand-in for `key` under `index`.
    fn add_temp_nhg(&mut self, index: &str, key: &NextHopGroupKey) {
        let mut nhg = match Nhg::create_temp(key, self.ctx.clone(), &mut self.rng) {
            Ok(nhg) => nhg,
            Err(e) => {
                warn_log!("NhgOrch", index = %index, error = %e, "Failed to create temporary group");
                return;
            }
        };

        if !nhg.sync() {
            warn_log!("NhgOrch", index = %index, key = %key, "Failed to sync temporary group");
            return;
        }

        audit_log!(
            AuditRecord::new(AuditCategory::ResourceCreate, "NhgOrch", "create_temp_nhg")
                .with_outcome(AuditOutcome::InProgress)
                .with_object_id(index)
                .with_object_type("next_hop_group")
                .with_details(serde_json::json!({
                    "key": key.to_string(),
                    "temp_key": nhg.key().to_string(),
                    "sai_id": format!("{:#x}", nhg.id()),
                }))
        );
        self.stats.temp_nhgs_created += 1;

        match self.nhgs.get_mut(index) {
            // Only the group is replaced so the ref count survives.
            Some(entry) => {
                let mut old = std::mem::replace(&mut entry.nhg, nhg);
                old.desync();
            }
            None => self.nhgs.insert(index, nhg),
        }
    }

    fn update_nhg(&mut self, index: &str, key: NextHopGroupKey) -> TaskStatus {
        let has_capacity = self.ctx.budget.has_capacity();
        let Some(entry) = self.nhgs.get_mut(index) else {
            return TaskStatus::Failed;
        };
        let ref_count = entry.ref_count();
        let nhg = &mut entry.nhg;

        if !nhg.is_temp() && nhg.is_fully_synced() && *nhg.key() == key {
            debug_log!("NhgOrch", index = %index, "Next hop group unchanged");
            return TaskStatus::Success;
        }

        info_log!("NhgOrch", index = %index, key = %key, "Updating next hop group");

        if !nhg.is_temp() && (key.len() == 1 || nhg.len() == 1) && ref_count > 0 {
            warn_log!(
                "NhgOrch",
                index = %index,
                ref_count,
                "Next hop group update would change SAI ID while referenced, so not performed"
            );
            return TaskStatus::NeedRetry;
        }

        if nhg.is_temp() && key.len() > 1 && !has_capacity {
            if !key.contains_group(nhg.key()) {
                info_log!("NhgOrch", index = %index, key = %key, "Updating temporary group");
                self.add_temp_nhg(index, &key);
            }
            return TaskStatus::NeedRetry;
        }

        if key.len() > 1 && (nhg.len() == 1 || !nhg.is_synced()) && !has_capacity {
            warn_log!(
                "NhgOrch",
                index = %index,
                "Next hop group count reached its limit, keeping current group"
            );
            return TaskStatus::NeedRetry;
        }

        let was_temp = nhg.is_temp();
        let success = nhg.update(&key) && (nhg.is_synced() || nhg.sync());

        let record = AuditRecord::new(AuditCategory::ResourceModify, "NhgOrch", "update_nhg")
            .with_object_id(index)
            .with_object_type("next_hop_group")
            .with_details(serde_json::json!({
                "key": key.to_string(),
                "sai_id": format!("{:#x}", nhg.id()),
                "promoted": was_temp && !nhg.is_temp(),
            }));
        if success {
            audit_log!(record.with_outcome(AuditOutcome::Success));
            self.stats.nhgs_updated += 1;
        } else {
            audit_log!(record.with_error("failed to update next hop group"));
        }

        TaskStatus::from_success(success)
    }

    fn process_nhg_del(&mut self, index: &str) -> TaskStatus {
        info_log!("NhgOrch", index = %index, "Deleting next hop group");

        let Some(entry) = self.nhgs.get_mut(index) else {
            warn_log!("NhgOrch", index = %index, "Unable to find group to remove");
            return TaskStatus::Success;
        };

        if entry.ref_count() > 0 {
            warn_log!(
                "NhgOrch",
                index = %index,
                ref_count = entry.ref_count(),
                "Unable to remove group which is referenced"
            );
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceDelete, "NhgOrch", "remove_nhg")
                    .with_outcome(AuditOutcome::Denied)
                    .with_object_id(index)
                    .with_object_type("next_hop_group")
            );
            return TaskStatus::NeedRetry;
        }

        if !entry.nhg.desync() {
            error_log!("NhgOrch", index = %index, "Failed to remove next hop group");
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceDelete, "NhgOrch", "remove_nhg")
                    .with_object_id(index)
                    .with_object_type("next_hop_group")
                    .with_error("failed to desync next hop group")
            );
            return TaskStatus::Failed;
        }

        self.nhgs.remove(index);
        self.stats.nhgs_removed += 1;
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceDelete, "NhgOrch", "remove_nhg")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(index)
                .with_object_type("next_hop_group")
        );
        TaskStatus::Success
    }

    fn process_cbf_set(&mut self, entry: &KeyOpFieldsValues) -> TaskStatus {
        let index = entry.key.as_str();
        let members = entry.get_field(FIELD_MEMBERS).unwrap_or("");
        let class_map = entry.get_field(FIELD_CLASS_MAP).unwrap_or("");

        let data = match validate_cbf_data(members, class_map) {
            Ok(data) => data,
            Err(e) => {
                error_log!("CbfNhgOrch", index = %index, error = %e, "Invalid CBF group entry");
                audit_log!(
                    AuditRecord::new(AuditCategory::ErrorCondition, "CbfNhgOrch", "validate_cbf_nhg")
                        .with_object_id(index)
                        .with_object_type("cbf_next_hop_group")
                        .with_error(NhgOrchError::from(e).to_string())
                        .with_details(serde_json::json!({
                            "members": members,
                            "class_map": class_map,
                        }))
                );
                return TaskStatus::InvalidEntry;
            }
        };

        let success = match self.cbf_nhgs.get_mut(index) {
            Some(existing) => {
                info_log!("CbfNhgOrch", index = %index, members = %members, "Updating CBF group");
                let ok = existing.nhg.update(&self.nhgs, data.members, data.class_map);
                let record =
                    AuditRecord::new(AuditCategory::ResourceModify, "CbfNhgOrch", "update_cbf_nhg")
                        .with_object_id(index)
                        .with_object_type("cbf_next_hop_group");
                if ok {
                    audit_log!(record.with_outcome(AuditOutcome::Success));
                    self.stats.cbf_nhgs_updated += 1;
                } else {
                    audit_log!(record.with_error("failed to update CBF group"));
                }
                ok
            }
            None => {
                info_log!("CbfNhgOrch", index = %index, members = %members, "Adding CBF group");
                if !self.ctx.budget.has_capacity() {
                    warn_log!(
                        "CbfNhgOrch",
                        index = %index,
                        max = self.ctx.budget.max(),
                        "Next hop group count reached its limit, deferring CBF group"
                    );
                    return TaskStatus::NeedRetry;
                }

                let mut cbf =
                    CbfNhg::new(index, data.members, data.class_map, self.ctx.clone());
                if cbf.sync(&self.nhgs) {
                    audit_log!(
                        AuditRecord::new(AuditCategory::ResourceCreate, "CbfNhgOrch", "create_cbf_nhg")
                            .with_outcome(AuditOutcome::Success)
                            .with_object_id(index)
                            .with_object_type("cbf_next_hop_group")
                            .with_details(serde_json::json!({
                                "members": cbf.members(),
                                "sai_id": format!("{:#x}", cbf.id()),
                            }))
                    );
                    self.cbf_nhgs.insert(index, cbf);
                    self.stats.cbf_nhgs_created += 1;
                    true
                } else {
                    if !cbf.desync(&self.nhgs) {
                        error_log!("CbfNhgOrch", index = %index, "Failed to roll back CBF group");
                    }
                    audit_log!(
                        AuditRecord::new(AuditCategory::ResourceCreate, "CbfNhgOrch", "create_cbf_nhg")
                            .with_object_id(index)
                            .with_object_type("cbf_next_hop_group")
                            .with_error("failed to sync CBF group")
                    );
                    false
                }
            }
        };

        if !success {
            return TaskStatus::Failed;
        }

        match self.cbf_nhgs.get(index) {
            Some(entry) if entry.nhg.has_temps() => {
                info_log!(
                    "CbfNhgOrch",
                    index = %index,
                    temps = ?entry.nhg.temp_members().collect::<Vec<_>>(),
                    "CBF group has temporary members, keeping it pending"
                );
                TaskStatus::NeedRetry
            }
            _ => TaskStatus::Success,
        }
    }

    fn process_cbf_del(&mut self, index: &str) -> TaskStatus {
        info_log!("CbfNhgOrch", index = %index, "Deleting CBF group");

        let Some(entry) = self.cbf_nhgs.get_mut(index) else {
            warn_log!("CbfNhgOrch", index = %index, "Unable to find CBF group to remove");
            return TaskStatus::Success;
        };

        if entry.ref_count() > 0 {
            warn_log!(
                "CbfNhgOrch",
                index = %index,
                ref_count = entry.ref_count(),
                "Unable to remove CBF group which is referenced"
            );
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceDelete, "CbfNhgOrch", "remove_cbf_nhg")
                    .with_outcome(AuditOutcome::Denied)
                    .with_object_id(index)
                    .with_object_type("cbf_next_hop_group")
            );
            return TaskStatus::NeedRetry;
        }

        if !entry.nhg.desync(&self.nhgs) {
            error_log!("CbfNhgOrch", index = %index, "Failed to remove CBF group");
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceDelete, "CbfNhgOrch", "remove_cbf_nhg")
                    .with_object_id(index)
                    .with_object_type("cbf_next_hop_group")
                    .with_error("failed to desync CBF group")
            );
            return TaskStatus::Failed;
        }

        self.cbf_nhgs.remove(index);
        self.stats.cbf_nhgs_removed += 1;
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceDelete, "CbfNhgOrch", "remove_cbf_nhg")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(index)
                .with_object_type("cbf_next_hop_group")
        );
        TaskStatus::Success
    }
}

/// Builds a group key from the `nexthop`, `ifname` and `weight` fields.
fn parse_nhg_fields(entry: &KeyOpFieldsValues) -> Result<NextHopGroupKey> {
    let ips = entry
        .get_field(FIELD_NEXTHOP)
        .ok_or_else(|| NhgOrchError::ParseError(format!("missing field '{}'", FIELD_NEXTHOP)))?;
    let aliases = entry.get_field(FIELD_IFNAME).unwrap_or("");
    let weights = entry.get_field(FIELD_WEIGHT).unwrap_or("");

    let ipv: Vec<&str> = ips.split(NHG_DELIMITER).collect();
    let alsv: Vec<&str> = aliases.split(NHG_DELIMITER).collect();
    if ipv.len() != alsv.len() {
        return Err(NhgOrchError::ParseError(format!(
            "{} next hops but {} interfaces",
            ipv.len(),
            alsv.len()
        )));
    }

    let nhg_str = ipv
        .iter()
        .zip(&alsv)
        .map(|(ip, alias)| format!("{}{}{}", ip, NH_DELIMITER, alias))
        .collect::<Vec<_>>()
        .join(",");

    Ok(NextHopGroupKey::with_weights(&nhg_str, weights)?)
}

#[async_trait]
impl Orch for NhgOrch {
    fn name(&self) -> &str {
        "NhgOrch"
    }

    /// Plain groups are processed before CBF groups so CBF members can
    /// resolve groups added in the same drive.
    async fn do_task(&mut self) {
        let entries = self.nhg_consumer.drain();
        if !entries.is_empty() {
            let unfinished = self.process_batch(NhgKind::Plain, entries);
            self.nhg_consumer.retry_all(unfinished);
        }

        let entries = self.cbf_consumer.drain();
        if !entries.is_empty() {
            let unfinished = self.process_batch(NhgKind::Cbf, entries);
            self.cbf_consumer.retry_all(unfinished);
        }
    }

    fn has_pending_tasks(&self) -> bool {
        self.nhg_consumer.has_pending() || self.cbf_consumer.has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        let mut dump = self.nhg_consumer.dump();
        dump.extend(self.cbf_consumer.dump());
        dump
    }
}

impl Drop for NhgOrch {
    fn drop(&mut self) {
        for (index, mut entry) in self.cbf_nhgs.drain() {
            if !entry.nhg.desync(&self.nhgs) {
                error_log!("CbfNhgOrch", index = %index, "Failed to release CBF group on shutdown");
            }
        }
        for (index, mut entry) in self.nhgs.drain() {
            if !entry.nhg.desync() {
                error_log!("NhgOrch", index = %index, "Failed to release group on shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{sim_context, SaiCall, SimEnv, SimFault};
    use pretty_assertions::assert_eq;
    use sonic_orch_common::FieldValue;

    fn fv(field: &str, value: &str) -> FieldValue {
        (field.to_string(), value.to_string())
    }

    fn nhg_set(index: &str, ips: &str, ifnames: &str) -> KeyOpFieldsValues {
        KeyOpFieldsValues::set(index, vec![fv("nexthop", ips), fv("ifname", ifnames)])
    }

    fn nh(s: &str) -> NextHopKey {
        s.parse().unwrap()
    }

    fn orch_with(max: u32, resolved: &[&str]) -> (NhgOrch, SimEnv) {
        let (ctx, env) = sim_context(max);
        for s in resolved {
            env.neigh.add_resolved(&nh(s));
        }
        (NhgOrch::new(ctx, NhgOrchConfig::default().with_seed(1)), env)
    }

    // 1. Façade Tests

    #[test]
    fn test_unknown_index() {
        let (mut orch, _env) = orch_with(4, &[]);

        assert!(!orch.has_nhg("group1"));
        assert_eq!(orch.lookup("group1"), None);
        assert!(matches!(orch.get_nhg("group1"), Err(NhgOrchError::NhgNotFound(_))));
        assert!(matches!(orch.inc_nhg_ref_count("group1"), Err(NhgOrchError::NhgNotFound(_))));
        assert!(matches!(orch.dec_nhg_ref_count("group1"), Err(NhgOrchError::NhgNotFound(_))));
        assert!(matches!(
            orch.add_to_sync("ROUTE_TABLE", vec![]),
            Err(NhgOrchError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_ref_counting() {
        let (mut orch, _env) = orch_with(4, &["10.0.0.1@Ethernet0"]);
        let status = orch.process_nhg_set(&nhg_set("group1", "10.0.0.1", "Ethernet0"));
        assert_eq!(status, TaskStatus::Success);

        assert_eq!(orch.inc_nhg_ref_count("group1").unwrap(), 1);
        assert_eq!(orch.inc_nhg_ref_count("group1").unwrap(), 2);
        assert_eq!(orch.dec_nhg_ref_count("group1").unwrap(), 1);
        assert_eq!(orch.get_nhg("group1").unwrap().ref_count, 1);
    }

    #[test]
    #[should_panic(expected = "below zero")]
    fn test_dec_ref_below_zero_panics() {
        let (mut orch, _env) = orch_with(4, &["10.0.0.1@Ethernet0"]);
        orch.process_nhg_set(&nhg_set("group1", "10.0.0.1", "Ethernet0"));
        let _ = orch.dec_nhg_ref_count("group1");
    }

    #[test]
    fn test_get_nhg_view() {
        let (mut orch, env) = orch_with(4, &["10.0.0.1@Ethernet0", "10.0.0.3@Ethernet4"]);
        orch.process_nhg_set(&nhg_set("group1", "10.0.0.1,10.0.0.3", "Ethernet0,Ethernet4"));

        let view = orch.get_nhg("group1").unwrap();
        assert_eq!(view.kind, NhgKind::Plain);
        assert_eq!(view.key, "10.0.0.1@Ethernet0,10.0.0.3@Ethernet4");
        assert_eq!(view.size, 2);
        assert!(!view.is_temp);
        let created = env.sai.calls().iter().find_map(|c| match c {
            SaiCall::CreateGroup { oid, .. } => Some(*oid),
            _ => None,
        });
        assert_eq!(Some(view.id), created);
        assert_eq!(orch.synced_nhg_count(), 1);
        assert_eq!(orch.max_nhg_count(), 4);
    }

    // 2. Plain SET/DEL Tests

    #[test]
    fn test_malformed_entry_is_dropped() {
        let (mut orch, _env) = orch_with(4, &[]);

        let status = orch.process_nhg_set(&nhg_set("group1", "10.0.0.1,10.0.0.3", "Ethernet0"));
        assert_eq!(status, TaskStatus::InvalidEntry);

        let status = orch.process_nhg_set(&KeyOpFieldsValues::set("group1", vec![]));
        assert_eq!(status, TaskStatus::InvalidEntry);

        let status = orch.process_nhg_set(&nhg_set("group1", "bogus", "Ethernet0"));
        assert_eq!(status, TaskStatus::InvalidEntry);
        assert!(!orch.has_nhg("group1"));
    }

    #[test]
    fn test_weights_from_fields() {
        let (mut orch, _env) = orch_with(4, &["10.0.0.1@Ethernet0", "10.0.0.3@Ethernet4"]);
        let entry = KeyOpFieldsValues::set(
            "group1",
            vec![
                fv("nexthop", "10.0.0.1,10.0.0.3"),
                fv("ifname", "Ethernet0,Ethernet4"),
                fv("weight", "3,7"),
            ],
        );
        assert_eq!(orch.process_nhg_set(&entry), TaskStatus::Success);

        let nhg = orch.plain_group("group1").unwrap();
        assert_eq!(nhg.weight_of(&nh("10.0.0.3@Ethernet4")), 7);
    }

    #[test]
    fn test_unresolved_create_fails_and_rolls_back() {
        let (mut orch, env) = orch_with(4, &["10.0.0.1@Ethernet0"]);

        let status =
            orch.process_nhg_set(&nhg_set("group1", "10.0.0.1,10.0.0.3", "Ethernet0,Ethernet4"));
        assert_eq!(status, TaskStatus::Failed);
        assert!(!orch.has_nhg("group1"));
        assert_eq!(env.budget.used(), 0);
        assert_eq!(env.sai.group_count(), 0);
    }

    #[test]
    fn test_referenced_single_member_update_is_deferred() {
        let (mut orch, _env) = orch_with(4, &["10.0.0.1@Ethernet0", "10.0.0.3@Ethernet4"]);
        orch.process_nhg_set(&nhg_set("group1", "10.0.0.1", "Ethernet0"));
        orch.inc_nhg_ref_count("group1").unwrap();
        let id = orch.get_nhg("group1").unwrap().id;

        let status =
            orch.process_nhg_set(&nhg_set("group1", "10.0.0.1,10.0.0.3", "Ethernet0,Ethernet4"));
        assert_eq!(status, TaskStatus::NeedRetry);
        assert_eq!(orch.get_nhg("group1").unwrap().id, id);

        orch.dec_nhg_ref_count("group1").unwrap();
        let status =
            orch.process_nhg_set(&nhg_set("group1", "10.0.0.1,10.0.0.3", "Ethernet0,Ethernet4"));
        assert_eq!(status, TaskStatus::Success);
        assert_ne!(orch.get_nhg("group1").unwrap().id, id);
    }

    #[test]
    fn test_unchanged_set_is_noop() {
        let (mut orch, env) = orch_with(4, &["10.0.0.1@Ethernet0"]);
        orch.process_nhg_set(&nhg_set("group1", "10.0.0.1", "Ethernet0"));
        orch.inc_nhg_ref_count("group1").unwrap();
        env.sai.clear_calls();

        let status = orch.process_nhg_set(&nhg_set("group1", "10.0.0.1", "Ethernet0"));
        assert_eq!(status, TaskStatus::Success);
        assert!(env.sai.calls().is_empty());
    }

    #[test]
    fn test_failed_member_sync_is_retried() {
        let (mut orch, env) = orch_with(
            4,
            &["10.0.0.1@Ethernet0", "10.0.0.2@Ethernet4", "10.0.0.3@Ethernet8"],
        );
        let status =
            orch.process_nhg_set(&nhg_set("group1", "10.0.0.1,10.0.0.2", "Ethernet0,Ethernet4"));
        assert_eq!(status, TaskStatus::Success);
        let id = orch.get_nhg("group1").unwrap().id;

        let update = nhg_set("group1", "10.0.0.2,10.0.0.3", "Ethernet4,Ethernet8");
        env.sai.fail_next(SimFault::CreateMember);
        assert_eq!(orch.process_nhg_set(&update), TaskStatus::Failed);
        assert_eq!(env.sai.group_members(id).len(), 1);
        assert!(!orch.plain_group("group1").unwrap().is_fully_synced());

        assert_eq!(orch.process_nhg_set(&update), TaskStatus::Success);
        assert_eq!(env.sai.group_members(id).len(), 2);
        assert!(orch.plain_group("group1").unwrap().is_fully_synced());
        assert_eq!(env.neigh.ref_count(&nh("10.0.0.3@Ethernet8")), 1);
    }

    #[test]
    fn test_delete_referenced_group_waits() {
        let (mut orch, env) = orch_with(4, &["10.0.0.1@Ethernet0", "10.0.0.3@Ethernet4"]);
        orch.process_nhg_set(&nhg_set("group1", "10.0.0.1,10.0.0.3", "Ethernet0,Ethernet4"));
        orch.inc_nhg_ref_count("group1").unwrap();

        assert_eq!(orch.process_nhg_del("group1"), TaskStatus::NeedRetry);
        assert!(orch.has_nhg("group1"));

        orch.dec_nhg_ref_count("group1").unwrap();
        assert_eq!(orch.process_nhg_del("group1"), TaskStatus::Success);
        assert!(!orch.has_nhg("group1"));
        assert_eq!(env.budget.used(), 0);

        assert_eq!(orch.process_nhg_del("group1"), TaskStatus::Success);
    }

    #[test]
    fn test_delete_deferred_by_set_in_same_batch() {
        let (mut orch, _env) = orch_with(4, &["10.0.0.1@Ethernet0", "10.0.0.3@Ethernet4"]);

        let unfinished = orch.process_batch(
            NhgKind::Plain,
            vec![
                nhg_set("group1", "10.0.0.1,10.0.0.3", "Ethernet0,Ethernet4"),
                KeyOpFieldsValues::del("group1"),
            ],
        );
        assert!(unfinished.is_empty());
        assert!(orch.has_nhg("group1"));
        assert_eq!(orch.get_nhg("group1").unwrap().size, 2);
    }

    #[test]
    fn test_validate_broadcast() {
        let (mut orch, env) = orch_with(
            8,
            &["10.0.0.1@Ethernet0", "10.0.0.3@Ethernet4", "10.0.0.5@Ethernet8"],
        );
        orch.process_nhg_set(&nhg_set("group1", "10.0.0.1,10.0.0.3", "Ethernet0,Ethernet4"));
        orch.process_nhg_set(&nhg_set("group2", "10.0.0.3,10.0.0.5", "Ethernet4,Ethernet8"));
        orch.process_nhg_set(&nhg_set("group3", "10.0.0.3", "Ethernet4"));
        assert_eq!(env.sai.member_count(), 4);

        assert!(orch.invalidate_next_hop(&nh("10.0.0.3@Ethernet4")));
        assert_eq!(env.sai.member_count(), 2);

        assert!(orch.validate_next_hop(&nh("10.0.0.3@Ethernet4")));
        assert_eq!(env.sai.member_count(), 4);
    }

    // 3. CBF Tests

    fn cbf_set(index: &str, members: &str, class_map: &str) -> KeyOpFieldsValues {
        KeyOpFieldsValues::set(index, vec![fv("members", members), fv("class_map", class_map)])
    }

    #[test]
    fn test_invalid_cbf_is_dropped() {
        let (mut orch, _env) = orch_with(4, &[]);

        let status = orch.process_cbf_set(&cbf_set("cbf1", "A,B,C", "5:0,10:1,5:2"));
        assert_eq!(status, TaskStatus::InvalidEntry);
        let status = orch.process_cbf_set(&cbf_set("cbf1", "A,B,C", "5:0,10:5"));
        assert_eq!(status, TaskStatus::InvalidEntry);
        assert!(!orch.has_nhg("cbf1"));
    }

    #[test]
    fn test_cbf_lifecycle() {
        let (mut orch, env) = orch_with(4, &["10.0.0.1@Ethernet0", "10.0.0.3@Ethernet4"]);
        orch.process_nhg_set(&nhg_set("group1", "10.0.0.1", "Ethernet0"));
        orch.process_nhg_set(&nhg_set("group2", "10.0.0.3", "Ethernet4"));

        let status = orch.process_cbf_set(&cbf_set("cbf1", "group1,group2", "0:0,1:1"));
        assert_eq!(status, TaskStatus::Success);
        assert_eq!(orch.lookup("cbf1"), Some(NhgKind::Cbf));
        assert_eq!(orch.get_nhg("cbf1").unwrap().key, "group1,group2");
        assert_eq!(orch.get_nhg("group1").unwrap().ref_count, 1);
        assert_eq!(env.budget.used(), 1);

        // Referenced by the CBF group.
        assert_eq!(orch.process_nhg_del("group1"), TaskStatus::NeedRetry);

        assert_eq!(orch.process_cbf_del("cbf1"), TaskStatus::Success);
        assert_eq!(orch.get_nhg("group1").unwrap().ref_count, 0);
        assert_eq!(env.budget.used(), 0);
        assert_eq!(orch.process_nhg_del("group1"), TaskStatus::Success);
    }

    #[test]
    fn test_cbf_with_missing_member_fails() {
        let (mut orch, env) = orch_with(4, &[]);

        let status = orch.process_cbf_set(&cbf_set("cbf1", "group1", "0:0"));
        assert_eq!(status, TaskStatus::Failed);
        assert!(!orch.has_nhg("cbf1"));
        assert_eq!(env.budget.used(), 0);
    }

    #[test]
    fn test_cbf_deferred_at_ceiling() {
        let (mut orch, _env) = orch_with(1, &["10.0.0.1@Ethernet0", "10.0.0.3@Ethernet4"]);
        orch.process_nhg_set(&nhg_set("group1", "10.0.0.1,10.0.0.3", "Ethernet0,Ethernet4"));

        let status = orch.process_cbf_set(&cbf_set("cbf1", "group1", "0:0"));
        assert_eq!(status, TaskStatus::NeedRetry);
        assert!(!orch.has_nhg("cbf1"));
    }
}

//! Per-table pending queue of change-feed entries.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Operation carried by a change-feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "SET")]
    Set,
    #[serde(rename = "DEL")]
    Del,
}

impl Operation {
    pub fn is_set(&self) -> bool {
        matches!(self, Operation::Set)
    }

    pub fn is_del(&self) -> bool {
        matches!(self, Operation::Del)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Set => write!(f, "SET"),
            Operation::Del => write!(f, "DEL"),
        }
    }
}

/// A field-value pair from a table entry.
pub type FieldValue = (String, String);

/// Key, operation, and field-values tuple.
///
/// This is the unit of data consumed from APPL_DB tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOpFieldsValues {
    /// Table key (e.g. the group index "group1")
    pub key: String,
    pub op: Operation,
    /// Field-value pairs (empty for Del operations)
    #[serde(default)]
    pub fvs: Vec<FieldValue>,
}

impl KeyOpFieldsValues {
    pub fn new(key: impl Into<String>, op: Operation, fvs: Vec<FieldValue>) -> Self {
        Self {
            key: key.into(),
            op,
            fvs,
        }
    }

    pub fn set(key: impl Into<String>, fvs: Vec<FieldValue>) -> Self {
        Self::new(key, Operation::Set, fvs)
    }

    pub fn del(key: impl Into<String>) -> Self {
        Self::new(key, Operation::Del, vec![])
    }

    /// Returns the value for a field, if present.
    pub fn get_field(&self, field: &str) -> Option<&str> {
        self.fvs
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fvs.iter().any(|(f, _)| f == field)
    }
}

/// Configuration for a Consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Table name (e.g., "NEXTHOP_GROUP_TABLE")
    pub table_name: String,
    /// Pop batch size
    pub batch_size: usize,
}

impl ConsumerConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            batch_size: 128,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Pending entries of one table.
///
/// Entries are kept per key in arrival order and drained in key order.
///
/// # Deduplication Logic
///
/// When multiple operations arrive for the same key:
/// - DEL drops everything pending for the key, then queues itself
/// - SET after SET merges field-values (newer overwrites older)
/// - SET after DEL is queued behind it, so both stay pending
pub struct Consumer {
    config: ConsumerConfig,
    to_sync: BTreeMap<String, VecDeque<KeyOpFieldsValues>>,
    pending_count: usize,
    /// Last key of a partial drain. The next drain resumes after it.
    cursor: Option<String>,
}

impl Consumer {
    pub fn new(config: ConsumerConfig) -> Self {
        Self {
            config,
            to_sync: BTreeMap::new(),
            pending_count: 0,
            cursor: None,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }

    pub fn pending_count(&self) -> usize {
        self.pending_count
    }

    /// Number of pending entries that share `key`.
    pub fn count_for_key(&self, key: &str) -> usize {
        self.to_sync.get(key).map_or(0, VecDeque::len)
    }

    /// Adds entries to the sync queue with deduplication.
    pub fn add_to_sync(&mut self, entries: Vec<KeyOpFieldsValues>) {
        for entry in entries {
            self.add_single_entry(entry);
        }
    }

    fn add_single_entry(&mut self, entry: KeyOpFieldsValues) {
        let queue = self.to_sync.entry(entry.key.clone()).or_default();

        match entry.op {
            Operation::Del => {
                self.pending_count -= queue.len();
                queue.clear();
                queue.push_back(entry);
                self.pending_count += 1;
            }
            Operation::Set => {
                if let Some(last) = queue.back_mut() {
                    if last.op == Operation::Set {
                        for (field, value) in entry.fvs {
                            match last.fvs.iter_mut().find(|(f, _)| *f == field) {
                                Some(existing) => existing.1 = value,
                                None => last.fvs.push((field, value)),
                            }
                        }
                        return;
                    }
                }
                queue.push_back(entry);
                self.pending_count += 1;
            }
        }
    }

    /// Drains pending entries, grouped by key, until at least `batch_size`
    /// entries are taken.
    ///
    /// A key's queue is never split, so the batch can exceed `batch_size` by
    /// the tail of its last queue. Keys are taken in key order, starting
    /// after the last key of a previous partial drain and wrapping around.
    pub fn drain(&mut self) -> Vec<KeyOpFieldsValues> {
        let limit = self.config.batch_size.max(1);
        let mut keys: Vec<String> = self.to_sync.keys().cloned().collect();
        if let Some(cursor) = self.cursor.take() {
            let split = keys.partition_point(|k| *k <= cursor);
            keys.rotate_left(split);
        }

        let mut result = Vec::new();
        for key in keys {
            if result.len() >= limit {
                break;
            }
            if let Some(queue) = self.to_sync.remove(&key) {
                self.pending_count -= queue.len();
                result.extend(queue);
                self.cursor = Some(key);
            }
        }

        if self.to_sync.is_empty() {
            self.cursor = None;
        }
        result
    }

    /// Puts an unfinished entry back ahead of anything queued for its key.
    pub fn retry(&mut self, entry: KeyOpFieldsValues) {
        let queue = self.to_sync.entry(entry.key.clone()).or_default();
        queue.push_front(entry);
        self.pending_count += 1;
    }

    /// Re-queues unfinished entries, keeping their relative order.
    pub fn retry_all(&mut self, entries: Vec<KeyOpFieldsValues>) {
        for entry in entries.into_iter().rev() {
            self.retry(entry);
        }
    }

    pub fn clear(&mut self) {
        self.to_sync.clear();
        self.pending_count = 0;
        self.cursor = None;
    }

    /// Dumps pending entries for debugging.
    pub fn dump(&self) -> Vec<String> {
        self.to_sync
            .iter()
            .flat_map(|(key, queue)| {
                queue.iter().map(move |e| {
                    format!("{}|{}: {} {:?}", self.table_name(), key, e.op, e.fvs)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fv(field: &str, value: &str) -> FieldValue {
        (field.to_string(), value.to_string())
    }

    #[test]
    fn test_key_op_fields_values() {
        let entry = KeyOpFieldsValues::set(
            "group1",
            vec![fv("nexthop", "10.0.0.1,10.0.0.3"), fv("ifname", "Ethernet0,Ethernet4")],
        );

        assert_eq!(entry.key, "group1");
        assert!(entry.op.is_set());
        assert_eq!(entry.get_field("nexthop"), Some("10.0.0.1,10.0.0.3"));
        assert!(entry.has_field("ifname"));
        assert!(!entry.has_field("weight"));
    }

    #[test]
    fn test_consumer_set_merge() {
        let mut consumer = Consumer::new(ConsumerConfig::new("NEXTHOP_GROUP_TABLE"));

        consumer.add_to_sync(vec![KeyOpFieldsValues::set(
            "group1",
            vec![fv("nexthop", "10.0.0.1,10.0.0.3")],
        )]);
        consumer.add_to_sync(vec![KeyOpFieldsValues::set(
            "group1",
            vec![fv("nexthop", "10.0.0.1"), fv("ifname", "Ethernet0")],
        )]);

        assert_eq!(consumer.pending_count(), 1);
        assert_eq!(consumer.count_for_key("group1"), 1);

        let entries = consumer.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].get_field("nexthop"), Some("10.0.0.1"));
        assert_eq!(entries[0].get_field("ifname"), Some("Ethernet0"));
    }

    #[test]
    fn test_consumer_del_clears_set() {
        let mut consumer = Consumer::new(ConsumerConfig::new("NEXTHOP_GROUP_TABLE"));

        consumer.add_to_sync(vec![
            KeyOpFieldsValues::set("group1", vec![fv("nexthop", "10.0.0.1")]),
            KeyOpFieldsValues::del("group1"),
        ]);

        assert_eq!(consumer.pending_count(), 1);
        let entries = consumer.drain();
        assert!(entries[0].op.is_del());
    }

    #[test]
    fn test_consumer_del_then_set() {
        let mut consumer = Consumer::new(ConsumerConfig::new("NEXTHOP_GROUP_TABLE"));

        consumer.add_to_sync(vec![
            KeyOpFieldsValues::del("group1"),
            KeyOpFieldsValues::set("group1", vec![fv("nexthop", "10.0.0.1")]),
        ]);

        assert_eq!(consumer.pending_count(), 2);
        assert_eq!(consumer.count_for_key("group1"), 2);
        assert_eq!(consumer.count_for_key("group2"), 0);

        let entries = consumer.drain();
        assert!(entries[0].op.is_del());
        assert!(entries[1].op.is_set());
        assert!(!consumer.has_pending());
    }

    #[test]
    fn test_drain_in_key_order() {
        let mut consumer = Consumer::new(ConsumerConfig::new("NEXTHOP_GROUP_TABLE"));
        consumer.add_to_sync(vec![
            KeyOpFieldsValues::del("group3"),
            KeyOpFieldsValues::del("group1"),
            KeyOpFieldsValues::del("group2"),
        ]);

        let keys: Vec<String> = consumer.drain().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["group1", "group2", "group3"]);
    }

    #[test]
    fn test_drain_honors_batch_size() {
        let mut consumer =
            Consumer::new(ConsumerConfig::new("NEXTHOP_GROUP_TABLE").with_batch_size(2));
        consumer.add_to_sync(vec![
            KeyOpFieldsValues::del("group1"),
            KeyOpFieldsValues::del("group2"),
            KeyOpFieldsValues::del("group3"),
        ]);
        assert_eq!(consumer.batch_size(), 2);

        let keys: Vec<String> = consumer.drain().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["group1", "group2"]);
        assert_eq!(consumer.pending_count(), 1);

        // An unfinished entry does not starve keys left behind.
        consumer.retry(KeyOpFieldsValues::del("group1"));
        let keys: Vec<String> = consumer.drain().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["group3", "group1"]);
        assert!(!consumer.has_pending());

        consumer.add_to_sync(vec![
            KeyOpFieldsValues::del("group2"),
            KeyOpFieldsValues::del("group1"),
        ]);
        let keys: Vec<String> = consumer.drain().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["group1", "group2"]);
    }

    #[test]
    fn test_drain_keeps_key_queue_whole() {
        let mut consumer =
            Consumer::new(ConsumerConfig::new("NEXTHOP_GROUP_TABLE").with_batch_size(1));
        consumer.add_to_sync(vec![
            KeyOpFieldsValues::del("group1"),
            KeyOpFieldsValues::set("group1", vec![fv("nexthop", "10.0.0.1")]),
            KeyOpFieldsValues::del("group2"),
        ]);

        let entries = consumer.drain();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.key == "group1"));
        assert_eq!(consumer.pending_count(), 1);
    }

    #[test]
    fn test_retry_all_keeps_order() {
        let mut consumer = Consumer::new(ConsumerConfig::new("NEXTHOP_GROUP_TABLE"));
        consumer.add_to_sync(vec![KeyOpFieldsValues::set("group1", vec![fv("nexthop", "new")])]);

        consumer.retry_all(vec![
            KeyOpFieldsValues::del("group1"),
            KeyOpFieldsValues::set("group1", vec![fv("nexthop", "old")]),
        ]);

        let entries = consumer.drain();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].op.is_del());
        assert_eq!(entries[1].get_field("nexthop"), Some("old"));
        assert_eq!(entries[2].get_field("nexthop"), Some("new"));
    }

    #[test]
    fn test_dump_and_serde() {
        let mut consumer = Consumer::new(ConsumerConfig::new("NEXTHOP_GROUP_TABLE"));
        consumer.add_to_sync(vec![KeyOpFieldsValues::del("group1")]);
        assert_eq!(consumer.dump(), vec!["NEXTHOP_GROUP_TABLE|group1: DEL []"]);

        let op: Operation = serde_json::from_str("\"SET\"").unwrap();
        assert_eq!(op, Operation::Set);
    }
}

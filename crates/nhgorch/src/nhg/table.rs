//! Index-keyed group tables with external reference counts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// A group plus the number of external objects referencing it.
#[derive(Debug)]
pub struct NhgEntry<G> {
    pub nhg: G,
    ref_count: AtomicU32,
}

impl<G> NhgEntry<G> {
    pub fn new(nhg: G) -> Self {
        Self {
            nhg,
            ref_count: AtomicU32::new(0),
        }
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::SeqCst)
    }

    pub fn inc_ref(&self) -> u32 {
        self.ref_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Panics when the count is already 0.
    pub fn dec_ref(&self, index: &str) -> u32 {
        match self
            .ref_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
        {
            Ok(prev) => prev - 1,
            Err(_) => panic!("ref count of next hop group {} decremented below zero", index),
        }
    }
}

/// Entries keyed by the caller-assigned index.
#[derive(Debug)]
pub struct NhgTable<G> {
    entries: BTreeMap<String, NhgEntry<G>>,
}

impl<G> Default for NhgTable<G> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<G> NhgTable<G> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: &str) -> Option<&NhgEntry<G>> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: &str) -> Option<&mut NhgEntry<G>> {
        self.entries.get_mut(index)
    }

    pub fn insert(&mut self, index: impl Into<String>, nhg: G) {
        self.entries.insert(index.into(), NhgEntry::new(nhg));
    }

    pub fn remove(&mut self, index: &str) -> Option<NhgEntry<G>> {
        self.entries.remove(index)
    }

    pub fn contains(&self, index: &str) -> bool {
        self.entries.contains_key(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NhgEntry<G>)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut NhgEntry<G>)> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry, returning them in index order.
    pub fn drain(&mut self) -> Vec<(String, NhgEntry<G>)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }
}

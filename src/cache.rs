//! The local ordered cache.
//!
//! Records are kept in a plain vector in store order, next to a shadow table
//! mapping each key to its last-known priority. Priority never appears in a
//! record's value; the allocator reads it from the shadow table instead.
//!
//! Lookups by key are linear scans. Lists bound to a UI are small enough
//! that this is not worth an index.

use rustc_hash::FxHashMap;

use crate::key::Key;
use crate::priority::Priority;
use crate::value::Value;

/// A materialized record.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub key: Key,
    pub value: Value,
}

impl Record {
    pub fn new(key: Key, value: Value) -> Record {
        return Record { key, value };
    }
}

/// Records in priority order, plus their shadow metadata.
#[derive(Clone, Debug, Default)]
pub struct OrderedCache {
    records: Vec<Record>,
    shadow: FxHashMap<Key, Priority>,
}

impl OrderedCache {
    /// Create an empty cache.
    pub fn new() -> OrderedCache {
        return OrderedCache::default();
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        return self.records.len();
    }

    /// Return true if there are no records.
    pub fn is_empty(&self) -> bool {
        return self.records.is_empty();
    }

    /// Index of the record with the given key.
    pub fn position_of(&self, key: &Key) -> Option<usize> {
        return self.records.iter().position(|r| &r.key == key);
    }

    /// The record at `index`.
    pub fn record_at(&self, index: usize) -> Option<&Record> {
        return self.records.get(index);
    }

    /// The record with the given key.
    pub fn get(&self, key: &Key) -> Option<&Record> {
        return self.records.iter().find(|r| &r.key == key);
    }

    /// Return true if a record with this key is cached.
    pub fn contains(&self, key: &Key) -> bool {
        return self.shadow.contains_key(key);
    }

    /// Last-known priority of a record.
    pub fn priority_of(&self, key: &Key) -> Option<Priority> {
        return self.shadow.get(key).copied();
    }

    /// Priorities of all records, in list order.
    pub fn priorities(&self) -> Vec<Priority> {
        return self
            .records
            .iter()
            .map(|r| self.shadow.get(&r.key).copied().unwrap_or_default())
            .collect();
    }

    /// Iterate over records in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        return self.records.iter();
    }

    /// Keys in list order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        return self.records.iter().map(|r| &r.key);
    }

    /// Insert a record at `index`, clamped to the end of the list.
    pub fn insert_at(&mut self, index: usize, record: Record, priority: Priority) {
        let index = index.min(self.records.len());
        self.shadow.insert(record.key.clone(), priority);
        self.records.insert(index, record);
    }

    /// Remove the record at `index`, returning it with its priority.
    pub fn remove_at(&mut self, index: usize) -> Option<(Record, Priority)> {
        if index >= self.records.len() {
            return None;
        }
        let record = self.records.remove(index);
        let priority = self.shadow.remove(&record.key).unwrap_or_default();
        return Some((record, priority));
    }

    /// Merge a newer value into the record at `index` and refresh its
    /// priority. Keyed values are updated in place.
    pub fn replace_at(&mut self, index: usize, value: Value, priority: Priority) -> Option<&Record> {
        let record = self.records.get_mut(index)?;
        record.value.merge_from(value);
        self.shadow.insert(record.key.clone(), priority);
        return Some(record);
    }

    /// Where a record goes when it follows `prev`.
    ///
    /// No predecessor means the front. A predecessor that is not cached
    /// (removed, or not seen yet) means the end.
    pub fn place_after(&self, prev: Option<&Key>) -> usize {
        let Some(prev) = prev else {
            return 0;
        };
        match self.position_of(prev) {
            Some(index) => return index + 1,
            None => return self.records.len(),
        }
    }

    /// Return true if records are in ascending priority order, keys are
    /// unique, and the shadow table covers exactly the cached keys.
    pub fn is_consistent(&self) -> bool {
        if self.shadow.len() != self.records.len() {
            return false;
        }
        let mut previous = Priority::NEG_INFINITY;
        for record in &self.records {
            let Some(&priority) = self.shadow.get(&record.key) else {
                return false;
            };
            if priority < previous {
                return false;
            }
            previous = priority;
        }
        return true;
    }
}

//! The synchronized list and its mutation API.
//!
//! A [`SyncedList`] is a read replica of a remote collection plus the
//! operations that write to it. Every mutation is translated into one or
//! more store writes and returns as soon as they are submitted. The cache
//! only changes once the store's notifications come back through
//! [`SyncedList::pump`], including the ones caused by our own writes.
//!
//! ```
//! use synclist::config::ListConfig;
//! use synclist::list::SyncedList;
//! use synclist::store::MemoryStore;
//!
//! let mut list = SyncedList::attach(MemoryStore::new(), ListConfig::default()).unwrap();
//! let handle = list.add("hello").unwrap();
//! assert!(list.is_empty());
//!
//! list.pump();
//! assert_eq!(list.index_of(&handle.key), Some(0));
//! ```

use crate::cache::OrderedCache;
use crate::cache::Record;
use crate::config::ListConfig;
use crate::error::ListError;
use crate::error::StoreError;
use crate::key::Key;
use crate::priority::Allocation;
use crate::priority::Priority;
use crate::priority::allocate_insert;
use crate::priority::allocate_move;
use crate::priority::plan_backfill;
use crate::reconcile::ListEvent;
use crate::reconcile::Reconciler;
use crate::store::Batch;
use crate::store::BatchWrite;
use crate::store::Delivery;
use crate::store::RemoteStore;
use crate::store::WriteId;
use crate::subscription::Subscriptions;
use crate::value::Value;
use crate::value::Wire;

/// A submitted write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteHandle {
    /// The record written to. For `add` and `insert`, the generated key.
    pub key: Key,
    /// Matches a later [`WriteFailure`] to this write.
    pub write: WriteId,
}

/// A write that the store accepted and then failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteFailure {
    pub write: WriteId,
    pub key: Key,
    pub error: StoreError,
}

/// A locally cached list kept in the order of a remote store.
pub struct SyncedList<S: RemoteStore> {
    store: S,
    config: ListConfig,
    cache: OrderedCache,
    reconciler: Reconciler,
    subscriptions: Subscriptions,
}

impl<S: RemoteStore> SyncedList<S> {
    /// Attach to `store` without an event listener.
    pub fn attach(store: S, config: ListConfig) -> Result<SyncedList<S>, ListError> {
        return SyncedList::open(store, config, Reconciler::new());
    }

    /// Attach to `store`, firing `listener` once for every change applied
    /// to the list, starting with one `Added` per existing record.
    pub fn attach_with_listener(
        store: S,
        config: ListConfig,
        listener: impl FnMut(&ListEvent<'_>) + 'static,
    ) -> Result<SyncedList<S>, ListError> {
        return SyncedList::open(store, config, Reconciler::with_listener(Box::new(listener)));
    }

    fn open(mut store: S, config: ListConfig, reconciler: Reconciler) -> Result<SyncedList<S>, ListError> {
        // The backfill is written before anyone listens, so it is never
        // seen as a stream of moves.
        if config.backfill {
            let snapshot = store.snapshot();
            let existing: Vec<Option<Priority>> = snapshot.iter().map(|c| c.priority).collect();
            if let Some(priorities) = plan_backfill(&existing) {
                tracing::debug!(len = snapshot.len(), "backfilling priorities");
                let batch: Batch = snapshot
                    .into_iter()
                    .zip(priorities)
                    .map(|(child, priority)| BatchWrite::Priority { key: child.key, priority })
                    .collect();
                store.apply_batch(batch)?;
            }
        }

        let mut subscriptions = Subscriptions::new();
        subscriptions.attach(&mut store);
        return Ok(SyncedList {
            store,
            config,
            cache: OrderedCache::new(),
            reconciler,
            subscriptions,
        });
    }

    /// Apply everything the store has delivered since the last call, in
    /// order. Returns the writes that failed.
    pub fn pump(&mut self) -> Vec<WriteFailure> {
        let mut failures = Vec::new();
        while let Some(delivery) = self.store.poll() {
            match delivery {
                Delivery::Notification { subscription, notification } => {
                    if self.subscriptions.owns(subscription) {
                        self.reconciler.apply(&mut self.cache, notification);
                    }
                }
                Delivery::WriteFailed { write, key, error } => {
                    tracing::warn!(%key, ?write, %error, "write failed");
                    self.reconciler.report_error(&key);
                    failures.push(WriteFailure { write, key, error });
                }
            }
        }
        return failures;
    }

    /// Stop listening to the store. Cached records stay as they are, and
    /// writes already submitted are not cancelled.
    pub fn dispose(&mut self) {
        self.subscriptions.dispose(&mut self.store);
    }

    /// Return true until [`dispose`](Self::dispose) is called.
    pub fn is_attached(&self) -> bool {
        return self.subscriptions.is_attached();
    }

    // ---------------------------------------------------------------------
    // Reading
    // ---------------------------------------------------------------------

    /// Number of cached records.
    pub fn len(&self) -> usize {
        return self.cache.len();
    }

    /// Return true if no records are cached.
    pub fn is_empty(&self) -> bool {
        return self.cache.is_empty();
    }

    /// Iterate over records in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        return self.cache.iter();
    }

    /// Keys in list order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        return self.cache.keys();
    }

    /// Index of the record with `key`.
    pub fn index_of(&self, key: &Key) -> Option<usize> {
        return self.cache.position_of(key);
    }

    /// The record with `key`.
    pub fn get(&self, key: &Key) -> Option<&Record> {
        return self.cache.get(key);
    }

    /// The record at `index`.
    pub fn record_at(&self, index: usize) -> Option<&Record> {
        return self.cache.record_at(index);
    }

    /// A record's value in the shape it is written in: scalars unwrapped,
    /// keyed values as objects, without identity or priority.
    pub fn raw_value(&self, key: &Key) -> Option<Wire> {
        return self.cache.get(key).map(|r| r.value.to_wire());
    }

    /// Last-known priority of a record.
    pub fn priority_of(&self, key: &Key) -> Option<Priority> {
        return self.cache.priority_of(key);
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        return &self.store;
    }

    /// The underlying store, mutably.
    pub fn store_mut(&mut self) -> &mut S {
        return &mut self.store;
    }

    /// The configuration the list was attached with.
    pub fn config(&self) -> &ListConfig {
        return &self.config;
    }

    // ---------------------------------------------------------------------
    // Writing
    // ---------------------------------------------------------------------

    /// Append a record under a generated key.
    pub fn add(&mut self, value: impl Into<Value>) -> Result<WriteHandle, ListError> {
        let key = self.store.generate_key();
        let index = self.cache.len();
        return self.write_new(key, value.into(), index);
    }

    /// Replace the value of `key`, keeping its priority. An unknown key is
    /// appended.
    pub fn set(&mut self, key: &Key, value: impl Into<Value>) -> Result<WriteHandle, ListError> {
        let value = value.into();
        let Some(priority) = self.cache.priority_of(key) else {
            let index = self.cache.len();
            return self.write_new(key.clone(), value, index);
        };
        let result = self.store.set(key, value.into_wire(), Some(priority));
        return self.submitted(key, result);
    }

    /// [`set`](Self::set) the record at `index`. Out of range is a no-op.
    pub fn set_at(&mut self, index: usize, value: impl Into<Value>) -> Result<Option<WriteHandle>, ListError> {
        let Some(key) = self.key_at(index) else {
            return Ok(None);
        };
        return self.set(&key, value).map(Some);
    }

    /// Merge the fields of a keyed value into `key`. An unknown key is
    /// appended as by [`set`](Self::set).
    ///
    /// Scalars cannot be merged and are rejected.
    pub fn update(&mut self, key: &Key, value: impl Into<Value>) -> Result<WriteHandle, ListError> {
        let fields = match value.into() {
            Value::Keyed(fields) => fields,
            Value::Scalar(_) => return Err(ListError::ScalarUpdate { key: key.clone() }),
        };
        if !self.cache.contains(key) {
            return self.set(key, Value::Keyed(fields));
        }
        let result = self.store.update(key, fields);
        return self.submitted(key, result);
    }

    /// [`update`](Self::update) the record at `index`. Out of range is a
    /// no-op.
    pub fn update_at(&mut self, index: usize, value: impl Into<Value>) -> Result<Option<WriteHandle>, ListError> {
        let Some(key) = self.key_at(index) else {
            return Ok(None);
        };
        return self.update(&key, value).map(Some);
    }

    /// Delete `key` from the store. Deleting a missing key is not an error.
    pub fn remove(&mut self, key: &Key) -> Result<WriteHandle, ListError> {
        let result = self.store.remove(key);
        return self.submitted(key, result);
    }

    /// [`remove`](Self::remove) the record at `index`. Out of range is a
    /// no-op.
    pub fn remove_at(&mut self, index: usize) -> Result<Option<WriteHandle>, ListError> {
        let Some(key) = self.key_at(index) else {
            return Ok(None);
        };
        return self.remove(&key).map(Some);
    }

    /// Insert a record under a generated key so that it lands at `index`.
    /// An index at or past the end appends.
    pub fn insert(&mut self, index: usize, value: impl Into<Value>) -> Result<WriteHandle, ListError> {
        let key = self.store.generate_key();
        return self.write_new(key, value.into(), index);
    }

    /// Move the record at `from` in front of the record currently at `to`.
    ///
    /// A `to` past the end moves the record to the end. Moving a record to
    /// its own position (`to == from` or `to == from + 1`) or from an index
    /// out of range is a no-op.
    pub fn move_to(&mut self, from: usize, to: usize) -> Result<Option<WriteHandle>, ListError> {
        let Some(key) = self.key_at(from) else {
            return Ok(None);
        };
        let priorities = self.cache.priorities();
        let Some(allocation) = allocate_move(&priorities, from, to, self.config.min_priority_gap) else {
            return Ok(None);
        };

        let result = match allocation {
            Allocation::Single(priority) => self.store.set_priority(&key, priority),
            Allocation::Renumber { priorities, .. } => {
                let batch = self
                    .cache
                    .keys()
                    .zip(priorities)
                    .map(|(key, priority)| BatchWrite::Priority { key: key.clone(), priority })
                    .collect();
                self.store.apply_batch(batch)
            }
        };
        return self.submitted(&key, result).map(Some);
    }

    /// [`move_to`](Self::move_to) with the source given by key. An unknown
    /// key is a no-op.
    pub fn move_key(&mut self, key: &Key, to: usize) -> Result<Option<WriteHandle>, ListError> {
        let Some(from) = self.cache.position_of(key) else {
            return Ok(None);
        };
        return self.move_to(from, to);
    }

    /// Write a raw priority for `key`.
    pub fn set_priority(&mut self, key: &Key, priority: Priority) -> Result<WriteHandle, ListError> {
        let result = self.store.set_priority(key, priority);
        return self.submitted(key, result);
    }

    fn key_at(&self, index: usize) -> Option<Key> {
        return self.cache.record_at(index).map(|r| r.key.clone());
    }

    /// Write a record that is not in the list yet so that it lands at
    /// `index`, renumbering everything in one batch if needed.
    fn write_new(&mut self, key: Key, value: Value, index: usize) -> Result<WriteHandle, ListError> {
        let priorities = self.cache.priorities();
        let result = match allocate_insert(&priorities, index, self.config.min_priority_gap) {
            Allocation::Single(priority) => self.store.set(&key, value.into_wire(), Some(priority)),
            Allocation::Renumber { priorities, slot } => {
                let mut batch: Batch = self
                    .cache
                    .keys()
                    .zip(priorities)
                    .map(|(key, priority)| BatchWrite::Priority { key: key.clone(), priority })
                    .collect();
                batch.push(BatchWrite::Set {
                    key: key.clone(),
                    value: value.into_wire(),
                    priority: slot,
                });
                self.store.apply_batch(batch)
            }
        };
        return self.submitted(&key, result);
    }

    /// Turn a store submission into a handle, reporting rejections.
    fn submitted(&mut self, key: &Key, result: Result<WriteId, StoreError>) -> Result<WriteHandle, ListError> {
        match result {
            Ok(write) => {
                tracing::debug!(%key, ?write, "write submitted");
                return Ok(WriteHandle { key: key.clone(), write });
            }
            Err(error) => {
                tracing::warn!(%key, %error, "write rejected");
                self.reconciler.report_error(key);
                return Err(error.into());
            }
        }
    }
}

impl<S: RemoteStore> std::ops::Index<usize> for SyncedList<S> {
    type Output = Record;

    fn index(&self, index: usize) -> &Record {
        return &self.cache.iter().as_slice()[index];
    }
}

impl<'a, S: RemoteStore> IntoIterator for &'a SyncedList<S> {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        return self.cache.iter();
    }
}

impl<S: RemoteStore + std::fmt::Debug> std::fmt::Debug for SyncedList<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f
            .debug_struct("SyncedList")
            .field("store", &self.store)
            .field("records", &self.cache.len())
            .field("attached", &self.subscriptions.is_attached())
            .finish();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    fn attached(store: MemoryStore) -> SyncedList<MemoryStore> {
        let mut list = SyncedList::attach(store, ListConfig::default()).unwrap();
        list.pump();
        return list;
    }

    fn seeded(children: &[(&str, Priority)]) -> SyncedList<MemoryStore> {
        let mut store = MemoryStore::new();
        for (key, priority) in children {
            store.seed(*key, json!({ "name": key }), Some(*priority));
        }
        return attached(store);
    }

    fn keys(list: &SyncedList<MemoryStore>) -> Vec<String> {
        return list.keys().map(|k| k.to_string()).collect();
    }

    #[test]
    fn writes_are_not_visible_until_pumped() {
        let mut list = attached(MemoryStore::new());
        list.add(json!({ "foo": "bar" })).unwrap();
        assert_eq!(list.len(), 0);
        list.pump();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn set_keeps_priority() {
        let mut list = seeded(&[("a", 1.0), ("b", 2.0)]);
        list.set(&Key::from("a"), "replaced").unwrap();
        list.pump();
        assert_eq!(list.priority_of(&Key::from("a")), Some(1.0));
        assert_eq!(list.raw_value(&Key::from("a")), Some(json!("replaced")));
        assert_eq!(keys(&list), vec!["a", "b"]);
    }

    #[test]
    fn set_of_unknown_key_appends() {
        let mut list = seeded(&[("a", 1.0)]);
        list.set(&Key::from("new"), json!({ "hello": "world" })).unwrap();
        list.pump();
        assert_eq!(list.index_of(&Key::from("new")), Some(1));
        assert_eq!(list.priority_of(&Key::from("new")), Some(2.0));
    }

    #[test]
    fn scalar_update_is_rejected() {
        let mut list = seeded(&[("a", 0.0)]);
        let result = list.update(&Key::from("a"), true);
        assert_eq!(result, Err(ListError::ScalarUpdate { key: Key::from("a") }));
        assert_eq!(list.store().pending(), 0);
    }

    #[test]
    fn update_of_unknown_key_appends() {
        let mut list = seeded(&[("a", 0.0)]);
        list.update(&Key::from("b"), json!({ "x": 1 })).unwrap();
        list.pump();
        assert_eq!(list.index_of(&Key::from("b")), Some(1));
    }

    #[test]
    fn positional_ops_out_of_range_are_noops() {
        let mut list = seeded(&[("a", 0.0)]);
        assert_eq!(list.set_at(1, "x"), Ok(None));
        assert_eq!(list.update_at(5, json!({ "x": 1 })), Ok(None));
        assert_eq!(list.remove_at(1), Ok(None));
        assert_eq!(list.move_to(3, 0), Ok(None));
        assert_eq!(list.move_to(0, 1), Ok(None));
        assert_eq!(list.move_key(&Key::from("missing"), 0), Ok(None));
        assert_eq!(list.store().pending(), 0);
    }

    #[test]
    fn insert_at_front_and_past_end() {
        let mut list = seeded(&[("a", 0.0), ("b", 1.0)]);
        let front = list.insert(0, "front").unwrap();
        let back = list.insert(50, "back").unwrap();
        list.pump();
        assert_eq!(list.index_of(&front.key), Some(0));
        assert_eq!(list.index_of(&back.key), Some(3));
        assert_eq!(list.priority_of(&front.key), Some(-1.0));
        assert_eq!(list.priority_of(&back.key), Some(2.0));
    }

    #[test]
    fn insert_into_empty_list_starts_at_zero() {
        let mut list = attached(MemoryStore::new());
        let handle = list.insert(3, "only").unwrap();
        list.pump();
        assert_eq!(list.priority_of(&handle.key), Some(0.0));
    }

    #[test]
    fn move_key_resolves_index() {
        let mut list = seeded(&[("a", 0.0), ("b", 1.0), ("c", 2.0)]);
        list.move_key(&Key::from("c"), 0).unwrap();
        list.pump();
        assert_eq!(keys(&list), vec!["c", "a", "b"]);
    }

    #[test]
    fn rejected_write_reports_error() {
        let mut list = seeded(&[("a", 0.0)]);
        list.store_mut().set_offline(true);
        let result = list.remove(&Key::from("a"));
        assert_eq!(result, Err(ListError::Store(StoreError::Disconnected)));
        list.pump();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn failed_write_leaves_cache_unchanged() {
        let mut list = seeded(&[("a", 0.0)]);
        list.store_mut().deny("a");
        let handle = list.set(&Key::from("a"), "nope").unwrap();

        let failures = list.pump();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].write, handle.write);
        assert_eq!(failures[0].key, Key::from("a"));
        assert_eq!(list.raw_value(&Key::from("a")), Some(json!({ "name": "a" })));
    }

    #[test]
    fn dispose_stops_updates_but_keeps_data() {
        let mut list = seeded(&[("a", 0.0)]);
        list.dispose();
        assert!(!list.is_attached());
        list.add("late").unwrap();
        list.pump();
        assert_eq!(keys(&list), vec!["a"]);
        assert_eq!(list.store().len(), 2);
    }

    #[test]
    fn index_and_iteration() {
        let list = seeded(&[("a", 0.0), ("b", 1.0)]);
        assert_eq!(list[1].key, Key::from("b"));
        let collected: Vec<&str> = (&list).into_iter().map(|r| r.key.as_str()).collect();
        assert_eq!(collected, vec!["a", "b"]);
    }
}

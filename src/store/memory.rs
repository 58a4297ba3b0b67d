//! An in-process store with the ordering and notification behavior of a
//! remote one.
//!
//! Writes apply to the store's state as soon as they are submitted, and the
//! notifications they cause are queued until polled. Notifications for one
//! write are generated so that applying them in order to a replica of the
//! previous state reproduces the new state exactly, and so that the replica
//! is in priority order after every single one of them:
//!
//! 1. every removed child, in old order;
//! 2. children whose priority dropped, front to back, then children whose
//!    priority rose, back to front. Each is `Moved` if its predecessor
//!    changed, otherwise `Changed`;
//! 3. a walk of the new order, emitting `Added` for new children and
//!    `Changed` for children whose value alone changed.
//!
//! Predecessors are taken from the order the replica holds at that point,
//! not from the final order.

use std::cmp::Ordering;
use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

use super::Batch;
use super::BatchWrite;
use super::ChangeKind;
use super::ChildSnapshot;
use super::Delivery;
use super::Notification;
use super::RemoteStore;
use super::SubscriptionId;
use super::WriteId;
use crate::error::StoreError;
use crate::key::Key;
use crate::key::KeyGenerator;
use crate::priority::Priority;
use crate::value::Fields;
use crate::value::PRIORITY_FIELD;
use crate::value::VALUE_FIELD;
use crate::value::Wire;

#[derive(Clone, Debug, PartialEq)]
struct Child {
    value: Wire,
    priority: Option<Priority>,
}

/// An in-memory [`RemoteStore`].
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    children: FxHashMap<Key, Child>,
    keys: KeyGenerator,
    next_write: u64,
    next_subscription: u64,
    subscriptions: Vec<(SubscriptionId, ChangeKind)>,
    pending: VecDeque<Delivery>,
    denied: FxHashSet<Key>,
    offline: bool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> MemoryStore {
        return MemoryStore::default();
    }

    /// Put a child directly into the store without notifying anyone.
    /// Useful for preparing existing or legacy data.
    pub fn seed(&mut self, key: impl Into<Key>, value: Wire, priority: Option<Priority>) {
        let (value, embedded) = split_priority(value);
        self.children.insert(key.into(), Child {
            value,
            priority: priority.or(embedded),
        });
    }

    /// Make every later write touching `key` fail after submission.
    pub fn deny(&mut self, key: impl Into<Key>) {
        self.denied.insert(key.into());
    }

    /// Reject every write at submission while offline.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        return self.children.len();
    }

    /// Return true if the store holds no children.
    pub fn is_empty(&self) -> bool {
        return self.children.is_empty();
    }

    /// Read a single child.
    pub fn child(&self, key: &Key) -> Option<ChildSnapshot> {
        return self.children.get(key).map(|c| snapshot_of(key, c));
    }

    /// Keys in store order.
    pub fn order(&self) -> Vec<Key> {
        let mut keys: Vec<&Key> = self.children.keys().collect();
        keys.sort_by(|a, b| compare(a, &self.children[*a], b, &self.children[*b]));
        return keys.into_iter().cloned().collect();
    }

    /// Number of deliveries waiting to be polled.
    pub fn pending(&self) -> usize {
        return self.pending.len();
    }

    /// Number of active subscriptions.
    pub fn subscriptions(&self) -> usize {
        return self.subscriptions.len();
    }

    /// Accept a write touching `keys`, or reject it outright.
    ///
    /// Returns the write id and whether the write may proceed. A denied key
    /// queues a failure instead.
    fn submit<'a>(&mut self, keys: impl IntoIterator<Item = &'a Key>) -> Result<(WriteId, bool), StoreError> {
        if self.offline {
            return Err(StoreError::Disconnected);
        }
        self.next_write += 1;
        let write = WriteId(self.next_write);
        for key in keys {
            if self.denied.contains(key) {
                self.pending.push_back(Delivery::WriteFailed {
                    write,
                    key: key.clone(),
                    error: StoreError::PermissionDenied { key: key.clone() },
                });
                return Ok((write, false));
            }
        }
        return Ok((write, true));
    }

    /// Run `mutate` against the children and queue the notifications it
    /// causes.
    fn transact(&mut self, mutate: impl FnOnce(&mut FxHashMap<Key, Child>)) {
        let before = self.children.clone();
        let old_order = self.order();
        mutate(&mut self.children);

        let mut notifications = Vec::new();
        // What a replica holds as the notifications land, in order.
        let mut view: Vec<Key> = Vec::with_capacity(old_order.len());
        let mut current: FxHashMap<Key, Child> = FxHashMap::default();
        let mut lowered = Vec::new();
        let mut raised = Vec::new();
        for key in old_order {
            let old = &before[&key];
            let Some(child) = self.children.get(&key) else {
                notifications.push(Notification::Removed {
                    child: snapshot_of(&key, old),
                });
                continue;
            };
            match compare(&key, child, &key, old) {
                Ordering::Less => lowered.push(key.clone()),
                Ordering::Greater => raised.push(key.clone()),
                Ordering::Equal => {}
            }
            current.insert(key.clone(), old.clone());
            view.push(key);
        }

        // Lowered children only pass children in front of them and raised
        // ones only children behind them, so neither overtakes a child
        // still holding its old priority out of order.
        raised.reverse();
        for key in lowered.into_iter().chain(raised) {
            let child = &self.children[&key];
            let (prev, moved) = settle(&mut view, &mut current, &key, child);
            let snapshot = snapshot_of(&key, child);
            if !moved {
                notifications.push(Notification::Changed { child: snapshot });
                continue;
            }
            let value_changed = before[&key].value != child.value;
            notifications.push(Notification::Moved {
                child: snapshot.clone(),
                prev,
            });
            if value_changed {
                notifications.push(Notification::Changed { child: snapshot });
            }
        }

        for key in self.order() {
            let child = &self.children[&key];
            match before.get(&key) {
                None => {
                    let (prev, _) = settle(&mut view, &mut current, &key, child);
                    notifications.push(Notification::Added {
                        child: snapshot_of(&key, child),
                        prev,
                    });
                }
                Some(old) => {
                    let reprioritized = compare(&key, child, &key, old) != Ordering::Equal;
                    if !reprioritized && old.value != child.value {
                        notifications.push(Notification::Changed {
                            child: snapshot_of(&key, child),
                        });
                    }
                }
            }
        }
        debug_assert_eq!(view, self.order());

        for notification in notifications {
            self.publish(notification);
        }
    }

    /// Queue a notification for every subscription of its kind.
    fn publish(&mut self, notification: Notification) {
        let kind = notification.kind();
        for (subscription, subscribed) in &self.subscriptions {
            if *subscribed == kind {
                self.pending.push_back(Delivery::Notification {
                    subscription: *subscription,
                    notification: notification.clone(),
                });
            }
        }
    }
}

impl RemoteStore for MemoryStore {
    fn generate_key(&mut self) -> Key {
        loop {
            let key = self.keys.generate();
            if !self.children.contains_key(&key) {
                return key;
            }
        }
    }

    fn set(&mut self, key: &Key, value: Wire, priority: Option<Priority>) -> Result<WriteId, StoreError> {
        validate(&value, priority)?;
        let (write, proceed) = self.submit([key])?;
        if proceed {
            let (value, embedded) = split_priority(value);
            let priority = priority.or(embedded);
            self.transact(|children| {
                if value.is_null() {
                    children.remove(key);
                } else {
                    children.insert(key.clone(), Child { value, priority });
                }
            });
        }
        return Ok(write);
    }

    fn update(&mut self, key: &Key, fields: Fields) -> Result<WriteId, StoreError> {
        let (write, proceed) = self.submit([key])?;
        if proceed {
            self.transact(|children| {
                let child = children.entry(key.clone()).or_insert(Child {
                    value: Wire::Null,
                    priority: None,
                });
                if !child.value.is_object() {
                    child.value = Wire::Object(Fields::new());
                }
                if let Wire::Object(existing) = &mut child.value {
                    for (name, field) in fields {
                        if field.is_null() {
                            existing.remove(&name);
                        } else {
                            existing.insert(name, field);
                        }
                    }
                }
                let empty = child.value.as_object().map(|o| o.is_empty()).unwrap_or(true);
                if empty {
                    children.remove(key);
                }
            });
        }
        return Ok(write);
    }

    fn set_priority(&mut self, key: &Key, priority: Priority) -> Result<WriteId, StoreError> {
        validate(&Wire::Null, Some(priority))?;
        let (write, proceed) = self.submit([key])?;
        if proceed {
            self.transact(|children| {
                if let Some(child) = children.get_mut(key) {
                    child.priority = Some(priority);
                }
            });
        }
        return Ok(write);
    }

    fn remove(&mut self, key: &Key) -> Result<WriteId, StoreError> {
        let (write, proceed) = self.submit([key])?;
        if proceed {
            self.transact(|children| {
                children.remove(key);
            });
        }
        return Ok(write);
    }

    fn apply_batch(&mut self, batch: Batch) -> Result<WriteId, StoreError> {
        for path in &batch {
            match path {
                BatchWrite::Priority { priority, .. } => validate(&Wire::Null, Some(*priority))?,
                BatchWrite::Set { value, priority, .. } => validate(value, Some(*priority))?,
            }
        }
        let keys: Vec<Key> = batch.iter().map(|w| w.key().clone()).collect();
        let (write, proceed) = self.submit(keys.iter())?;
        if proceed {
            self.transact(|children| {
                for path in batch {
                    match path {
                        BatchWrite::Priority { key, priority } => {
                            if let Some(child) = children.get_mut(&key) {
                                child.priority = Some(priority);
                            }
                        }
                        BatchWrite::Set { key, value, priority } => {
                            let (value, _) = split_priority(value);
                            if value.is_null() {
                                children.remove(&key);
                            } else {
                                children.insert(key, Child {
                                    value,
                                    priority: Some(priority),
                                });
                            }
                        }
                    }
                }
            });
        }
        return Ok(write);
    }

    fn snapshot(&self) -> Vec<ChildSnapshot> {
        return self
            .order()
            .iter()
            .map(|key| snapshot_of(key, &self.children[key]))
            .collect();
    }

    fn subscribe(&mut self, kind: ChangeKind) -> SubscriptionId {
        self.next_subscription += 1;
        let subscription = SubscriptionId(self.next_subscription);
        self.subscriptions.push((subscription, kind));

        // A new added-listener first hears about every existing child.
        if kind == ChangeKind::Added {
            let mut prev: Option<Key> = None;
            for key in self.order() {
                let notification = Notification::Added {
                    child: snapshot_of(&key, &self.children[&key]),
                    prev: prev.clone(),
                };
                self.pending.push_back(Delivery::Notification {
                    subscription,
                    notification,
                });
                prev = Some(key);
            }
        }
        return subscription;
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) {
        self.subscriptions.retain(|(id, _)| *id != subscription);
        self.pending.retain(|delivery| match delivery {
            Delivery::Notification { subscription: id, .. } => *id != subscription,
            Delivery::WriteFailed { .. } => true,
        });
    }

    fn poll(&mut self) -> Option<Delivery> {
        return self.pending.pop_front();
    }
}

/// Store order: children without a priority first, then ascending
/// priority, then key.
fn compare(a_key: &Key, a: &Child, b_key: &Key, b: &Child) -> Ordering {
    let by_priority = match (a.priority, b.priority) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.total_cmp(&b),
    };
    return by_priority.then_with(|| a_key.cmp(b_key));
}

fn snapshot_of(key: &Key, child: &Child) -> ChildSnapshot {
    return ChildSnapshot {
        key: key.clone(),
        value: child.value.clone(),
        priority: child.priority,
    };
}

/// Put `key` where `child` sorts in `view`, a replica's order under the
/// priorities in `current`. Returns the new predecessor and whether the
/// child changed position.
fn settle(
    view: &mut Vec<Key>,
    current: &mut FxHashMap<Key, Child>,
    key: &Key,
    child: &Child,
) -> (Option<Key>, bool) {
    let mut old_prev = None;
    let existing = view.iter().position(|k| k == key);
    if let Some(index) = existing {
        if index > 0 {
            old_prev = Some(view[index - 1].clone());
        }
        view.remove(index);
    }
    let index = view.partition_point(|k| compare(k, &current[k], key, child) == Ordering::Less);
    let prev = if index == 0 { None } else { Some(view[index - 1].clone()) };
    view.insert(index, key.clone());
    current.insert(key.clone(), child.clone());
    let moved = existing.is_none() || old_prev != prev;
    return (prev, moved);
}

/// Refuse priorities the store cannot order: non-finite numbers, and an
/// embedded `.priority` that is neither a number nor null.
fn validate(value: &Wire, priority: Option<Priority>) -> Result<(), StoreError> {
    if let Some(priority) = priority {
        if !priority.is_finite() {
            return Err(StoreError::InvalidValue {
                reason: format!("priority {} is not finite", priority),
            });
        }
    }
    if let Some(embedded) = value.get(PRIORITY_FIELD) {
        if !embedded.is_null() && !embedded.is_number() {
            return Err(StoreError::InvalidValue {
                reason: format!("{} must be a number, got {}", PRIORITY_FIELD, embedded),
            });
        }
    }
    return Ok(());
}

/// Pull an embedded `.priority` out of an object and unwrap the scalar
/// envelope.
fn split_priority(value: Wire) -> (Wire, Option<Priority>) {
    let Wire::Object(mut fields) = value else {
        return (value, None);
    };
    let priority = fields.remove(PRIORITY_FIELD).and_then(|p| p.as_f64());
    if let Some(scalar) = fields.remove(VALUE_FIELD) {
        return (scalar, priority);
    }
    return (Wire::Object(fields), priority);
}

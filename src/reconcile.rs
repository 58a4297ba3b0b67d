//! Applying remote notifications to the local cache.
//!
//! The reconciler is a small state machine with four transitions, one per
//! notification kind. Notifications are applied strictly in delivery order,
//! one at a time, and each applied notification fires exactly one event on
//! the listener before the next one is looked at.
//!
//! Notifications that refer to records the cache does not hold are dropped.
//! The store is the source of truth; a missed `Added` corrects itself on the
//! next snapshot.

use crate::cache::OrderedCache;
use crate::cache::Record;
use crate::key::Key;
use crate::priority::Priority;
use crate::store::ChildSnapshot;
use crate::store::Notification;
use crate::value::Value;

/// What happened to the list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Removed,
    Changed,
    Moved,
    /// A write to the record failed. The cache is unchanged.
    Error,
}

/// An event fired on the list's listener.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ListEvent<'a> {
    pub kind: EventKind,
    pub key: &'a Key,
    /// The record's value after the change. For `Removed`, the value the
    /// record had. `None` for `Error`.
    pub value: Option<&'a Value>,
}

/// A callback receiving every event, in order.
pub type Listener = Box<dyn FnMut(&ListEvent<'_>)>;

/// Applies notifications to an [`OrderedCache`].
#[derive(Default)]
pub struct Reconciler {
    listener: Option<Listener>,
}

impl Reconciler {
    /// A reconciler with no listener.
    pub fn new() -> Reconciler {
        return Reconciler::default();
    }

    /// A reconciler firing events on `listener`.
    pub fn with_listener(listener: Listener) -> Reconciler {
        return Reconciler {
            listener: Some(listener),
        };
    }

    /// Apply one notification. Returns the kind of event fired, or `None`
    /// if the notification was dropped.
    pub fn apply(&mut self, cache: &mut OrderedCache, notification: Notification) -> Option<EventKind> {
        tracing::trace!(kind = ?notification.kind(), key = %notification.child().key, "applying notification");
        match notification {
            Notification::Added { child, prev } => return self.added(cache, child, prev),
            Notification::Removed { child } => return self.removed(cache, child),
            Notification::Changed { child } => return self.changed(cache, child),
            Notification::Moved { child, prev } => return self.moved(cache, child, prev),
        }
    }

    /// Report a failed write to the listener.
    pub fn report_error(&mut self, key: &Key) {
        self.emit(EventKind::Error, key, None);
    }

    fn added(&mut self, cache: &mut OrderedCache, child: ChildSnapshot, prev: Option<Key>) -> Option<EventKind> {
        // A repeated add for a cached key replaces the stale copy so keys
        // stay unique.
        if let Some(stale) = cache.position_of(&child.key) {
            cache.remove_at(stale);
        }
        let priority = priority_of(&child);
        let index = cache.place_after(prev.as_ref());
        let record = Record::new(child.key, Value::from_wire(child.value));
        cache.insert_at(index, record, priority);
        return self.emit_at(cache, EventKind::Added, index);
    }

    fn removed(&mut self, cache: &mut OrderedCache, child: ChildSnapshot) -> Option<EventKind> {
        let index = cache.position_of(&child.key)?;
        let (record, _) = cache.remove_at(index)?;
        self.emit(EventKind::Removed, &record.key, Some(&record.value));
        return Some(EventKind::Removed);
    }

    fn changed(&mut self, cache: &mut OrderedCache, child: ChildSnapshot) -> Option<EventKind> {
        let index = cache.position_of(&child.key)?;
        let priority = priority_of(&child);
        cache.replace_at(index, Value::from_wire(child.value), priority)?;
        return self.emit_at(cache, EventKind::Changed, index);
    }

    fn moved(&mut self, cache: &mut OrderedCache, child: ChildSnapshot, prev: Option<Key>) -> Option<EventKind> {
        let old = cache.position_of(&child.key)?;
        let (record, _) = cache.remove_at(old)?;
        let index = cache.place_after(prev.as_ref());
        cache.insert_at(index, record, priority_of(&child));
        return self.emit_at(cache, EventKind::Moved, index);
    }

    fn emit_at(&mut self, cache: &OrderedCache, kind: EventKind, index: usize) -> Option<EventKind> {
        let record = cache.record_at(index)?;
        self.emit(kind, &record.key, Some(&record.value));
        return Some(kind);
    }

    fn emit(&mut self, kind: EventKind, key: &Key, value: Option<&Value>) {
        if let Some(listener) = self.listener.as_mut() {
            listener(&ListEvent { kind, key, value });
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "Reconciler {{ listener: {} }}", self.listener.is_some());
    }
}

fn priority_of(child: &ChildSnapshot) -> Priority {
    match child.priority {
        Some(priority) => return priority,
        None => {
            tracing::warn!(key = %child.key, "record has no priority, treating as 0");
            return 0.0;
        }
    }
}

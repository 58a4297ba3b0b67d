//! The remote ordered store, as seen from the list.
//!
//! A store is a keyed collection of children sorted by priority. The list
//! submits writes to it and later collects what the store has to say about
//! them through [`RemoteStore::poll`]: change notifications for every
//! subscription, and failures for writes that were accepted but did not
//! succeed. Everything happens on one logical thread; a write returning
//! `Ok` only means it was submitted.

pub mod memory;

use crate::error::StoreError;
use crate::key::Key;
use crate::priority::Priority;
use crate::value::Fields;
use crate::value::Wire;

pub use memory::MemoryStore;

/// Identifies a submitted write, so a later failure can be matched to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WriteId(pub u64);

/// Identifies a registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// The four kinds of change a store reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
    Moved,
}

impl ChangeKind {
    /// All kinds, in the order listeners are attached.
    pub const ALL: [ChangeKind; 4] = [
        ChangeKind::Added,
        ChangeKind::Removed,
        ChangeKind::Changed,
        ChangeKind::Moved,
    ];
}

/// A child as the store currently holds it.
#[derive(Clone, Debug, PartialEq)]
pub struct ChildSnapshot {
    pub key: Key,
    /// The value as stored, without priority.
    pub value: Wire,
    pub priority: Option<Priority>,
}

/// A change to one child.
///
/// `prev` is the key of the child immediately before this one in the
/// store's order after the change, or `None` if it is first.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    Added { child: ChildSnapshot, prev: Option<Key> },
    Removed { child: ChildSnapshot },
    Changed { child: ChildSnapshot },
    Moved { child: ChildSnapshot, prev: Option<Key> },
}

impl Notification {
    /// The kind of change.
    pub fn kind(&self) -> ChangeKind {
        match self {
            Notification::Added { .. } => return ChangeKind::Added,
            Notification::Removed { .. } => return ChangeKind::Removed,
            Notification::Changed { .. } => return ChangeKind::Changed,
            Notification::Moved { .. } => return ChangeKind::Moved,
        }
    }

    /// The child the change applies to.
    pub fn child(&self) -> &ChildSnapshot {
        match self {
            Notification::Added { child, .. } => return child,
            Notification::Removed { child } => return child,
            Notification::Changed { child } => return child,
            Notification::Moved { child, .. } => return child,
        }
    }
}

/// Something the store hands back to the list.
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    /// A change for one of our subscriptions.
    Notification {
        subscription: SubscriptionId,
        notification: Notification,
    },
    /// A previously accepted write failed and changed nothing.
    WriteFailed {
        write: WriteId,
        key: Key,
        error: StoreError,
    },
}

/// One path of an atomic multi-path write.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchWrite {
    /// Change only the priority of an existing child.
    Priority { key: Key, priority: Priority },
    /// Write a whole child, value and priority.
    Set { key: Key, value: Wire, priority: Priority },
}

impl BatchWrite {
    /// The key this path writes to.
    pub fn key(&self) -> &Key {
        match self {
            BatchWrite::Priority { key, .. } => return key,
            BatchWrite::Set { key, .. } => return key,
        }
    }
}

/// A multi-path write, applied all at once or not at all.
pub type Batch = Vec<BatchWrite>;

/// The operations the list needs from a remote ordered store.
pub trait RemoteStore {
    /// Generate a fresh, unused key.
    fn generate_key(&mut self) -> Key;

    /// Replace a child's value and priority. A `null` value deletes it.
    fn set(&mut self, key: &Key, value: Wire, priority: Option<Priority>) -> Result<WriteId, StoreError>;

    /// Merge fields into a child, keeping its priority.
    fn update(&mut self, key: &Key, fields: Fields) -> Result<WriteId, StoreError>;

    /// Change only a child's priority.
    fn set_priority(&mut self, key: &Key, priority: Priority) -> Result<WriteId, StoreError>;

    /// Delete a child. Deleting a missing child succeeds.
    fn remove(&mut self, key: &Key) -> Result<WriteId, StoreError>;

    /// Apply several writes atomically.
    fn apply_batch(&mut self, batch: Batch) -> Result<WriteId, StoreError>;

    /// Read every child once, in store order.
    fn snapshot(&self) -> Vec<ChildSnapshot>;

    /// Start listening for one kind of change.
    fn subscribe(&mut self, kind: ChangeKind) -> SubscriptionId;

    /// Stop listening. Undelivered notifications for it are dropped.
    fn unsubscribe(&mut self, subscription: SubscriptionId);

    /// Take the next pending delivery, if any.
    fn poll(&mut self) -> Option<Delivery>;
}

//! Tracking the listeners a list registers with its store.

use smallvec::SmallVec;

use crate::store::ChangeKind;
use crate::store::RemoteStore;
use crate::store::SubscriptionId;

/// The store subscriptions owned by one list.
#[derive(Debug, Default)]
pub struct Subscriptions {
    active: SmallVec<[(SubscriptionId, ChangeKind); 4]>,
}

impl Subscriptions {
    /// No subscriptions yet.
    pub fn new() -> Subscriptions {
        return Subscriptions::default();
    }

    /// Subscribe to every change kind on `store`.
    pub fn attach<S: RemoteStore>(&mut self, store: &mut S) {
        for kind in ChangeKind::ALL {
            let id = store.subscribe(kind);
            tracing::debug!(?kind, ?id, "subscribed");
            self.active.push((id, kind));
        }
    }

    /// Return true if `id` belongs to this list.
    pub fn owns(&self, id: SubscriptionId) -> bool {
        return self.active.iter().any(|(active, _)| *active == id);
    }

    /// The kind a subscription was registered for.
    pub fn kind_of(&self, id: SubscriptionId) -> Option<ChangeKind> {
        return self.active.iter().find(|(active, _)| *active == id).map(|(_, kind)| *kind);
    }

    /// Return true while any subscription is registered.
    pub fn is_attached(&self) -> bool {
        return !self.active.is_empty();
    }

    /// Unsubscribe everything. Safe to call more than once.
    pub fn dispose<S: RemoteStore>(&mut self, store: &mut S) {
        for (id, kind) in self.active.drain(..) {
            tracing::debug!(?kind, ?id, "unsubscribed");
            store.unsubscribe(id);
        }
    }
}

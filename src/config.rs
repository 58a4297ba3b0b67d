//! List configuration.

use serde::Deserialize;
use serde::Serialize;

use crate::priority::MIN_PRIORITY_GAP;
use crate::priority::Priority;

/// Tunables for a [`SyncedList`](crate::list::SyncedList).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    /// Neighbors closer than this are renumbered instead of subdivided.
    pub min_priority_gap: Priority,
    /// Assign sequential priorities on attach if any record lacks one.
    pub backfill: bool,
}

impl Default for ListConfig {
    fn default() -> Self {
        return ListConfig {
            min_priority_gap: MIN_PRIORITY_GAP,
            backfill: true,
        };
    }
}

//! Errors surfaced to callers.
//!
//! Only two things ever reach a caller as an error: a write the store
//! rejected or failed, and a partial update attempted with a scalar value.
//! Index and identity mismatches are absorbed as no-ops.

use thiserror::Error;

use crate::key::Key;

/// A failure reported by the remote store for a single write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The caller may not write to this record.
    #[error("permission denied writing {key}")]
    PermissionDenied { key: Key },
    /// The store is not reachable.
    #[error("store disconnected")]
    Disconnected,
    /// The store refused the shape of the value.
    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },
}

/// An error returned by a list operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    /// Partial updates merge fields, which is undefined for scalars.
    /// Use `set` to replace a record with a scalar.
    #[error("cannot update {key} with a scalar value, use set instead")]
    ScalarUpdate { key: Key },
    /// The store rejected the write when it was submitted.
    #[error(transparent)]
    Store(#[from] StoreError),
}

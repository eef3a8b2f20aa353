//! Error types for both stores.
//!
//! Absence is never an error: lookups and removals report it through
//! `Option`/`bool`. The types here cover resource exhaustion, the merge
//! precondition, and invariant checks.

use core::fmt;
use thiserror::Error;

/// Failure of a `KeyValueStore` operation that would add an entry.
///
/// The store is left exactly as it was before the call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Growing the slot storage failed.
    #[error("failed to grow store: {0}")]
    Alloc(#[from] std::collections::TryReserveError),
    /// Growing the hash index failed.
    #[error("failed to grow store index: {0:?}")]
    IndexAlloc(hashbrown::TryReserveError),
}

impl From<hashbrown::TryReserveError> for StoreError {
    fn from(e: hashbrown::TryReserveError) -> Self {
        StoreError::IndexAlloc(e)
    }
}

/// Failure of a `PriorityStore` operation that would add an entry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeapError {
    /// Growing the entry array or node storage failed.
    #[error("failed to grow heap: {0}")]
    Alloc(#[from] std::collections::TryReserveError),
    /// Growing the position index failed.
    #[error("failed to grow heap index: {0:?}")]
    IndexAlloc(hashbrown::TryReserveError),
}

impl From<hashbrown::TryReserveError> for HeapError {
    fn from(e: hashbrown::TryReserveError) -> Self {
        HeapError::IndexAlloc(e)
    }
}

/// Why `PriorityStore::merge` refused to merge.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeFailure {
    #[error("cannot merge priority stores with different modes")]
    ModeMismatch,
    #[error(transparent)]
    Alloc(#[from] HeapError),
}

/// Returned by `PriorityStore::merge`. Both stores are left as they were
/// and the rejected one is handed back.
pub struct MergeError<H> {
    reason: MergeFailure,
    rejected: H,
}

impl<H> MergeError<H> {
    pub(crate) fn new(reason: MergeFailure, rejected: H) -> Self {
        Self { reason, rejected }
    }

    pub fn reason(&self) -> &MergeFailure {
        &self.reason
    }

    /// Recover the store that was passed to `merge`, unchanged.
    pub fn into_inner(self) -> H {
        self.rejected
    }
}

impl<H> fmt::Debug for MergeError<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeError")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl<H> fmt::Display for MergeError<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.reason, f)
    }
}

impl<H> std::error::Error for MergeError<H> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.reason)
    }
}

/// A structural invariant does not hold. Only produced by
/// `check_invariants`; seeing one means the store has a defect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invariant violated: {0}")]
pub struct InvariantError(String);

impl InvariantError {
    pub(crate) fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

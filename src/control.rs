//! Iteration-control outcomes shared by both stores.

/// Returned by traversal visitors to steer the traversal.
///
/// The hash table applies `Remove`/`RemoveAndStop` to the visited entry
/// immediately; the heap defers them until its walk has finished.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum IterControl {
    /// Keep going.
    Continue,
    /// End the traversal; the visited entry stays.
    Stop,
    /// Remove the visited entry and keep going.
    Remove,
    /// Remove the visited entry and end the traversal.
    RemoveAndStop,
}

impl IterControl {
    #[inline]
    pub fn removes(self) -> bool {
        matches!(self, IterControl::Remove | IterControl::RemoveAndStop)
    }

    #[inline]
    pub fn stops(self) -> bool {
        matches!(self, IterControl::Stop | IterControl::RemoveAndStop)
    }
}

/// Returned by the closure passed to `KeyValueStore::call`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub enum CallOutcome {
    /// Leave the (possibly mutated) value in place.
    #[default]
    Keep,
    /// Remove the entry once the closure returns.
    Remove,
}

//! Construction-time options for `KeyValueStore`.

/// Initial size used when the caller passes 0.
pub const DEFAULT_INITIAL_SIZE: usize = 128;

/// Sizing options for a `KeyValueStore`.
///
/// `initial_size` pre-sizes the index and slot storage so early inserts do
/// not rehash. `max_size` bounds how far the store grows ahead of demand:
/// growth doubles until it reaches `max_size`, then adds room one entry at
/// a time. It never rejects an insert. 0 means no bound.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StoreConfig {
    pub initial_size: usize,
    pub max_size: usize,
}

impl StoreConfig {
    pub const fn new(initial_size: usize, max_size: usize) -> Self {
        Self {
            initial_size,
            max_size,
        }
    }

    pub const fn with_initial_size(mut self, initial_size: usize) -> Self {
        self.initial_size = initial_size;
        self
    }

    pub const fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// The size actually preallocated: `initial_size`, or the default when
    /// it is 0, clamped to `max_size` when the store is bounded.
    pub fn effective_initial_size(&self) -> usize {
        let n = if self.initial_size == 0 {
            DEFAULT_INITIAL_SIZE
        } else {
            self.initial_size
        };
        match self.max_limit() {
            Some(max) => n.min(max),
            None => n,
        }
    }

    /// `Some(max)` for a bounded store.
    #[inline]
    pub fn max_limit(&self) -> Option<usize> {
        (self.max_size != 0).then_some(self.max_size)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_SIZE, 0)
    }
}

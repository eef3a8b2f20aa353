//! kvheap: an owned, byte-keyed hash table and an indexed binary heap.
//!
//! Internal Design:
//!
//! Summary
//! - `KeyValueStore<V, S>`: maps arbitrary byte strings to owned values.
//!   Values the store gives up on its own (overwrite, unset, traversal
//!   removal, clear, drop) are passed to an optional free callback.
//! - `PriorityStore<K, V, P>`: binary heap in `Min` or `Max` mode with a
//!   key → position index, so keys can be found, re-prioritized and
//!   removed without a linear scan.
//! - `OrderingPolicy<K>`: compare/step/hash bundle that parameterizes
//!   the heap; `Natural<K>` covers the fixed-width integers and floats.
//! - `IterControl`: shared traversal verdict (continue, stop, remove,
//!   remove and stop).
//!
//! Layout
//! - Both stores keep entries in a `SlotMap` behind generational keys
//!   and index those keys with a `hashbrown::HashTable`. Each entry
//!   caches its `u64` hash; growth rehashes from the cache and never
//!   rereads key bytes or calls user code.
//! - The heap array holds slot keys; each node records its array
//!   position and every swap keeps both sides current.
//!
//! Ownership rules
//! - Values returned to the caller (`delete`, `get_and_set`,
//!   `swap_if_equals`, heap removals) never reach the free callback.
//! - Values the caller offered but the store rejected (a present key
//!   for `set_if_not_exists`/`get_or_set`, a failed compare, an insert
//!   error) are dropped, never released: the callback only sees values
//!   that were stored.
//!
//! Traversal under mutation
//! - `KeyValueStore::foreach_*` snapshots slot keys before visiting, so
//!   removing the visited entry is always safe.
//! - `PriorityStore::walk` collects removal requests and applies them
//!   once the walk ends; removing mid-walk would reorder the array
//!   under the cursor.
//!
//! Concurrency
//! - Neither store synchronizes internally. Both are `Send` when their
//!   contents are, so callers share them behind a lock of their choice.
//!
//! Failure
//! - Absence is reported through `Option`/`bool`.
//! - Growth uses `try_reserve` on every backing structure; allocation
//!   failure is the only error an insert can return. It surfaces as
//!   `StoreError`/`HeapError` and leaves the store unchanged.
//! - `max_size` bounds eager growth of a `KeyValueStore`, not its entry
//!   count.
//!
//! Logging
//! - `tracing` events under the `kvheap::kv` and `kvheap::heap` targets:
//!   growth, clears and merges at debug, traversal removals
//!   and drops at trace. Nothing is logged on the lookup path.

pub mod config;
pub mod control;
pub mod error;
pub mod kv_store;
mod kv_store_proptest;
pub mod ordering;
pub mod priority_store;
mod priority_store_proptest;

// Public surface
pub use config::{StoreConfig, DEFAULT_INITIAL_SIZE};
pub use control::{CallOutcome, IterControl};
pub use error::{HeapError, InvariantError, MergeError, MergeFailure, StoreError};
pub use kv_store::{FreeCallback, GetOrSet, KeyValueStore};
pub use ordering::{FnPolicy, Natural, OrderingPolicy, Steppable};
pub use priority_store::{Handle, Mode, PriorityStore};

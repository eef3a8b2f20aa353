//! PriorityStore: array-backed binary heap with a key → position index.
//!
//! Three structures move together:
//! - `heap`: the implicit binary tree, one slot key per position;
//! - `nodes`: the entries behind generational keys, each remembering its
//!   current position and the policy hash of its key;
//! - `index`: a hash table of slot keys, probed by key hash, so an entry
//!   can be found by key without scanning the array.
//!
//! Every swap updates the two affected `pos` fields, and every key change
//! moves the slot key to its new hash bucket. `check_invariants` verifies
//! all three agree.

use crate::control::IterControl;
use crate::error::{HeapError, InvariantError, MergeError, MergeFailure};
use crate::ordering::OrderingPolicy;
use core::cmp::Ordering;
use core::fmt;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use tracing::{debug, trace};

/// Which extreme sits at the root. Fixed for the store's lifetime.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Ascending: the root is the minimum.
    Min,
    /// Descending: the root is the maximum.
    Max,
}

/// Stable reference to one heap entry, valid until that entry is removed.
///
/// A handle is only meaningful to the store that issued it. Handles of a
/// store consumed by `merge` are invalidated, and a foreign handle may
/// resolve to an unrelated entry instead of `None`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(DefaultKey);

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    pos: usize,
    hash: u64,
}

pub struct PriorityStore<K, V, P> {
    mode: Mode,
    policy: P,
    heap: Vec<DefaultKey>,
    nodes: SlotMap<DefaultKey, Node<K, V>>,
    index: HashTable<DefaultKey>,
}

/// Iterator over entries in array order (not sorted).
pub struct Iter<'a, K, V> {
    it: core::slice::Iter<'a, DefaultKey>,
    nodes: &'a SlotMap<DefaultKey, Node<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let k = *self.it.next()?;
        self.nodes.get(k).map(|n| (&n.key, &n.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<K, V, P> PriorityStore<K, V, P>
where
    P: OrderingPolicy<K>,
{
    pub fn new(mode: Mode, policy: P) -> Self {
        Self::with_capacity(mode, policy, 0)
    }

    pub fn with_capacity(mode: Mode, policy: P, capacity: usize) -> Self {
        Self {
            mode,
            policy,
            heap: Vec::with_capacity(capacity),
            nodes: SlotMap::with_capacity_and_key(capacity),
            index: HashTable::with_capacity(capacity),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn count(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    // -- ordering helpers --------------------------------------------------

    /// True when `a` belongs strictly closer to the root than `b`.
    #[inline]
    fn outranks(&self, a: &K, b: &K) -> bool {
        let want = match self.mode {
            Mode::Min => Ordering::Less,
            Mode::Max => Ordering::Greater,
        };
        self.policy.compare(a, b) == want
    }

    #[inline]
    fn key_at(&self, pos: usize) -> &K {
        &self.nodes[self.heap[pos]].key
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        let (ki, kj) = (self.heap[i], self.heap[j]);
        self.nodes[ki].pos = i;
        self.nodes[kj].pos = j;
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.outranks(self.key_at(pos), self.key_at(parent)) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) {
        let n = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            if left >= n {
                break;
            }
            let right = left + 1;
            let mut best = left;
            if right < n && self.outranks(self.key_at(right), self.key_at(left)) {
                best = right;
            }
            if !self.outranks(self.key_at(best), self.key_at(pos)) {
                break;
            }
            self.swap(pos, best);
            pos = best;
        }
    }

    /// Restore heap order around an entry whose key changed in either
    /// direction.
    fn resift(&mut self, pos: usize) {
        if self.sift_up(pos) == pos {
            self.sift_down(pos);
        }
    }

    // -- index helpers -----------------------------------------------------

    fn index_insert(&mut self, hash: u64, k: DefaultKey) {
        let nodes = &self.nodes;
        self.index
            .insert_unique(hash, k, |&kk| nodes.get(kk).map(|n| n.hash).unwrap_or(0));
    }

    fn index_remove(&mut self, hash: u64, k: DefaultKey) {
        match self.index.find_entry(hash, |&kk| kk == k) {
            Ok(occupied) => {
                occupied.remove();
            }
            Err(_) => debug_assert!(false, "heap node {k:?} missing from index"),
        }
    }

    fn reserve(&mut self, additional: usize) -> Result<(), HeapError> {
        self.heap.try_reserve(additional)?;
        self.nodes.try_reserve(additional)?;
        let nodes = &self.nodes;
        self.index
            .try_reserve(additional, |&kk| nodes.get(kk).map(|n| n.hash).unwrap_or(0))?;
        Ok(())
    }

    fn find_slot(&self, key: &K) -> Option<DefaultKey> {
        let hash = self.policy.hash_key(key);
        let (nodes, policy) = (&self.nodes, &self.policy);
        self.index
            .find(hash, |&kk| {
                nodes
                    .get(kk)
                    .map(|n| policy.compare(&n.key, key) == Ordering::Equal)
                    .unwrap_or(false)
            })
            .copied()
    }

    /// Position of the requested extreme. The mode's own extreme is the
    /// root; the opposite one can only be a leaf, so only the second half
    /// of the array is scanned.
    fn extreme_pos(&self, want: Mode) -> Option<usize> {
        let n = self.heap.len();
        if n == 0 {
            return None;
        }
        if want == self.mode {
            return Some(0);
        }
        let mut best = n / 2;
        for pos in n / 2 + 1..n {
            if self.outranks(self.key_at(best), self.key_at(pos)) {
                best = pos;
            }
        }
        Some(best)
    }

    fn entry_at(&self, pos: usize) -> Option<(&K, &V)> {
        let k = *self.heap.get(pos)?;
        self.nodes.get(k).map(|n| (&n.key, &n.value))
    }

    fn remove_slot(&mut self, k: DefaultKey) -> Option<(K, V)> {
        let (pos, hash) = {
            let node = self.nodes.get(k)?;
            (node.pos, node.hash)
        };
        self.index_remove(hash, k);
        let last = self.heap.len() - 1;
        if pos != last {
            self.swap(pos, last);
        }
        self.heap.pop();
        let node = self.nodes.remove(k)?;
        if pos < self.heap.len() {
            self.resift(pos);
        }
        Some((node.key, node.value))
    }

    /// Apply `f` to the key of `k`, re-index it and restore heap order.
    fn adjust<F>(&mut self, k: DefaultKey, f: F) -> bool
    where
        F: FnOnce(&P, &mut K),
    {
        let policy = &self.policy;
        let Some(node) = self.nodes.get_mut(k) else {
            return false;
        };
        let old_hash = node.hash;
        f(policy, &mut node.key);
        let new_hash = policy.hash_key(&node.key);
        node.hash = new_hash;
        let pos = node.pos;
        if new_hash != old_hash {
            self.index_remove(old_hash, k);
            self.index_insert(new_hash, k);
        }
        self.resift(pos);
        true
    }

    // -- public operations -------------------------------------------------

    /// Insert an entry; duplicate keys are allowed. O(log n).
    pub fn insert(&mut self, key: K, value: V) -> Result<Handle, HeapError> {
        self.reserve(1)?;
        let hash = self.policy.hash_key(&key);
        let pos = self.heap.len();
        let k = self.nodes.insert(Node {
            key,
            value,
            pos,
            hash,
        });
        self.heap.push(k);
        self.index_insert(hash, k);
        self.sift_up(pos);
        Ok(Handle(k))
    }

    /// The root entry: the minimum in `Min` mode, the maximum in `Max`.
    pub fn peek(&self) -> Option<(&K, &V)> {
        self.entry_at(0)
    }

    /// O(1) in `Min` mode, O(n) in `Max` mode.
    pub fn minimum(&self) -> Option<(&K, &V)> {
        self.entry_at(self.extreme_pos(Mode::Min)?)
    }

    /// O(1) in `Max` mode, O(n) in `Min` mode.
    pub fn maximum(&self) -> Option<(&K, &V)> {
        self.entry_at(self.extreme_pos(Mode::Max)?)
    }

    /// Remove the root. O(log n).
    pub fn pop(&mut self) -> Option<(K, V)> {
        let k = *self.heap.first()?;
        self.remove_slot(k)
    }

    pub fn delete_minimum(&mut self) -> Option<(K, V)> {
        let pos = self.extreme_pos(Mode::Min)?;
        self.remove_slot(self.heap[pos])
    }

    pub fn delete_maximum(&mut self) -> Option<(K, V)> {
        let pos = self.extreme_pos(Mode::Max)?;
        self.remove_slot(self.heap[pos])
    }

    /// Remove one entry whose key compares equal to `key`.
    pub fn delete(&mut self, key: &K) -> Option<(K, V)> {
        let k = self.find_slot(key)?;
        self.remove_slot(k)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find_slot(key).is_some()
    }

    pub fn get(&self, handle: Handle) -> Option<(&K, &V)> {
        self.nodes.get(handle.0).map(|n| (&n.key, &n.value))
    }

    pub fn remove(&mut self, handle: Handle) -> Option<(K, V)> {
        self.remove_slot(handle.0)
    }

    /// Step the key of the entry matching `key` up by `amount`.
    pub fn increase_key(&mut self, key: &K, amount: u32) -> bool {
        match self.find_slot(key) {
            Some(k) => self.adjust(k, |p, key| p.increment(key, amount)),
            None => false,
        }
    }

    /// Step the key of the entry matching `key` down by `amount`.
    pub fn decrease_key(&mut self, key: &K, amount: u32) -> bool {
        match self.find_slot(key) {
            Some(k) => self.adjust(k, |p, key| p.decrement(key, amount)),
            None => false,
        }
    }

    pub fn increase_handle(&mut self, handle: Handle, amount: u32) -> bool {
        self.adjust(handle.0, |p, key| p.increment(key, amount))
    }

    pub fn decrease_handle(&mut self, handle: Handle, amount: u32) -> bool {
        self.adjust(handle.0, |p, key| p.decrement(key, amount))
    }

    fn adjust_extreme(&mut self, which: Mode, up: bool, amount: u32) -> bool {
        let Some(pos) = self.extreme_pos(which) else {
            return false;
        };
        let k = self.heap[pos];
        if up {
            self.adjust(k, |p, key| p.increment(key, amount))
        } else {
            self.adjust(k, |p, key| p.decrement(key, amount))
        }
    }

    pub fn increase_minimum(&mut self, amount: u32) -> bool {
        self.adjust_extreme(Mode::Min, true, amount)
    }

    pub fn increase_maximum(&mut self, amount: u32) -> bool {
        self.adjust_extreme(Mode::Max, true, amount)
    }

    pub fn decrease_minimum(&mut self, amount: u32) -> bool {
        self.adjust_extreme(Mode::Min, false, amount)
    }

    pub fn decrease_maximum(&mut self, amount: u32) -> bool {
        self.adjust_extreme(Mode::Max, false, amount)
    }

    /// Move every entry of `other` into `self` and re-heapify once. O(n + m).
    ///
    /// Fails without touching either store when the modes differ or the
    /// combined size cannot be allocated; `other` is then handed back
    /// inside the error.
    ///
    /// Keys are re-hashed with this store's policy. Handles into `self`
    /// stay valid; handles issued by `other` must not be used afterwards.
    pub fn merge(&mut self, mut other: Self) -> Result<(), MergeError<Self>> {
        if self.mode != other.mode {
            return Err(MergeError::new(MergeFailure::ModeMismatch, other));
        }
        let incoming = other.heap.len();
        if incoming == 0 {
            return Ok(());
        }
        if let Err(e) = self.reserve(incoming) {
            return Err(MergeError::new(MergeFailure::Alloc(e), other));
        }

        other.index.clear();
        other.heap.clear();
        for (_, mut node) in other.nodes.drain() {
            let hash = self.policy.hash_key(&node.key);
            node.hash = hash;
            node.pos = self.heap.len();
            let k = self.nodes.insert(node);
            self.heap.push(k);
            self.index_insert(hash, k);
        }
        for pos in (0..self.heap.len() / 2).rev() {
            self.sift_down(pos);
        }
        debug!(target: "kvheap::heap", merged = incoming, total = self.heap.len(), "merged priority stores");
        Ok(())
    }

    /// Visit every entry in array order. Removal requests are collected and
    /// applied once the walk is over; the removed entries are returned.
    pub fn walk<F>(&mut self, mut f: F) -> Vec<(K, V)>
    where
        F: FnMut(&K, &V) -> IterControl,
    {
        let mut deferred = Vec::new();
        for &k in &self.heap {
            let node = &self.nodes[k];
            let ctl = f(&node.key, &node.value);
            if ctl.removes() {
                deferred.push(k);
            }
            if ctl.stops() {
                break;
            }
        }
        if !deferred.is_empty() {
            trace!(target: "kvheap::heap", removed = deferred.len(), "applying deferred walk removals");
        }
        deferred
            .into_iter()
            .filter_map(|k| self.remove_slot(k))
            .collect()
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            it: self.heap.iter(),
            nodes: &self.nodes,
        }
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.heap.clear();
        self.nodes.clear();
    }

    /// Drop the store. Values are dropped, never inspected.
    pub fn destroy(self) {
        trace!(target: "kvheap::heap", count = self.heap.len(), "priority store destroyed");
    }

    /// Drain every entry in root-first order.
    pub fn into_sorted_vec(mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.pop() {
            out.push(entry);
        }
        out
    }

    /// Verify heap order and that array, nodes and index agree.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let n = self.heap.len();
        if self.nodes.len() != n || self.index.len() != n {
            return Err(InvariantError::new(format!(
                "size mismatch: heap {n}, nodes {}, index {}",
                self.nodes.len(),
                self.index.len()
            )));
        }
        for (pos, &k) in self.heap.iter().enumerate() {
            let Some(node) = self.nodes.get(k) else {
                return Err(InvariantError::new(format!("dangling slot at position {pos}")));
            };
            if node.pos != pos {
                return Err(InvariantError::new(format!(
                    "node at position {pos} records position {}",
                    node.pos
                )));
            }
            if node.hash != self.policy.hash_key(&node.key) {
                return Err(InvariantError::new(format!("stale hash at position {pos}")));
            }
            if self.index.find(node.hash, |&kk| kk == k).is_none() {
                return Err(InvariantError::new(format!("position {pos} not indexed")));
            }
            if pos > 0 && self.outranks(&node.key, self.key_at((pos - 1) / 2)) {
                return Err(InvariantError::new(format!(
                    "position {pos} outranks its parent"
                )));
            }
        }
        Ok(())
    }
}

impl<K, V, P> fmt::Debug for PriorityStore<K, V, P>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityStore")
            .field("mode", &self.mode)
            .field("count", &self.heap.len())
            .field("root", &self.heap.first().and_then(|&k| self.nodes.get(k)).map(|n| &n.key))
            .finish()
    }
}

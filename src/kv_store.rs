//! KeyValueStore: byte-keyed table with owned values and a release hook.
//!
//! Layout follows the handle map: `slots` owns every entry behind a
//! generational key and `index` is a hash table of those keys. Each entry
//! caches the hash of its key, so rehashing on growth never rereads key
//! bytes and removal can unlink the exact index slot.

use crate::config::StoreConfig;
use crate::control::{CallOutcome, IterControl};
use crate::error::StoreError;
use core::fmt;
use core::hash::BuildHasher;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;
use tracing::{debug, trace};

/// Called with every value the store gives up on its own: overwritten,
/// unset, removed by a traversal or `call`, cleared, or dropped with the
/// store. Values handed back to the caller (`delete`, `get_and_set`, ...)
/// never reach it.
pub type FreeCallback<V> = Box<dyn FnMut(V) + Send>;

#[derive(Debug)]
struct Entry<V> {
    key: Box<[u8]>,
    value: V,
    hash: u64,
}

/// Result of `KeyValueStore::get_or_set`.
#[derive(Debug, Eq, PartialEq)]
pub enum GetOrSet<'a, V> {
    /// The key was present; the offered value was dropped.
    Existing(&'a V),
    /// The key was absent and the offered value is now stored.
    Inserted(&'a V),
}

impl<'a, V> GetOrSet<'a, V> {
    pub fn value(&self) -> &'a V {
        match *self {
            GetOrSet::Existing(v) | GetOrSet::Inserted(v) => v,
        }
    }

    pub fn inserted(&self) -> bool {
        matches!(self, GetOrSet::Inserted(_))
    }
}

pub struct KeyValueStore<V = Vec<u8>, S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Entry<V>>,
    config: StoreConfig,
    free_cb: Option<FreeCallback<V>>,
}

impl<V> KeyValueStore<V> {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self::with_hasher(config, RandomState::new())
    }

    pub fn with_free_callback<F>(config: StoreConfig, cb: F) -> Self
    where
        F: FnMut(V) + Send + 'static,
    {
        let mut store = Self::with_config(config);
        store.free_cb = Some(Box::new(cb));
        store
    }
}

impl<V> Default for KeyValueStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowing iterator over `(key, value)` pairs in unspecified order.
pub struct Iter<'a, V> {
    it: slotmap::basic::Values<'a, DefaultKey, Entry<V>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a [u8], &'a V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|e| (&*e.key, &e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

// Operations that never hash: sizing, callback plumbing, bulk release.
impl<V, S> KeyValueStore<V, S> {
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Entries the index can hold before it has to grow.
    pub fn capacity(&self) -> usize {
        self.index.capacity()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn set_free_callback<F>(&mut self, cb: F)
    where
        F: FnMut(V) + Send + 'static,
    {
        self.free_cb = Some(Box::new(cb));
    }

    /// Unbind the free callback; displaced values are then just dropped.
    pub fn take_free_callback(&mut self) -> Option<FreeCallback<V>> {
        self.free_cb.take()
    }

    fn release(&mut self, value: V) {
        if let Some(cb) = self.free_cb.as_mut() {
            cb(value);
        }
    }

    /// Remove every entry, passing each value to the free callback.
    /// Allocated capacity is kept.
    pub fn clear(&mut self) {
        let n = self.release_all();
        debug!(target: "kvheap::kv", released = n, "store cleared");
    }

    /// Release every value through the free callback and drop the store.
    pub fn destroy(self) {
        drop(self)
    }

    fn release_all(&mut self) -> usize {
        // Unlink everything first so the structure is empty while user
        // callbacks run.
        self.index.clear();
        let n = self.slots.len();
        let cb = &mut self.free_cb;
        for (_, entry) in self.slots.drain() {
            if let Some(cb) = cb.as_mut() {
                cb(entry.value);
            }
        }
        n
    }

    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            it: self.slots.values(),
        }
    }

    /// Snapshot of every key.
    pub fn get_all_keys(&self) -> Vec<Box<[u8]>> {
        self.slots.values().map(|e| e.key.clone()).collect()
    }

    /// Snapshot of every value.
    pub fn get_all_values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.slots.values().map(|e| e.value.clone()).collect()
    }

    /// Unlink `k` from both the index and the slots.
    fn unlink(&mut self, k: DefaultKey) -> Option<Entry<V>> {
        let entry = self.slots.remove(k)?;
        match self.index.find_entry(entry.hash, |&kk| kk == k) {
            Ok(occupied) => {
                occupied.remove();
            }
            Err(_) => debug_assert!(false, "slot {k:?} missing from index"),
        }
        Some(entry)
    }

    /// Shared driver for the `foreach_*` family. The slot keys are captured
    /// up front, so removing the visited entry never disturbs the cursor.
    fn visit_entries<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&[u8], &mut V) -> IterControl,
    {
        let handles: Vec<DefaultKey> = self.slots.keys().collect();
        let mut removed = 0;
        for k in handles {
            let Some(entry) = self.slots.get_mut(k) else {
                continue;
            };
            let ctl = f(&*entry.key, &mut entry.value);
            if ctl.removes() {
                if let Some(entry) = self.unlink(k) {
                    self.release(entry.value);
                    removed += 1;
                }
            }
            if ctl.stops() {
                break;
            }
        }
        if removed > 0 {
            trace!(target: "kvheap::kv", removed, remaining = self.slots.len(), "traversal removed entries");
        }
        removed
    }

    /// Visit every key. Returns the number of entries removed.
    pub fn foreach_key<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&[u8]) -> IterControl,
    {
        self.visit_entries(|k, _| f(k))
    }

    /// Visit every value. Returns the number of entries removed.
    pub fn foreach_value<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&mut V) -> IterControl,
    {
        self.visit_entries(|_, v| f(v))
    }

    /// Visit every pair. Returns the number of entries removed.
    pub fn foreach_pair<F>(&mut self, f: F) -> usize
    where
        F: FnMut(&[u8], &mut V) -> IterControl,
    {
        self.visit_entries(f)
    }
}

impl<V, S> KeyValueStore<V, S>
where
    S: BuildHasher,
{
    pub fn with_hasher(config: StoreConfig, hasher: S) -> Self {
        let n = config.effective_initial_size();
        Self {
            hasher,
            index: HashTable::with_capacity(n),
            slots: SlotMap::with_capacity_and_key(n),
            config,
            free_cb: None,
        }
    }

    fn make_hash(&self, key: &[u8]) -> u64 {
        self.hasher.hash_one(key)
    }

    fn find_key(&self, hash: u64, key: &[u8]) -> Option<DefaultKey> {
        let slots = &self.slots;
        self.index
            .find(hash, |&k| slots.get(k).map(|e| &*e.key == key).unwrap_or(false))
            .copied()
    }

    /// Room to request before storing one more entry when storage is full:
    /// double, but not past `max_size`; at or beyond it, grow by one.
    fn growth_step(&self) -> usize {
        let len = self.slots.len();
        let step = len.max(1);
        match self.config.max_limit() {
            Some(max) if len >= max => 1,
            Some(max) => step.min(max - len),
            None => step,
        }
    }

    /// Make room for one more entry in both the index and the slots.
    /// On failure no entry has been added.
    fn reserve_one(&mut self) -> Result<(), StoreError> {
        let len = self.slots.len();
        if len < self.index.capacity() && len < self.slots.capacity() {
            return Ok(());
        }
        let additional = self.growth_step();
        let before = self.index.capacity();
        let slots = &self.slots;
        self.index
            .try_reserve(additional, |&k| slots.get(k).map(|e| e.hash).unwrap_or(0))?;
        self.slots.try_reserve(additional)?;
        let after = self.index.capacity();
        if after != before {
            debug!(target: "kvheap::kv", from = before, to = after, max_size = self.config.max_size, "store grew");
        }
        Ok(())
    }

    /// Store a key known to be absent. On failure nothing is stored and
    /// `value` is dropped.
    fn insert_new(&mut self, hash: u64, key: &[u8], value: V) -> Result<DefaultKey, StoreError> {
        self.reserve_one()?;

        let entry = Entry {
            key: key.into(),
            value,
            hash,
        };
        let k = self.slots.insert(entry);
        let slots = &self.slots;
        self.index
            .insert_unique(hash, k, |&kk| slots.get(kk).map(|e| e.hash).unwrap_or(0));
        Ok(k)
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let hash = self.make_hash(key);
        let k = self.find_key(hash, key)?;
        self.slots.get(k).map(|e| &e.value)
    }

    /// Clone the stored value with `f` instead of copying its bytes.
    pub fn get_deep_copy<T, F>(&self, key: &[u8], f: F) -> Option<T>
    where
        F: FnOnce(&V) -> T,
    {
        self.get(key).map(f)
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        let hash = self.make_hash(key);
        self.find_key(hash, key).is_some()
    }

    /// Insert or replace. A replaced value goes to the free callback.
    pub fn set(&mut self, key: &[u8], value: V) -> Result<(), StoreError> {
        if let Some(prev) = self.get_and_set(key, value)? {
            self.release(prev);
        }
        Ok(())
    }

    /// Insert or replace, handing the previous value back to the caller.
    pub fn get_and_set(&mut self, key: &[u8], value: V) -> Result<Option<V>, StoreError> {
        let hash = self.make_hash(key);
        if let Some(entry) = self.find_key(hash, key).and_then(|k| self.slots.get_mut(k)) {
            return Ok(Some(core::mem::replace(&mut entry.value, value)));
        }
        self.insert_new(hash, key, value)?;
        Ok(None)
    }

    /// Insert `value` only if `key` is absent; either way return the value
    /// now stored under `key`.
    pub fn get_or_set(&mut self, key: &[u8], value: V) -> Result<GetOrSet<'_, V>, StoreError> {
        let hash = self.make_hash(key);
        let (k, inserted) = match self.find_key(hash, key) {
            Some(k) => (k, false),
            None => (self.insert_new(hash, key, value)?, true),
        };
        let entry = self
            .slots
            .get(k)
            .expect("entry must exist right after lookup or insert");
        Ok(if inserted {
            GetOrSet::Inserted(&entry.value)
        } else {
            GetOrSet::Existing(&entry.value)
        })
    }

    /// Insert only if `key` is absent. Returns whether the value was stored.
    pub fn set_if_not_exists(&mut self, key: &[u8], value: V) -> Result<bool, StoreError> {
        let hash = self.make_hash(key);
        if self.find_key(hash, key).is_some() {
            return Ok(false);
        }
        self.insert_new(hash, key, value)?;
        Ok(true)
    }

    /// Remove `key`, passing its value to the free callback.
    pub fn unset(&mut self, key: &[u8]) -> bool {
        match self.delete(key) {
            Some(prev) => {
                self.release(prev);
                true
            }
            None => false,
        }
    }

    /// Remove `key` and hand its value back to the caller.
    pub fn delete(&mut self, key: &[u8]) -> Option<V> {
        let hash = self.make_hash(key);
        let k = self.find_key(hash, key)?;
        self.unlink(k).map(|e| e.value)
    }

    /// Run `f` against the stored value in place. Returns false when `key`
    /// is absent. `CallOutcome::Remove` deletes the entry afterwards.
    pub fn call<F>(&mut self, key: &[u8], f: F) -> bool
    where
        F: FnOnce(&[u8], &mut V) -> CallOutcome,
    {
        let hash = self.make_hash(key);
        let Some(k) = self.find_key(hash, key) else {
            return false;
        };
        let Some(entry) = self.slots.get_mut(k) else {
            return false;
        };
        if f(&*entry.key, &mut entry.value) == CallOutcome::Remove {
            if let Some(entry) = self.unlink(k) {
                self.release(entry.value);
            }
        }
        true
    }
}

// Operations that look at value bytes.
impl<V, S> KeyValueStore<V, S>
where
    V: AsRef<[u8]>,
    S: BuildHasher,
{
    /// Copy the stored bytes into caller-owned storage.
    pub fn get_copy(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.get(key).map(|v| v.as_ref().to_vec())
    }

    /// Store an owned duplicate of `bytes`; the previous value, if any, is
    /// handed back.
    pub fn set_copy(&mut self, key: &[u8], bytes: &[u8]) -> Result<Option<V>, StoreError>
    where
        V: for<'b> From<&'b [u8]>,
    {
        self.get_and_set(key, V::from(bytes))
    }

    /// Compare-and-swap: replace the value only if its bytes equal
    /// `expected`. The displaced value is returned; on mismatch or absence
    /// nothing changes and `new` is dropped.
    pub fn swap_if_equals(&mut self, key: &[u8], expected: &[u8], new: V) -> Option<V> {
        let hash = self.make_hash(key);
        let k = self.find_key(hash, key)?;
        let entry = self.slots.get_mut(k)?;
        if entry.value.as_ref() != expected {
            return None;
        }
        Some(core::mem::replace(&mut entry.value, new))
    }

    /// Compare-and-swap releasing the displaced value through the free
    /// callback. Returns whether the swap happened.
    pub fn set_if_equals(&mut self, key: &[u8], expected: &[u8], new: V) -> bool {
        match self.swap_if_equals(key, expected, new) {
            Some(prev) => {
                self.release(prev);
                true
            }
            None => false,
        }
    }

    /// Remove `key` only if its bytes equal `expected`.
    pub fn delete_if_equals(&mut self, key: &[u8], expected: &[u8]) -> bool {
        let hash = self.make_hash(key);
        let Some(k) = self.find_key(hash, key) else {
            return false;
        };
        let matches = self
            .slots
            .get(k)
            .map(|e| e.value.as_ref() == expected)
            .unwrap_or(false);
        if !matches {
            return false;
        }
        if let Some(entry) = self.unlink(k) {
            self.release(entry.value);
        }
        true
    }
}

impl<V, S> Drop for KeyValueStore<V, S> {
    fn drop(&mut self) {
        let n = self.release_all();
        if n > 0 {
            trace!(target: "kvheap::kv", released = n, "store dropped");
        }
    }
}

impl<V, S> fmt::Debug for KeyValueStore<V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyValueStore")
            .field("count", &self.slots.len())
            .field("capacity", &self.index.capacity())
            .field("config", &self.config)
            .field("free_callback", &self.free_cb.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn counting_store() -> (KeyValueStore, Arc<AtomicUsize>) {
        counting_store_with(StoreConfig::default())
    }

    fn counting_store_with(config: StoreConfig) -> (KeyValueStore, Arc<AtomicUsize>) {
        let freed = Arc::new(AtomicUsize::new(0));
        let counter = freed.clone();
        let store = KeyValueStore::with_free_callback(config, move |_v: Vec<u8>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (store, freed)
    }

    #[derive(Clone, Default)]
    struct ConstBuildHasher;
    struct ConstHasher;
    impl BuildHasher for ConstBuildHasher {
        type Hasher = ConstHasher;
        fn build_hasher(&self) -> Self::Hasher {
            ConstHasher
        }
    }
    impl core::hash::Hasher for ConstHasher {
        fn write(&mut self, _bytes: &[u8]) {}
        fn finish(&self) -> u64 {
            0
        } // every key lands in the same probe group
    }

    /// Overwriting a key releases exactly the displaced value.
    #[test]
    fn overwrite_releases_previous_value() {
        let (mut s, freed) = counting_store();
        s.set(b"a", b"1".to_vec()).unwrap();
        s.set(b"a", b"2".to_vec()).unwrap();
        assert_eq!(freed.load(Ordering::SeqCst), 1);
        assert_eq!(s.get(b"a").map(Vec::as_slice), Some(&b"2"[..]));
        assert_eq!(s.count(), 1);
    }

    /// A present key blocks `set_if_not_exists` and leaves the value alone.
    #[test]
    fn set_if_not_exists_keeps_existing() {
        let (mut s, freed) = counting_store();
        s.set(b"a", b"1".to_vec()).unwrap();
        s.set(b"a", b"2".to_vec()).unwrap();
        assert!(!s.set_if_not_exists(b"a", b"3".to_vec()).unwrap());
        assert_eq!(s.get(b"a").map(Vec::as_slice), Some(&b"2"[..]));
        assert_eq!(freed.load(Ordering::SeqCst), 1);
        assert!(s.set_if_not_exists(b"b", b"3".to_vec()).unwrap());
        assert_eq!(s.count(), 2);
    }

    /// Keys are binary: embedded NULs and prefixes are distinct keys.
    #[test]
    fn binary_keys_compare_by_full_length() {
        let mut s: KeyValueStore = KeyValueStore::new();
        s.set(b"ab\0cd", b"x".to_vec()).unwrap();
        s.set(b"ab", b"y".to_vec()).unwrap();
        s.set(b"", b"empty".to_vec()).unwrap();
        assert_eq!(s.count(), 3);
        assert_eq!(s.get(b"ab\0cd").map(Vec::as_slice), Some(&b"x"[..]));
        assert_eq!(s.get(b"ab").map(Vec::as_slice), Some(&b"y"[..]));
        assert_eq!(s.get(b"").map(Vec::as_slice), Some(&b"empty"[..]));
        assert!(!s.exists(b"ab\0"));
    }

    #[test]
    fn get_and_set_hands_back_previous_without_callback() {
        let (mut s, freed) = counting_store();
        assert_eq!(s.get_and_set(b"k", b"1".to_vec()).unwrap(), None);
        assert_eq!(
            s.get_and_set(b"k", b"2".to_vec()).unwrap(),
            Some(b"1".to_vec())
        );
        assert_eq!(freed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn get_or_set_reports_which_value_is_stored() {
        let mut s: KeyValueStore = KeyValueStore::new();
        let r = s.get_or_set(b"k", b"first".to_vec()).unwrap();
        assert!(r.inserted());
        assert_eq!(r.value().as_slice(), b"first");

        let r = s.get_or_set(b"k", b"second".to_vec()).unwrap();
        assert_eq!(r, GetOrSet::Existing(&b"first".to_vec()));
        assert_eq!(s.get_copy(b"k"), Some(b"first".to_vec()));
    }

    #[test]
    fn copy_and_deep_copy_are_independent() {
        let mut s: KeyValueStore = KeyValueStore::new();
        let buf = b"payload".to_vec();
        assert_eq!(s.set_copy(b"k", &buf).unwrap(), None);
        let mut copy = s.get_copy(b"k").unwrap();
        copy[0] = b'P';
        assert_eq!(s.get(b"k").map(Vec::as_slice), Some(&b"payload"[..]));

        let deep = s.get_deep_copy(b"k", |v| String::from_utf8(v.clone()).unwrap());
        assert_eq!(deep.as_deref(), Some("payload"));
        assert_eq!(s.get_deep_copy(b"missing", |v| v.len()), None);

        let prev = s.set_copy(b"k", b"other").unwrap();
        assert_eq!(prev, Some(b"payload".to_vec()));
    }

    /// CAS succeeds iff the stored bytes equal `expected`.
    #[test]
    fn set_if_equals_is_compare_and_swap() {
        let (mut s, freed) = counting_store();
        s.set(b"k", b"v1".to_vec()).unwrap();
        assert!(!s.set_if_equals(b"k", b"nope", b"v2".to_vec()));
        assert_eq!(s.get(b"k").map(Vec::as_slice), Some(&b"v1"[..]));
        assert!(s.set_if_equals(b"k", b"v1", b"v2".to_vec()));
        assert_eq!(s.get(b"k").map(Vec::as_slice), Some(&b"v2"[..]));
        assert_eq!(freed.load(Ordering::SeqCst), 1);
        assert!(!s.set_if_equals(b"absent", b"", b"v".to_vec()));
        assert!(!s.exists(b"absent"));

        assert_eq!(s.swap_if_equals(b"k", b"v2", b"v3".to_vec()), Some(b"v2".to_vec()));
        assert_eq!(s.swap_if_equals(b"k", b"v2", b"v4".to_vec()), None);
    }

    #[test]
    fn unset_delete_and_delete_if_equals() {
        let (mut s, freed) = counting_store();
        s.set(b"a", b"1".to_vec()).unwrap();
        s.set(b"b", b"2".to_vec()).unwrap();
        s.set(b"c", b"3".to_vec()).unwrap();

        assert!(s.unset(b"a"));
        assert!(!s.unset(b"a"));
        assert_eq!(freed.load(Ordering::SeqCst), 1);

        assert_eq!(s.delete(b"b"), Some(b"2".to_vec()));
        assert_eq!(s.delete(b"b"), None);
        assert_eq!(freed.load(Ordering::SeqCst), 1);

        assert!(!s.delete_if_equals(b"c", b"x"));
        assert!(s.exists(b"c"));
        assert!(s.delete_if_equals(b"c", b"3"));
        assert!(!s.exists(b"c"));
        assert_eq!(freed.load(Ordering::SeqCst), 2);
        assert!(s.is_empty());
    }

    #[test]
    fn call_mutates_in_place_and_can_remove() {
        let (mut s, freed) = counting_store();
        s.set(b"ctr", vec![0]).unwrap();
        for _ in 0..5 {
            assert!(s.call(b"ctr", |key, v| {
                assert_eq!(key, b"ctr");
                v[0] += 1;
                CallOutcome::Keep
            }));
        }
        assert_eq!(s.get(b"ctr"), Some(&vec![5]));
        assert!(!s.call(b"missing", |_, _| CallOutcome::Keep));

        assert!(s.call(b"ctr", |_, _| CallOutcome::Remove));
        assert!(!s.exists(b"ctr"));
        assert_eq!(freed.load(Ordering::SeqCst), 1);
    }

    /// Removing during traversal drops exactly the removed subset and
    /// visits every entry once.
    #[test]
    fn foreach_remove_keeps_traversal_valid() {
        let (mut s, freed) = counting_store();
        for i in 0u32..100 {
            s.set(&i.to_be_bytes(), i.to_le_bytes().to_vec()).unwrap();
        }
        let mut seen = BTreeSet::new();
        let removed = s.foreach_pair(|k, _| {
            let i = u32::from_be_bytes(k.try_into().unwrap());
            assert!(seen.insert(i), "visited twice");
            if i % 3 == 0 {
                IterControl::Remove
            } else {
                IterControl::Continue
            }
        });
        assert_eq!(seen.len(), 100);
        assert_eq!(removed, 34);
        assert_eq!(s.count(), 66);
        assert_eq!(freed.load(Ordering::SeqCst), 34);
        assert!(!s.exists(&3u32.to_be_bytes()));
        assert!(s.exists(&4u32.to_be_bytes()));
    }

    #[test]
    fn foreach_stop_variants_end_traversal() {
        let mut s: KeyValueStore = KeyValueStore::new();
        for i in 0u8..10 {
            s.set(&[i], vec![i]).unwrap();
        }
        let mut visits = 0;
        assert_eq!(
            s.foreach_key(|_| {
                visits += 1;
                IterControl::Stop
            }),
            0
        );
        assert_eq!(visits, 1);

        let mut visits = 0;
        let removed = s.foreach_value(|_| {
            visits += 1;
            if visits == 3 {
                IterControl::RemoveAndStop
            } else {
                IterControl::Continue
            }
        });
        assert_eq!((visits, removed), (3, 1));
        assert_eq!(s.count(), 9);

        s.foreach_value(|v| {
            v.push(0xff);
            IterControl::Continue
        });
        assert!(s.iter().all(|(_, v)| v.last() == Some(&0xff)));
    }

    #[test]
    fn snapshots_list_every_entry() {
        let mut s: KeyValueStore = KeyValueStore::new();
        s.set(b"x", b"1".to_vec()).unwrap();
        s.set(b"y", b"2".to_vec()).unwrap();
        let keys: BTreeSet<Box<[u8]>> = s.get_all_keys().into_iter().collect();
        let expected: BTreeSet<Box<[u8]>> = [&b"x"[..], &b"y"[..]].iter().map(|k| (*k).into()).collect();
        assert_eq!(keys, expected);
        let mut values = s.get_all_values();
        values.sort();
        assert_eq!(values, vec![b"1".to_vec(), b"2".to_vec()]);
        assert_eq!(s.iter().count(), 2);
    }

    /// `max_size` bounds how far the store grows ahead of demand; it never
    /// turns an insert away.
    #[test]
    fn max_size_bounds_growth_not_entries() {
        let (mut s, freed) = counting_store_with(StoreConfig::new(0, 2));
        assert!(s.capacity() >= 2);
        s.set(b"a", vec![1]).unwrap();
        s.set(b"b", vec![2]).unwrap();
        s.set(b"c", vec![3]).unwrap();
        assert!(s.set_if_not_exists(b"d", vec![4]).unwrap());
        assert!(s.get_or_set(b"e", vec![5]).unwrap().inserted());
        for i in 0u32..200 {
            s.set(&i.to_be_bytes(), vec![]).unwrap();
        }
        assert_eq!(s.count(), 205);
        assert_eq!(s.get(b"c"), Some(&vec![3]));
        assert_eq!(s.get(b"d"), Some(&vec![4]));
        assert_eq!(freed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn growth_step_doubles_up_to_max_size() {
        let mut s: KeyValueStore = KeyValueStore::with_config(StoreConfig::new(1, 10));
        assert_eq!(s.growth_step(), 1);
        for i in 0u8..4 {
            s.set(&[i], vec![]).unwrap();
        }
        assert_eq!(s.growth_step(), 4);
        for i in 4u8..8 {
            s.set(&[i], vec![]).unwrap();
        }
        assert_eq!(s.growth_step(), 2);
        for i in 8u8..12 {
            s.set(&[i], vec![]).unwrap();
        }
        assert_eq!(s.growth_step(), 1);

        let mut s: KeyValueStore = KeyValueStore::with_config(StoreConfig::new(1, 0));
        for i in 0u8..12 {
            s.set(&[i], vec![]).unwrap();
        }
        assert_eq!(s.growth_step(), 12);
    }

    #[test]
    fn grows_past_initial_size() {
        let mut s: KeyValueStore = KeyValueStore::with_config(StoreConfig::new(4, 0));
        for i in 0u32..1000 {
            s.set(&i.to_le_bytes(), vec![]).unwrap();
        }
        assert_eq!(s.count(), 1000);
        assert!(s.capacity() >= 1000);
        for i in 0u32..1000 {
            assert!(s.exists(&i.to_le_bytes()));
        }
    }

    /// Lookups work under heavy hash collisions; equality resolves entries.
    #[test]
    fn collision_handling_with_const_hasher() {
        let mut s: KeyValueStore<Vec<u8>, ConstBuildHasher> =
            KeyValueStore::with_hasher(StoreConfig::default(), ConstBuildHasher);
        s.set(b"a", b"1".to_vec()).unwrap();
        s.set(b"b", b"2".to_vec()).unwrap();
        assert_eq!(s.get(b"a").map(Vec::as_slice), Some(&b"1"[..]));
        assert_eq!(s.get(b"b").map(Vec::as_slice), Some(&b"2"[..]));
        assert!(s.unset(b"a"));
        assert!(!s.exists(b"a"));
        assert!(s.exists(b"b"));
    }

    #[test]
    fn clear_and_drop_release_everything() {
        let (mut s, freed) = counting_store();
        for i in 0u8..5 {
            s.set(&[i], vec![i]).unwrap();
        }
        s.clear();
        assert_eq!(freed.load(Ordering::SeqCst), 5);
        assert!(s.is_empty());
        assert!(!s.exists(&[0]));

        s.set(b"again", vec![]).unwrap();
        s.set(b"more", vec![]).unwrap();
        s.destroy();
        assert_eq!(freed.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn free_callback_can_be_rebound() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let mut s: KeyValueStore = KeyValueStore::new();
        s.set(b"k", b"silent".to_vec()).unwrap();
        s.set(b"k", b"v".to_vec()).unwrap();
        s.set_free_callback(move |v| sink.lock().unwrap().push(v));
        s.set(b"k", b"w".to_vec()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![b"v".to_vec()]);

        assert!(s.take_free_callback().is_some());
        assert!(s.unset(b"k"));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn store_is_send_for_external_locking() {
        fn assert_send<T: Send>() {}
        assert_send::<KeyValueStore>();
        assert_send::<KeyValueStore<Box<[u8]>>>();
    }
}

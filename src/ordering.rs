//! Ordering policies for `PriorityStore` keys.
//!
//! A policy bundles the three functions the heap needs for a key type:
//! a total order, a step toward larger keys and a step toward smaller
//! keys. It also hashes keys for the heap's position index, so
//! `compare(a, b) == Equal` must imply `hash_key(a) == hash_key(b)`.
//!
//! `Natural<K>` covers every `K: Steppable`; the crate implements
//! `Steppable` for the fixed-width integers and both float widths.
//! `FnPolicy` builds a policy from closures for any hashable key.

use core::cmp::Ordering;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;
use std::collections::hash_map::RandomState;

pub trait OrderingPolicy<K> {
    fn compare(&self, a: &K, b: &K) -> Ordering;

    /// Move `key` toward larger keys by `amount` steps.
    fn increment(&self, key: &mut K, amount: u32);

    /// Move `key` toward smaller keys by `amount` steps.
    fn decrement(&self, key: &mut K, amount: u32);

    fn hash_key(&self, key: &K) -> u64;
}

/// A key type with a total order and successor/predecessor steps.
pub trait Steppable: Copy {
    fn order(&self, other: &Self) -> Ordering;
    fn step_up(self, amount: u32) -> Self;
    fn step_down(self, amount: u32) -> Self;
    /// Bit pattern that is equal exactly when `order` says `Equal`.
    fn key_bits(self) -> u64;
}

// Integer steps saturate at the type's bounds instead of wrapping, so a
// key can never jump to the other end of the order.
macro_rules! steppable_int {
    ($($t:ty),* $(,)?) => {$(
        impl Steppable for $t {
            #[inline]
            fn order(&self, other: &Self) -> Ordering {
                self.cmp(other)
            }

            #[inline]
            fn step_up(self, amount: u32) -> Self {
                let step = <$t>::try_from(amount).unwrap_or(<$t>::MAX);
                self.saturating_add(step)
            }

            #[inline]
            fn step_down(self, amount: u32) -> Self {
                let step = <$t>::try_from(amount).unwrap_or(<$t>::MAX);
                self.saturating_sub(step)
            }

            #[inline]
            fn key_bits(self) -> u64 {
                self as u64
            }
        }
    )*};
}

steppable_int!(i16, i32, i64, u16, u32, u64);

// Floats order by `total_cmp`: -0.0 sorts below 0.0 and NaNs sit at the
// ends, which keeps the order total and agrees with `to_bits` equality.
macro_rules! steppable_float {
    ($($t:ty),* $(,)?) => {$(
        impl Steppable for $t {
            #[inline]
            fn order(&self, other: &Self) -> Ordering {
                self.total_cmp(other)
            }

            #[inline]
            fn step_up(self, amount: u32) -> Self {
                self + amount as $t
            }

            #[inline]
            fn step_down(self, amount: u32) -> Self {
                self - amount as $t
            }

            #[inline]
            fn key_bits(self) -> u64 {
                self.to_bits() as u64
            }
        }
    )*};
}

steppable_float!(f32, f64);

// splitmix64 finalizer; the index keys on the top bits of the hash, which
// raw integer keys leave empty.
#[inline]
fn mix64(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// The natural order of a `Steppable` key type.
pub struct Natural<K>(PhantomData<fn() -> K>);

impl<K> Natural<K> {
    pub const fn new() -> Self {
        Natural(PhantomData)
    }
}

impl<K> Default for Natural<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for Natural<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Natural<K> {}

impl<K> fmt::Debug for Natural<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Natural<{}>", core::any::type_name::<K>())
    }
}

impl<K: Steppable> OrderingPolicy<K> for Natural<K> {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.order(b)
    }

    #[inline]
    fn increment(&self, key: &mut K, amount: u32) {
        *key = key.step_up(amount);
    }

    #[inline]
    fn decrement(&self, key: &mut K, amount: u32) {
        *key = key.step_down(amount);
    }

    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        mix64(key.key_bits())
    }
}

/// A policy assembled from closures. Keys are hashed with `K: Hash`, so the
/// comparator must treat keys as equal only when they are `==`-equal.
pub struct FnPolicy<K, C, I, D> {
    cmp: C,
    incr: I,
    decr: D,
    hasher: RandomState,
    _k: PhantomData<fn(&K)>,
}

impl<K, C, I, D> FnPolicy<K, C, I, D>
where
    K: Hash,
    C: Fn(&K, &K) -> Ordering,
    I: Fn(&mut K, u32),
    D: Fn(&mut K, u32),
{
    pub fn new(cmp: C, incr: I, decr: D) -> Self {
        Self {
            cmp,
            incr,
            decr,
            hasher: RandomState::new(),
            _k: PhantomData,
        }
    }
}

impl<K, C, I, D> OrderingPolicy<K> for FnPolicy<K, C, I, D>
where
    K: Hash,
    C: Fn(&K, &K) -> Ordering,
    I: Fn(&mut K, u32),
    D: Fn(&mut K, u32),
{
    fn compare(&self, a: &K, b: &K) -> Ordering {
        (self.cmp)(a, b)
    }

    fn increment(&self, key: &mut K, amount: u32) {
        (self.incr)(key, amount)
    }

    fn decrement(&self, key: &mut K, amount: u32) {
        (self.decr)(key, amount)
    }

    fn hash_key(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }
}

impl<K, C, I, D> fmt::Debug for FnPolicy<K, C, I, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPolicy").finish_non_exhaustive()
    }
}

#![cfg(test)]

// Property tests for PriorityStore against a sorted multiset model.

use crate::control::IterControl;
use crate::ordering::Natural;
use crate::priority_store::{Mode, PriorityStore};
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
enum Op {
    Insert(i32),
    Pop,
    DeleteMin,
    DeleteMax,
    Delete(i32),
    Increase(i32, u8),
    Decrease(i32, u8),
    IncreaseMin(u8),
    DecreaseMax(u8),
    WalkRemoveBelow(i32),
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    // A narrow key range forces duplicates and hits on lookups.
    let key = -20i32..20;
    let op = prop_oneof![
        5 => key.clone().prop_map(Op::Insert),
        2 => Just(Op::Pop),
        1 => Just(Op::DeleteMin),
        1 => Just(Op::DeleteMax),
        2 => key.clone().prop_map(Op::Delete),
        2 => (key.clone(), 0u8..5).prop_map(|(k, a)| Op::Increase(k, a)),
        2 => (key.clone(), 0u8..5).prop_map(|(k, a)| Op::Decrease(k, a)),
        1 => (0u8..5).prop_map(Op::IncreaseMin),
        1 => (0u8..5).prop_map(Op::DecreaseMax),
        1 => key.prop_map(Op::WalkRemoveBelow),
    ];
    proptest::collection::vec(op, 1..100)
}

#[derive(Default)]
struct Model(BTreeMap<i32, usize>);

impl Model {
    fn add(&mut self, k: i32) {
        *self.0.entry(k).or_default() += 1;
    }

    fn take(&mut self, k: i32) -> bool {
        match self.0.get_mut(&k) {
            Some(n) if *n > 1 => {
                *n -= 1;
                true
            }
            Some(_) => {
                self.0.remove(&k);
                true
            }
            None => false,
        }
    }

    fn min(&self) -> Option<i32> {
        self.0.keys().next().copied()
    }

    fn max(&self) -> Option<i32> {
        self.0.keys().next_back().copied()
    }

    fn len(&self) -> usize {
        self.0.values().sum()
    }
}

fn run(mode: Mode, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut sut: PriorityStore<i32, (), Natural<i32>> = PriorityStore::new(mode, Natural::new());
    let mut model = Model::default();
    let root = |m: &Model| match mode {
        Mode::Min => m.min(),
        Mode::Max => m.max(),
    };

    for op in ops {
        match op {
            Op::Insert(k) => {
                sut.insert(k, ()).unwrap();
                model.add(k);
            }
            Op::Pop => {
                let expect = root(&model);
                prop_assert_eq!(sut.pop().map(|(k, _)| k), expect);
                if let Some(k) = expect {
                    model.take(k);
                }
            }
            Op::DeleteMin => {
                let expect = model.min();
                prop_assert_eq!(sut.delete_minimum().map(|(k, _)| k), expect);
                if let Some(k) = expect {
                    model.take(k);
                }
            }
            Op::DeleteMax => {
                let expect = model.max();
                prop_assert_eq!(sut.delete_maximum().map(|(k, _)| k), expect);
                if let Some(k) = expect {
                    model.take(k);
                }
            }
            Op::Delete(k) => {
                let got = sut.delete(&k).map(|(k, _)| k);
                let present = model.take(k);
                prop_assert_eq!(got, present.then_some(k));
            }
            Op::Increase(k, a) => {
                let present = model.take(k);
                prop_assert_eq!(sut.increase_key(&k, a as u32), present);
                if present {
                    model.add(k + a as i32);
                }
            }
            Op::Decrease(k, a) => {
                let present = model.take(k);
                prop_assert_eq!(sut.decrease_key(&k, a as u32), present);
                if present {
                    model.add(k - a as i32);
                }
            }
            Op::IncreaseMin(a) => {
                let min = model.min();
                prop_assert_eq!(sut.increase_minimum(a as u32), min.is_some());
                if let Some(k) = min {
                    model.take(k);
                    model.add(k + a as i32);
                }
            }
            Op::DecreaseMax(a) => {
                let max = model.max();
                prop_assert_eq!(sut.decrease_maximum(a as u32), max.is_some());
                if let Some(k) = max {
                    model.take(k);
                    model.add(k - a as i32);
                }
            }
            Op::WalkRemoveBelow(bound) => {
                let mut visited = 0usize;
                let removed = sut.walk(|k, _| {
                    visited += 1;
                    if *k < bound { IterControl::Remove } else { IterControl::Continue }
                });
                prop_assert_eq!(visited, model.len());
                for (k, _) in &removed {
                    prop_assert!(*k < bound);
                    prop_assert!(model.take(*k));
                }
                prop_assert!(model.min().map_or(true, |m| m >= bound));
            }
        }

        prop_assert_eq!(sut.count(), model.len());
        prop_assert_eq!(sut.peek().map(|(k, _)| *k), root(&model));
        prop_assert_eq!(sut.minimum().map(|(k, _)| *k), model.min());
        prop_assert_eq!(sut.maximum().map(|(k, _)| *k), model.max());
        if let Err(e) = sut.check_invariants() {
            return Err(TestCaseError::fail(e.to_string()));
        }
    }

    let mut drained: Vec<i32> = sut.into_sorted_vec().into_iter().map(|(k, _)| k).collect();
    if mode == Mode::Max {
        drained.reverse();
    }
    let expected: Vec<i32> = model
        .0
        .iter()
        .flat_map(|(&k, &n)| std::iter::repeat(k).take(n))
        .collect();
    prop_assert_eq!(drained, expected);
    Ok(())
}

// Property: both modes agree with the multiset model on every extreme query,
// and the array/node/index bookkeeping stays consistent.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_min_mode_matches_model(ops in arb_ops()) {
        run(Mode::Min, ops)?;
    }

    #[test]
    fn prop_max_mode_matches_model(ops in arb_ops()) {
        run(Mode::Max, ops)?;
    }

    // Merging two heaps keeps every key and restores order in one pass.
    #[test]
    fn prop_merge_preserves_multiset(
        a in proptest::collection::vec(-50i32..50, 0..40),
        b in proptest::collection::vec(-50i32..50, 0..40),
    ) {
        let mut left: PriorityStore<i32, (), Natural<i32>> = PriorityStore::new(Mode::Min, Natural::new());
        let mut right: PriorityStore<i32, (), Natural<i32>> = PriorityStore::new(Mode::Min, Natural::new());
        for &k in &a {
            left.insert(k, ()).unwrap();
        }
        for &k in &b {
            right.insert(k, ()).unwrap();
        }
        left.merge(right).unwrap();
        if let Err(e) = left.check_invariants() {
            return Err(TestCaseError::fail(e.to_string()));
        }
        let mut expected: Vec<i32> = a.iter().chain(&b).copied().collect();
        expected.sort();
        prop_assert_eq!(left.minimum().map(|(k, _)| *k), expected.first().copied());
        let drained: Vec<i32> = left.into_sorted_vec().into_iter().map(|(k, _)| k).collect();
        prop_assert_eq!(drained, expected);
    }
}

#![cfg(test)]

// Property tests for KeyValueStore kept inside the crate so the release
// accounting can be checked against a plain HashMap model.

use crate::config::StoreConfig;
use crate::control::{CallOutcome, IterControl};
use crate::kv_store::KeyValueStore;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

// Pool-indexed operations shrink toward earlier keys and shorter op lists.
#[derive(Clone, Debug)]
enum Op {
    Set(usize, Vec<u8>),
    SetIfNotExists(usize, Vec<u8>),
    GetAndSet(usize, Vec<u8>),
    SetIfEquals(usize, Vec<u8>, Vec<u8>),
    Unset(usize),
    Delete(usize),
    Get(usize),
    Append(usize, u8),
    DropOdd,
    Clear,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<Vec<u8>>, Vec<Op>)> {
    let key = proptest::collection::vec(any::<u8>(), 0..6);
    proptest::collection::vec(key, 1..=8).prop_flat_map(|pool| {
        let idx = 0..pool.len();
        let val = || proptest::collection::vec(any::<u8>(), 0..4);
        let op = prop_oneof![
            4 => (idx.clone(), val()).prop_map(|(i, v)| Op::Set(i, v)),
            2 => (idx.clone(), val()).prop_map(|(i, v)| Op::SetIfNotExists(i, v)),
            2 => (idx.clone(), val()).prop_map(|(i, v)| Op::GetAndSet(i, v)),
            2 => (idx.clone(), val(), val()).prop_map(|(i, e, v)| Op::SetIfEquals(i, e, v)),
            2 => idx.clone().prop_map(Op::Unset),
            2 => idx.clone().prop_map(Op::Delete),
            3 => idx.clone().prop_map(Op::Get),
            1 => (idx.clone(), any::<u8>()).prop_map(|(i, b)| Op::Append(i, b)),
            1 => Just(Op::DropOdd),
            1 => Just(Op::Clear),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Property: state-machine equivalence against HashMap<Vec<u8>, Vec<u8>>.
// - lookups, counts and key sets agree with the model after every op;
// - every value the store gives up on its own reaches the free callback,
//   and the callback sees exactly those values, in order;
// - values returned to the caller never reach the callback.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let released: Arc<Mutex<Vec<Vec<u8>>>> = Arc::default();
        let sink = released.clone();
        let mut sut = KeyValueStore::with_free_callback(StoreConfig::new(2, 0), move |v: Vec<u8>| {
            sink.lock().unwrap().push(v);
        });
        let mut model: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
        let mut expected_released: Vec<Vec<u8>> = Vec::new();

        for op in ops {
            match op {
                Op::Set(i, v) => {
                    let k = &pool[i];
                    sut.set(k, v.clone()).unwrap();
                    if let Some(prev) = model.insert(k.clone(), v) {
                        expected_released.push(prev);
                    }
                }
                Op::SetIfNotExists(i, v) => {
                    let k = &pool[i];
                    let stored = sut.set_if_not_exists(k, v.clone()).unwrap();
                    prop_assert_eq!(stored, !model.contains_key(k));
                    model.entry(k.clone()).or_insert(v);
                }
                Op::GetAndSet(i, v) => {
                    let k = &pool[i];
                    let prev = sut.get_and_set(k, v.clone()).unwrap();
                    prop_assert_eq!(prev, model.insert(k.clone(), v));
                }
                Op::SetIfEquals(i, expected, v) => {
                    let k = &pool[i];
                    let matches = model.get(k) == Some(&expected);
                    prop_assert_eq!(sut.set_if_equals(k, &expected, v.clone()), matches);
                    if matches {
                        if let Some(prev) = model.insert(k.clone(), v) {
                            expected_released.push(prev);
                        }
                    }
                }
                Op::Unset(i) => {
                    let k = &pool[i];
                    let prev = model.remove(k);
                    prop_assert_eq!(sut.unset(k), prev.is_some());
                    expected_released.extend(prev);
                }
                Op::Delete(i) => {
                    let k = &pool[i];
                    prop_assert_eq!(sut.delete(k), model.remove(k));
                }
                Op::Get(i) => {
                    let k = &pool[i];
                    prop_assert_eq!(sut.get(k), model.get(k));
                    prop_assert_eq!(sut.exists(k), model.contains_key(k));
                }
                Op::Append(i, b) => {
                    let k = &pool[i];
                    let found = sut.call(k, |_, v| {
                        v.push(b);
                        CallOutcome::Keep
                    });
                    prop_assert_eq!(found, model.contains_key(k));
                    if let Some(v) = model.get_mut(k) {
                        v.push(b);
                    }
                }
                Op::DropOdd => {
                    let mut visited = 0usize;
                    let removed = sut.foreach_value(|v| {
                        visited += 1;
                        if v.len() % 2 == 1 { IterControl::Remove } else { IterControl::Continue }
                    });
                    prop_assert_eq!(visited, model.len());
                    let odd: Vec<Vec<u8>> = model.keys().filter(|k| model[*k].len() % 2 == 1).cloned().collect();
                    prop_assert_eq!(removed, odd.len());
                    // Traversal order is unspecified; compare released sets below.
                    let mut freed: Vec<Vec<u8>> = odd.iter().filter_map(|k| model.remove(k)).collect();
                    let tail = released.lock().unwrap()[expected_released.len()..].to_vec();
                    let mut got = tail.clone();
                    freed.sort();
                    got.sort();
                    prop_assert_eq!(&got, &freed);
                    expected_released.extend(tail);
                }
                Op::Clear => {
                    let mut values: Vec<Vec<u8>> = model.drain().map(|(_, v)| v).collect();
                    sut.clear();
                    let tail = released.lock().unwrap()[expected_released.len()..].to_vec();
                    let mut got = tail.clone();
                    values.sort();
                    got.sort();
                    prop_assert_eq!(&got, &values);
                    expected_released.extend(tail);
                }
            }

            prop_assert_eq!(sut.count(), model.len());
            prop_assert_eq!(sut.is_empty(), model.is_empty());
            prop_assert_eq!(&*released.lock().unwrap(), &expected_released);
            let keys: BTreeSet<Vec<u8>> = sut.iter().map(|(k, _)| k.to_vec()).collect();
            let model_keys: BTreeSet<Vec<u8>> = model.keys().cloned().collect();
            prop_assert_eq!(keys, model_keys);
        }

        let remaining = model.len();
        let before = released.lock().unwrap().len();
        drop(sut);
        prop_assert_eq!(released.lock().unwrap().len(), before + remaining);
    }
}

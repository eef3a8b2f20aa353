use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use kvheap::{IterControl, KeyValueStore, StoreConfig};
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn key(n: u64) -> [u8; 8] {
    n.to_be_bytes()
}

fn filled(seed: u64, n: usize) -> (KeyValueStore<u64>, Vec<[u8; 8]>) {
    let mut s = KeyValueStore::with_config(StoreConfig::new(n, 0));
    let keys: Vec<_> = lcg(seed).take(n).map(key).collect();
    for (i, k) in keys.iter().enumerate() {
        s.set(k, i as u64).unwrap();
    }
    (s, keys)
}

fn bench_set_fresh_100k(c: &mut Criterion) {
    c.bench_function("kv::set_fresh_100k", |b| {
        b.iter_batched(
            KeyValueStore::<u64>::new,
            |mut s| {
                for (i, x) in lcg(1).take(100_000).enumerate() {
                    s.set(&key(x), i as u64).unwrap();
                }
                black_box(s)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_set_presized_100k(c: &mut Criterion) {
    c.bench_function("kv::set_presized_100k", |b| {
        b.iter_batched(
            || KeyValueStore::<u64>::with_config(StoreConfig::new(100_000, 0)),
            |mut s| {
                for (i, x) in lcg(2).take(100_000).enumerate() {
                    s.set(&key(x), i as u64).unwrap();
                }
                black_box(s)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_get_hit_10k(c: &mut Criterion) {
    c.bench_function("kv::get_hit_10k_on_100k", |b| {
        let (s, keys) = filled(7, 100_000);
        let n = keys.len();
        let mut x = 0x9e3779b97f4a7c15u64;
        let queries: Vec<[u8; 8]> = (0..10_000)
            .map(|_| {
                x = x.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
                keys[(x as usize) % n]
            })
            .collect();
        b.iter(|| {
            for k in &queries {
                black_box(s.get(k));
            }
        })
    });
}

fn bench_get_miss_10k(c: &mut Criterion) {
    c.bench_function("kv::get_miss_10k_on_100k", |b| {
        let (s, _) = filled(11, 100_000);
        let mut miss = lcg(0xdead_beef);
        b.iter(|| {
            for _ in 0..10_000 {
                let k = key(miss.next().unwrap());
                black_box(s.get(&k));
            }
        })
    });
}

fn bench_unset_random_10k(c: &mut Criterion) {
    c.bench_function("kv::unset_random_10k_of_110k", |b| {
        b.iter_batched(
            || {
                let (s, keys) = filled(5, 110_000);
                let n = keys.len();
                let mut sel = std::collections::HashSet::with_capacity(10_000);
                let mut x = 0x9e3779b97f4a7c15u64;
                while sel.len() < 10_000 {
                    x = x.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
                    sel.insert((x as usize) % n);
                }
                let doomed: Vec<[u8; 8]> = sel.into_iter().map(|i| keys[i]).collect();
                (s, doomed)
            },
            |(mut s, doomed)| {
                for k in &doomed {
                    s.unset(k);
                }
                black_box(s)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_foreach(c: &mut Criterion) {
    c.bench_function("kv::foreach_value_sum_100k", |b| {
        let (mut s, _) = filled(999, 100_000);
        b.iter(|| {
            let mut sum = 0u64;
            s.foreach_value(|v| {
                sum = sum.wrapping_add(*v);
                IterControl::Continue
            });
            black_box(sum)
        })
    });

    c.bench_function("kv::foreach_remove_half_100k", |b| {
        b.iter_batched(
            || filled(1001, 100_000).0,
            |mut s| {
                s.foreach_value(|v| {
                    if *v % 2 == 0 {
                        IterControl::Remove
                    } else {
                        IterControl::Continue
                    }
                });
                black_box(s)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(12)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches_write;
    config = bench_config();
    targets = bench_set_fresh_100k, bench_set_presized_100k, bench_unset_random_10k
}

criterion_group! {
    name = benches_read;
    config = bench_config();
    targets = bench_get_hit_10k, bench_get_miss_10k, bench_foreach
}

criterion_main!(benches_write, benches_read);

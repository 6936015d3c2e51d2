use super::*;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

fn validate_tiny<K: HashKey, V>(t: &TinyMap<K, V>) {
    assert!(t.len() <= t.capacity(), "len above virtual capacity");
    assert!(t.capacity() <= t.slot_capacity());
    assert!(t.slot_capacity() <= usize::from(kernel::MAX_CAP));
    assert!(t.slot_capacity() >= usize::from(kernel::MIN_CAP));
    assert_eq!(t.iter().count(), t.len());
    assert_eq!(t.iter().rev().count(), t.len());
    assert!(
        t.iter().all(|(k, _)| t.contains_key(k)),
        "iterated key must be reachable by probing"
    );
}

fn validate_chain<K: ChainKey, V, P: MemoryPool>(t: &ChainedMap<K, V, P>) {
    assert!(t.chain_size() <= t.chain_capacity());
    assert!(t.chain_capacity() <= usize::from(kernel::MAX_CAP));
    assert_eq!(t.is_empty(), t.chain_size() == 0);
    assert_eq!(t.iter().count(), t.len());
    assert!(t.iter().all(|(k, _)| t.contains_key(k)));
}

/// Pool that refuses exactly one acquisition, chosen through a shared handle.
#[derive(Clone, Debug, Default)]
struct Flaky {
    fail_at: Rc<Cell<Option<usize>>>,
    seen: usize,
    held: usize,
}

impl MemoryPool for Flaky {
    fn try_acquire(&mut self, bytes: usize) -> Result<()> {
        let attempt = self.seen;
        self.seen += 1;
        if self.fail_at.get() == Some(attempt) {
            return Err(Error::AllocationFailure);
        }
        self.held += bytes;
        Ok(())
    }

    fn release(&mut self, bytes: usize) {
        assert!(bytes <= self.held, "released more than acquired");
        self.held -= bytes;
    }
}

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    #[proptest(weight = 8)]
    Insert(#[proptest(strategy = "0u16..400")] u16, u32),
    #[proptest(weight = 4)]
    Erase(#[proptest(strategy = "0u16..400")] u16),
    #[proptest(weight = 4)]
    Get(#[proptest(strategy = "0u16..400")] u16),
    Fit,
    SetFullness(#[proptest(strategy = "10u8..=100")] u8),
    RetainOdd,
}

#[derive(Clone, Debug, Arbitrary)]
enum ChainOp {
    #[proptest(weight = 8)]
    Insert(#[proptest(strategy = "0u16..2000")] u16, u32),
    #[proptest(weight = 4)]
    Erase(#[proptest(strategy = "0u16..2000")] u16),
    #[proptest(weight = 3)]
    Get(#[proptest(strategy = "0u16..2000")] u16),
    Fit,
    SetFullness(#[proptest(strategy = "10u8..=100")] u8),
    RetainBelow(#[proptest(strategy = "0u16..2000")] u16),
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_tiny_map_matches_model(ops in prop::collection::vec(any::<Op>(), 0..=1500)) {
        let mut t: TinyMap<u16, u32> = TinyMap::new();
        let mut m: HashMap<u16, u32> = HashMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => match t.insert(k, v) {
                    Ok(old) => prop_assert_eq!(old, m.insert(k, v)),
                    Err(err) => {
                        prop_assert_eq!(err, Error::TableFull);
                        prop_assert!(!m.contains_key(&k));
                        prop_assert_eq!(m.len(), t.map_ability());
                    }
                },
                Op::Erase(k) => prop_assert_eq!(t.erase(&k), m.remove(&k).is_some()),
                Op::Get(k) => prop_assert_eq!(t.get(&k), m.get(&k)),
                Op::Fit => {
                    t.fit();
                }
                Op::SetFullness(f) => match t.set_fullness(f) {
                    Ok(()) => prop_assert_eq!(t.fullness(), f),
                    Err(err) => prop_assert_eq!(
                        err,
                        Error::WouldOverflow {
                            size: m.len(),
                            ability: usize::from(kernel::map_ability(f)),
                        }
                    ),
                },
                Op::RetainOdd => {
                    t.retain(|k, _| k % 2 == 1);
                    m.retain(|k, _| k % 2 == 1);
                }
            }

            prop_assert_eq!(t.len(), m.len());
        }

        validate_tiny(&t);
        let mut got: Vec<(u16, u32)> = t.iter().map(|(k, v)| (*k, *v)).collect();
        let mut expected: Vec<(u16, u32)> = m.into_iter().collect();
        got.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_chained_map_matches_model(
        width in 8u8..=64,
        ops in prop::collection::vec(any::<ChainOp>(), 0..=2000),
    ) {
        let mut t: ChainedMap<u16, u32> = ChainedMap::with_config(ChainConfig {
            range_width: Some(width),
            ..ChainConfig::default()
        });
        let mut m: HashMap<u16, u32> = HashMap::new();

        for op in ops {
            match op {
                ChainOp::Insert(k, v) => prop_assert_eq!(t.insert(k, v), Ok(m.insert(k, v))),
                ChainOp::Erase(k) => prop_assert_eq!(t.erase(&k), m.remove(&k).is_some()),
                ChainOp::Get(k) => prop_assert_eq!(t.get(&k), m.get(&k)),
                ChainOp::Fit => {
                    t.fit();
                }
                ChainOp::SetFullness(f) => {
                    prop_assert!(t.set_fullness(f).is_ok());
                    prop_assert_eq!(t.fullness(), f);
                }
                ChainOp::RetainBelow(bound) => {
                    t.retain(|k, _| *k < bound);
                    m.retain(|k, _| *k < bound);
                }
            }

            prop_assert_eq!(t.len(), m.len());
        }

        validate_chain(&t);
        let mut got: Vec<(u16, u32)> = t.iter().map(|(k, v)| (*k, *v)).collect();
        let mut expected: Vec<(u16, u32)> = m.into_iter().collect();
        got.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_probe_visits_every_slot(cap in kernel::MIN_CAP..=kernel::MAX_CAP, start in any::<u8>()) {
        let start = start % cap;
        let step = kernel::probe_step(cap);
        let mut seen = vec![false; usize::from(cap)];
        let mut index = start;
        for _ in 0..cap {
            prop_assert!(!seen[usize::from(index)], "slot {} visited twice", index);
            seen[usize::from(index)] = true;
            index = kernel::next_probe(cap, index, step);
        }
        prop_assert!(seen.iter().all(|&s| s));
        prop_assert_eq!(index, start);
    }

    #[test]
    fn prop_erase_is_idempotent(keys in prop::collection::vec(any::<u8>(), 1..200)) {
        let mut t: TinySet<u8> = TinySet::new();
        t.try_extend(keys.iter().copied()).unwrap();
        for k in &keys {
            t.erase(k);
            let len = t.len();
            prop_assert!(!t.erase(k));
            prop_assert_eq!(t.len(), len);
        }
        prop_assert!(t.is_empty());
    }

    #[test]
    fn prop_fullness_migration_is_all_or_nothing(
        keys in prop::collection::hash_set(0u16..6_000, 1..600),
        fail_at in 0usize..48,
        fullness in 10u8..=100,
    ) {
        let trigger = Rc::new(Cell::new(None));
        let pool = Flaky { fail_at: Rc::clone(&trigger), ..Flaky::default() };
        let mut t: ChainedMap<u16, u16, Flaky> =
            ChainedMap::with_config_in(ChainConfig::default(), pool);
        for &k in &keys {
            t.insert(k, !k).unwrap();
        }
        let held = t.pool().held;
        let capacity = t.chain_capacity();
        trigger.set(Some(t.pool().seen + fail_at));

        match t.set_fullness(fullness) {
            Ok(boundary) => {
                prop_assert_eq!(t.fullness(), fullness);
                prop_assert_eq!(boundary, u16::max_key(t.range_width()));
            }
            Err(err) => {
                prop_assert_eq!(err, Error::AllocationFailure);
                prop_assert_eq!(t.fullness(), kernel::DEFAULT_FULLNESS);
                prop_assert_eq!(t.chain_capacity(), capacity);
                prop_assert_eq!(t.pool().held, held);
            }
        }

        validate_chain(&t);
        prop_assert_eq!(t.len(), keys.len());
        for k in &keys {
            prop_assert_eq!(t.get(k), Some(&!*k));
        }
    }
}

#[test]
fn seeded_chain_churn() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(1);
    let mut t: ChainedMap<u16, u64> = ChainedMap::new();
    let mut m: HashMap<u16, u64> = HashMap::new();
    let max = u16::max_key(t.range_width()).unwrap();

    for round in 0..20_000u64 {
        let k = rng.gen_range(0..=max);
        if rng.gen_bool(0.6) {
            assert_eq!(t.insert(k, round), Ok(m.insert(k, round)));
        } else {
            assert_eq!(t.erase(&k), m.remove(&k).is_some());
        }
        if round % 5_000 == 4_999 {
            t.fit();
            validate_chain(&t);
        }
    }

    assert_eq!(t.len(), m.len());
    for (k, v) in &m {
        assert_eq!(t.at(k), Ok(v));
    }
}

#[test]
fn seeded_tiny_map_fill_drain() {
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    let mut rng = StdRng::seed_from_u64(2);
    let mut keys: Vec<u32> = (0..234u32).map(|i| i.wrapping_mul(2_654_435_761)).collect();
    keys.shuffle(&mut rng);

    let mut t: TinyMap<u32, u32> = TinyMap::new();
    for (i, &k) in keys.iter().enumerate() {
        assert_eq!(t.insert(k, i as u32), Ok(None));
    }
    assert!(t.is_full());
    validate_tiny(&t);

    keys.shuffle(&mut rng);
    for (i, k) in keys.iter().enumerate() {
        assert!(t.erase(k));
        assert_eq!(t.len(), keys.len() - i - 1);
        if i % 50 == 0 {
            validate_tiny(&t);
        }
    }
    assert!(t.is_empty());
    assert!(t.fit() > 0);
    assert_eq!(t.slot_capacity(), usize::from(kernel::MIN_CAP));
}

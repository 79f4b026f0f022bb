//! End-to-end behaviour of the engine, chain and codec together.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;

use hope_core::chain::{ChainTarget, MemoryChain};
use hope_core::config::HopeConfig;
use hope_core::consolidation::{self, Capture, Consolidation, Thresholds};
use hope_core::shp::{self, Params};
use hope_core::{Error, HopeMemory, MemoryItem};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 8, 9, 0, 0).unwrap()
}

fn manual_config() -> HopeConfig {
    let mut config = HopeConfig::default();
    config.memory.consolidate_every = 0;
    config
}

#[test]
fn password_is_sponge() {
    let hope = HopeMemory::new(manual_config()).unwrap();
    let thought = hope.think("The password is Sponge", 0.9, t0()).unwrap();

    let out = hope.consolidate(t0()).unwrap();
    let snapshot = out.snapshot().expect("item qualifies").clone();
    assert!(snapshot.contains(&thought.item));

    let latest = hope.resolve("latest".parse::<ChainTarget>().unwrap()).unwrap();
    assert_eq!(latest, snapshot);

    let walked: Vec<_> = hope.walk(ChainTarget::Latest, 0).unwrap().collect();
    assert_eq!(walked, vec![snapshot]);
}

#[test]
fn consolidate_twice_is_idempotent() {
    let hope = HopeMemory::new(manual_config()).unwrap();
    hope.think("The password is Sponge", 0.9, t0()).unwrap();
    hope.think("Meeting with Bob at noon", 0.7, t0()).unwrap();

    let first = hope.consolidate(t0()).unwrap();
    let head_after_first = hope.chain().head().unwrap();
    let second = hope.consolidate(t0()).unwrap();

    assert!(first.is_appended());
    assert!(matches!(second, Consolidation::Unchanged(_)));
    assert_eq!(first.chain_ref(), second.chain_ref());
    assert_eq!(hope.chain().head().unwrap(), head_after_first);
    assert_eq!(hope.chain().len(), 1);
}

#[test]
fn nothing_to_consolidate_is_not_an_error() {
    let hope = HopeMemory::new(manual_config()).unwrap();
    hope.think("Buy milk", 0.1, t0()).unwrap();
    assert!(matches!(hope.consolidate(t0()).unwrap(), Consolidation::Empty));
}

#[test]
fn walk_one_step_returns_child_then_parent() {
    let hope = HopeMemory::new(manual_config()).unwrap();
    hope.think("first", 0.9, t0()).unwrap();
    let a = hope.consolidate(t0()).unwrap().chain_ref().unwrap();
    hope.think("second", 0.9, t0()).unwrap();
    let b = hope.consolidate(t0()).unwrap().chain_ref().unwrap();

    let ids: Vec<_> = hope.walk(b, 1).unwrap().map(|s| s.id).collect();
    assert_eq!(ids, vec![b, a]);

    // Restartable: a second walk starts over
    assert_eq!(hope.walk(b, 1).unwrap().count(), 2);
}

#[test]
fn reinforced_item_is_promoted_without_high_importance() {
    let hope = HopeMemory::new(manual_config()).unwrap();
    let mut id = None;
    for i in 0..4 {
        id = Some(hope.think("routine standup", 0.2, t0() + Duration::minutes(i)).unwrap().item);
    }
    let out = hope.consolidate(t0() + Duration::minutes(4)).unwrap();
    assert!(out.snapshot().unwrap().contains(&id.unwrap()));
}

#[test]
fn weak_old_association_is_pruned_by_sweep() {
    let hope = HopeMemory::new(manual_config()).unwrap();
    let period = Duration::seconds(hope.config().association.half_life_secs as i64);

    hope.associate("coffee", "monday", 0.05, t0()).unwrap();
    let later = t0() + period * 30;
    hope.associate("hope", "memory", 0.9, later).unwrap();

    let report = hope.sweep(later).unwrap();
    assert_eq!(report.pruned.len(), 1);

    let remaining = hope.associations(later).unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining.iter().all(|e| e.a != "coffee" && e.b != "coffee"));
}

#[test]
fn concurrent_appends_against_one_head() {
    const N: usize = 8;
    let chain = Arc::new(MemoryChain::new());
    let th = Thresholds::default();

    let seed = MemoryItem::new("seed", 0.9, t0()).unwrap();
    consolidation::consolidate(&chain, &[(&seed, 0.9)], &th, Capture::default(), t0()).unwrap();
    let start = chain.head_snapshot().unwrap().unwrap();

    let items: Vec<MemoryItem> = (0..N)
        .map(|i| MemoryItem::new(format!("racer {i}"), 0.9, t0()).unwrap())
        .collect();

    let barrier = Arc::new(Barrier::new(N));
    let results: Vec<Result<_, Error>> = thread::scope(|s| {
        let handles: Vec<_> = items
            .iter()
            .map(|item| {
                let chain = Arc::clone(&chain);
                let barrier = Arc::clone(&barrier);
                let start = Arc::clone(&start);
                s.spawn(move || {
                    let snapshot = consolidation::plan(
                        &[(item, 0.9)],
                        Some(start.as_ref()),
                        &th,
                        Capture::default(),
                        t0(),
                    )
                    .unwrap();
                    barrier.wait();
                    chain.append(snapshot)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(Error::ChainConflict { .. })))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, N - 1);

    // Losers re-plan against the fresh head until they land
    for (item, result) in items.iter().zip(&results) {
        if result.is_ok() {
            continue;
        }
        loop {
            match consolidation::consolidate(&chain, &[(item, 0.9)], &th, Capture::default(), t0()) {
                Ok(out) => {
                    assert!(out.is_appended());
                    break;
                }
                Err(e) if e.is_retriable() => continue,
                Err(e) => panic!("unexpected error {e}"),
            }
        }
    }

    let lineage: Vec<_> = chain.walk(ChainTarget::Latest, usize::MAX).unwrap().collect();
    assert_eq!(lineage.len(), N + 1);
    assert!(lineage.windows(2).all(|w| w[0].parent == Some(w[1].id)));
    assert_eq!(lineage[0].items.len(), N + 1);
}

#[test]
fn sessions_sharing_a_chain_converge() {
    const SESSIONS: usize = 4;
    let chain = Arc::new(MemoryChain::new());

    thread::scope(|s| {
        for i in 0..SESSIONS {
            let chain = Arc::clone(&chain);
            s.spawn(move || {
                let hope = HopeMemory::with_chain(manual_config(), chain).unwrap();
                hope.think(&format!("session {i} fact"), 0.9, t0()).unwrap();
                loop {
                    match hope.consolidate(t0()) {
                        Ok(_) => break,
                        Err(e) if e.is_conflict() => continue,
                        Err(e) => panic!("unexpected error {e}"),
                    }
                }
            });
        }
    });

    let lineage: Vec<_> = chain.walk(ChainTarget::Latest, usize::MAX).unwrap().collect();
    assert!(lineage.len() <= SESSIONS);
    assert_eq!(lineage.last().unwrap().parent, None);
    assert_eq!(lineage[0].items.len(), SESSIONS);
}

#[test]
fn engine_round_trips_over_the_wire() {
    let hope = HopeMemory::new(manual_config()).unwrap();
    let think = shp::encode_call(
        "hope_think",
        &Params::new().with("content", "The password is Sponge").with("importance", 0.9),
    )
    .unwrap();
    hope.handle(&think, t0());

    let reply = hope.handle(&shp::encode_call("hope_consolidate", &Params::new()).unwrap(), t0());
    let reference = shp::decode_reference(&reply).unwrap();
    assert_eq!(hope.resolve(reference).unwrap().items.len(), 1);

    // Truncated requests are rejected without touching memory
    for cut in 0..think.len() {
        let reply = hope.handle(&think[..cut], t0());
        assert!(matches!(shp::decode(&reply).unwrap(), shp::Frame::Error { .. }));
    }
    assert_eq!(hope.working_items().unwrap().len(), 1);
}

proptest! {
    #[test]
    fn working_memory_never_exceeds_capacity(
        capacity in 5usize..=9,
        thoughts in proptest::collection::vec((0u8..20, 0.0f64..=1.0), 1..60),
    ) {
        let mut config = HopeConfig::default();
        config.memory.working_capacity = capacity;
        let hope = HopeMemory::new(config).unwrap();

        for (step, (topic, importance)) in thoughts.into_iter().enumerate() {
            let now = t0() + Duration::seconds(step as i64);
            hope.think(&format!("topic {topic}"), importance, now).unwrap();
            prop_assert!(hope.working_items().unwrap().len() <= capacity);
        }
    }
}

//! Memory Chain Cache.
//!
//! An insert-only, content-addressed map from [`ChainRef`] to [`Snapshot`]
//! with a single head pointer.
//!
//! - **resolve / walk**: lock-free reads against the sharded map; `latest`
//!   only takes the head lock long enough to copy the reference out
//! - **append**: the one serialised step, a check-and-advance of the head
//!   under its mutex
//!
//! History is strictly linear. An append whose parent is not the current
//! head is rejected with [`Error::ChainConflict`]; the caller recomputes
//! against the new head and tries again.

mod reference;
mod snapshot;

pub use reference::{ChainRef, ChainTarget};
pub use snapshot::{ConsolidatedItem, Snapshot};

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChainStats {
    pub snapshots: usize,
    pub hits: u64,
    pub misses: u64,
    pub appends: u64,
    pub conflicts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    appends: AtomicU64,
    conflicts: AtomicU64,
}

/// Snapshot store plus head pointer
#[derive(Debug, Default)]
pub struct MemoryChain {
    snapshots: DashMap<ChainRef, Arc<Snapshot>>,
    head: Mutex<Option<ChainRef>>,
    counters: Counters,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `snapshot` and advance the head to it.
    ///
    /// Appending a snapshot that is already stored is a no-op returning its
    /// id. Otherwise the parent must equal the current head.
    pub fn append(&self, snapshot: Snapshot) -> Result<ChainRef> {
        if !snapshot.is_consistent() {
            return Err(Error::invalid_input(format!(
                "snapshot {} does not match its content or its items are unordered",
                snapshot.id
            )));
        }

        let mut head = self.head.lock().map_err(|_| Error::LockPoisoned)?;

        if self.snapshots.contains_key(&snapshot.id) {
            debug!(id = %snapshot.id, "Snapshot already present");
            return Ok(snapshot.id);
        }

        if snapshot.parent != *head {
            self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
            debug!(
                id = %snapshot.id,
                expected = ?snapshot.parent,
                actual = ?*head,
                "Chain conflict"
            );
            return Err(Error::ChainConflict {
                expected: snapshot.parent,
                actual: *head,
            });
        }

        let expected_generation = match &snapshot.parent {
            Some(parent) => self
                .snapshots
                .get(parent)
                .map(|p| p.generation + 1)
                .ok_or_else(|| Error::not_found(format!("parent snapshot {}", parent)))?,
            None => 0,
        };
        if snapshot.generation != expected_generation {
            return Err(Error::invalid_input(format!(
                "snapshot generation {} should be {}",
                snapshot.generation, expected_generation
            )));
        }

        let id = snapshot.id;
        let generation = snapshot.generation;
        self.snapshots.insert(id, Arc::new(snapshot));
        *head = Some(id);
        self.counters.appends.fetch_add(1, Ordering::Relaxed);

        info!(id = %id, generation, "Advanced chain head");
        Ok(id)
    }

    /// Look up a snapshot; `Latest` reads the head at call time
    pub fn resolve(&self, target: impl Into<ChainTarget>) -> Result<Arc<Snapshot>> {
        let id = match target.into() {
            ChainTarget::Id(id) => id,
            ChainTarget::Latest => match self.head()? {
                Some(id) => id,
                None => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    return Err(Error::not_found("chain is empty"));
                }
            },
        };

        match self.snapshots.get(&id) {
            Some(entry) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Arc::clone(entry.value()))
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Err(Error::not_found(format!("snapshot {}", id)))
            }
        }
    }

    /// The target followed by up to `depth` ancestors, newest first.
    ///
    /// The start is resolved eagerly; ancestors are fetched as the iterator
    /// advances. Each call starts a fresh walk.
    pub fn walk(&self, target: impl Into<ChainTarget>, depth: usize) -> Result<ChainWalk<'_>> {
        let start = self.resolve(target)?;
        Ok(ChainWalk {
            chain: self,
            next: Some(start),
            remaining: depth,
        })
    }

    pub fn head(&self) -> Result<Option<ChainRef>> {
        let head = self.head.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(*head)
    }

    /// The head snapshot, or `None` on an empty chain
    pub fn head_snapshot(&self) -> Result<Option<Arc<Snapshot>>> {
        match self.resolve(ChainTarget::Latest) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.is_not_found() && self.head()?.is_none() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn contains(&self, id: &ChainRef) -> bool {
        self.snapshots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats {
            snapshots: self.snapshots.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            appends: self.counters.appends.load(Ordering::Relaxed),
            conflicts: self.counters.conflicts.load(Ordering::Relaxed),
        }
    }
}

/// Lazy walk from a snapshot back toward genesis
pub struct ChainWalk<'a> {
    chain: &'a MemoryChain,
    next: Option<Arc<Snapshot>>,
    remaining: usize,
}

impl Iterator for ChainWalk<'_> {
    type Item = Arc<Snapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        if self.remaining > 0 {
            self.remaining -= 1;
            self.next = current
                .parent
                .as_ref()
                .and_then(|p| self.chain.snapshots.get(p).map(|e| Arc::clone(e.value())));
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::EmotionVector;
    use crate::types::ItemId;
    use chrono::{TimeZone, Utc};

    fn snapshot(parent: Option<&Snapshot>, payloads: &[&str]) -> Snapshot {
        let promoted: Vec<ItemId> = payloads.iter().map(|p| ItemId::for_payload(p)).collect();
        let generation = parent.map(|p| p.generation + 1).unwrap_or(0);
        let parent_id = parent.map(|p| p.id);
        Snapshot {
            id: Snapshot::compute_id(parent_id.as_ref(), generation, &promoted),
            parent: parent_id,
            generation,
            promoted,
            items: Vec::new(),
            emotions: EmotionVector::default(),
            associations: Vec::new(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 8, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_empty_chain() {
        let chain = MemoryChain::new();
        assert!(chain.resolve(ChainTarget::Latest).unwrap_err().is_not_found());
        assert!(chain.head_snapshot().unwrap().is_none());
        assert!(chain.is_empty());
    }

    #[test]
    fn test_append_and_resolve() {
        let chain = MemoryChain::new();
        let a = snapshot(None, &["x"]);
        let id = chain.append(a.clone()).unwrap();

        assert_eq!(chain.head().unwrap(), Some(id));
        assert_eq!(*chain.resolve(id).unwrap(), a);
        assert_eq!(chain.resolve(ChainTarget::Latest).unwrap().id, id);
        assert!(chain.resolve(ChainRef::from_bytes([9; 16])).unwrap_err().is_not_found());
    }

    #[test]
    fn test_append_is_idempotent() {
        let chain = MemoryChain::new();
        let a = snapshot(None, &["x"]);
        let b = snapshot(Some(&a), &["y"]);
        chain.append(a.clone()).unwrap();
        chain.append(b.clone()).unwrap();

        // Re-appending an old snapshot neither errors nor moves the head
        assert_eq!(chain.append(a.clone()).unwrap(), a.id);
        assert_eq!(chain.head().unwrap(), Some(b.id));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_branch_rejected() {
        let chain = MemoryChain::new();
        let a = snapshot(None, &["x"]);
        let b = snapshot(Some(&a), &["y"]);
        let rival = snapshot(Some(&a), &["z"]);
        chain.append(a.clone()).unwrap();
        chain.append(b.clone()).unwrap();

        match chain.append(rival) {
            Err(Error::ChainConflict { expected, actual }) => {
                assert_eq!(expected, Some(a.id));
                assert_eq!(actual, Some(b.id));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(chain.stats().conflicts, 1);
    }

    #[test]
    fn test_rejects_forged_id() {
        let chain = MemoryChain::new();
        let mut a = snapshot(None, &["x"]);
        a.id = ChainRef::from_bytes([0; 16]);
        assert!(matches!(chain.append(a), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_walk() {
        let chain = MemoryChain::new();
        let a = snapshot(None, &["x"]);
        let b = snapshot(Some(&a), &["y"]);
        let c = snapshot(Some(&b), &["z"]);
        for s in [&a, &b, &c] {
            chain.append(s.clone()).unwrap();
        }

        let ids: Vec<_> = chain.walk(b.id, 1).unwrap().map(|s| s.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);

        let ids: Vec<_> = chain.walk(ChainTarget::Latest, 10).unwrap().map(|s| s.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);

        assert_eq!(chain.walk(ChainTarget::Latest, 0).unwrap().count(), 1);
    }

    #[test]
    fn test_stats() {
        let chain = MemoryChain::new();
        let a = snapshot(None, &["x"]);
        chain.append(a.clone()).unwrap();
        chain.resolve(a.id).unwrap();
        let _ = chain.resolve(ChainRef::from_bytes([1; 16]));

        let stats = chain.stats();
        assert_eq!(stats.snapshots, 1);
        assert_eq!(stats.appends, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}

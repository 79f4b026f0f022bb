//! Consolidation: promoting salient items into a new chain snapshot.
//!
//! Planning is a pure function of the candidate items, the current head and
//! the captured context. Appending is left to [`consolidate`], which never
//! retries a conflict on its own.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::chain::{ChainRef, ConsolidatedItem, MemoryChain, Snapshot};
use crate::config::MemoryConfig;
use crate::error::Result;
use crate::layers::{AssociationEdge, EmotionVector};
use crate::types::{ItemId, Layer, MemoryItem};

/// Promotion criteria; either one qualifies an item
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub importance: f64,
    pub repetitions: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&MemoryConfig::default())
    }
}

impl From<&MemoryConfig> for Thresholds {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            importance: config.promotion_threshold,
            repetitions: config.repetition_threshold,
        }
    }
}

impl Thresholds {
    pub fn qualifies(&self, item: &MemoryItem, decayed: f64) -> bool {
        decayed >= self.importance || item.reinforcement >= self.repetitions
    }
}

/// Context stored alongside the promoted items
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub emotions: EmotionVector,
    pub associations: Vec<AssociationEdge>,
}

/// Result of a consolidation pass
#[derive(Debug, Clone)]
pub enum Consolidation {
    /// A new snapshot became the head
    Appended(Arc<Snapshot>),
    /// Nothing new qualified; the current head is returned untouched
    Unchanged(Arc<Snapshot>),
    /// Nothing qualified and the chain has no head yet
    Empty,
}

impl Consolidation {
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            Consolidation::Appended(s) | Consolidation::Unchanged(s) => Some(s),
            Consolidation::Empty => None,
        }
    }

    pub fn chain_ref(&self) -> Option<ChainRef> {
        self.snapshot().map(|s| s.id)
    }

    pub fn is_appended(&self) -> bool {
        matches!(self, Consolidation::Appended(_))
    }
}

/// Build the next snapshot, or `None` when nothing newly qualifies.
///
/// `candidates` pairs each item with its decayed importance at `now`. An item
/// already in the head's cumulative set is only promoted again when its
/// importance now exceeds the importance recorded at its last promotion.
pub fn plan(
    candidates: &[(&MemoryItem, f64)],
    head: Option<&Snapshot>,
    thresholds: &Thresholds,
    capture: Capture,
    now: DateTime<Utc>,
) -> Option<Snapshot> {
    // One entry per id, keeping the highest score
    let mut qualifying: BTreeMap<&ItemId, (&MemoryItem, f64)> = BTreeMap::new();
    for &(item, score) in candidates {
        if !thresholds.qualifies(item, score) {
            continue;
        }
        match qualifying.get(&item.id) {
            Some((_, existing)) if *existing >= score => {}
            _ => {
                qualifying.insert(&item.id, (item, score));
            }
        }
    }

    let fresh: Vec<(&MemoryItem, f64)> = qualifying
        .into_values()
        .filter(|(item, score)| match head.and_then(|h| h.find(&item.id)) {
            Some(prior) => *score > prior.importance,
            None => true,
        })
        .collect();

    if fresh.is_empty() {
        return None;
    }

    let mut items: BTreeMap<ItemId, ConsolidatedItem> = head
        .map(|h| {
            h.items
                .iter()
                .map(|c| (c.item.id.clone(), c.clone()))
                .collect()
        })
        .unwrap_or_default();

    let mut promoted = Vec::with_capacity(fresh.len());
    for (item, score) in fresh {
        let mut item = item.clone();
        item.layer = Layer::LongTerm;
        promoted.push(item.id.clone());
        items.insert(
            item.id.clone(),
            ConsolidatedItem {
                item,
                importance: score,
            },
        );
    }
    promoted.sort();

    let parent = head.map(|h| h.id);
    let generation = head.map(|h| h.generation + 1).unwrap_or(0);

    Some(Snapshot {
        id: Snapshot::compute_id(parent.as_ref(), generation, &promoted),
        parent,
        generation,
        promoted,
        items: items.into_values().collect(),
        emotions: capture.emotions,
        associations: capture.associations,
        created_at: now,
    })
}

/// Plan against the current head and append the result.
///
/// A head that moves between the read and the append surfaces as
/// `ChainConflict`.
pub fn consolidate(
    chain: &MemoryChain,
    candidates: &[(&MemoryItem, f64)],
    thresholds: &Thresholds,
    capture: Capture,
    now: DateTime<Utc>,
) -> Result<Consolidation> {
    let head = chain.head_snapshot()?;

    let Some(snapshot) = plan(candidates, head.as_deref(), thresholds, capture, now) else {
        debug!(candidates = candidates.len(), "Nothing to consolidate");
        return Ok(match head {
            Some(h) => Consolidation::Unchanged(h),
            None => Consolidation::Empty,
        });
    };

    let promoted = snapshot.promoted.len();
    let id = chain.append(snapshot)?;
    let appended = chain.resolve(id)?;
    info!(id = %id, promoted, "Consolidated memories");
    Ok(Consolidation::Appended(appended))
}

//! Immutable consolidated memory state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ChainRef;
use crate::hashing::ID_LEN;
use crate::layers::{AssociationEdge, EmotionVector};
use crate::types::{ItemId, MemoryItem};

/// An item as it stood when it was last promoted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedItem {
    pub item: MemoryItem,
    /// Decayed importance at promotion time
    pub importance: f64,
}

/// A chain-linked capture of everything consolidated up to one generation.
///
/// `items` is cumulative, so a single resolve yields the full context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: ChainRef,
    pub parent: Option<ChainRef>,
    pub generation: u64,
    /// Items newly promoted in this generation, sorted
    pub promoted: Vec<ItemId>,
    /// Cumulative consolidated set, sorted by item id
    pub items: Vec<ConsolidatedItem>,
    pub emotions: EmotionVector,
    pub associations: Vec<AssociationEdge>,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Identifier over (parent, generation, sorted promoted ids).
    ///
    /// Promoted ids are sorted here too, so callers may pass them in any order.
    pub fn compute_id(parent: Option<&ChainRef>, generation: u64, promoted: &[ItemId]) -> ChainRef {
        let mut sorted: Vec<&ItemId> = promoted.iter().collect();
        sorted.sort();

        let mut hasher = Sha256::new();
        match parent {
            Some(p) => {
                hasher.update([1u8]);
                hasher.update(p.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update(generation.to_be_bytes());
        for id in sorted {
            let bytes = id.as_str().as_bytes();
            hasher.update((bytes.len() as u32).to_be_bytes());
            hasher.update(bytes);
        }

        let digest = hasher.finalize();
        let mut out = [0u8; ID_LEN];
        out.copy_from_slice(&digest[..ID_LEN]);
        ChainRef::from_bytes(out)
    }

    /// Whether `id` matches the content it claims to address and `items`
    /// is strictly ordered by item id, which lookups rely on
    pub fn is_consistent(&self) -> bool {
        self.id == Self::compute_id(self.parent.as_ref(), self.generation, &self.promoted)
            && self.items.windows(2).all(|w| w[0].item.id < w[1].item.id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.find(id).is_some()
    }

    pub fn find(&self, id: &ItemId) -> Option<&ConsolidatedItem> {
        self.items
            .binary_search_by(|c| c.item.id.cmp(id))
            .ok()
            .map(|idx| &self.items[idx])
    }

    pub fn is_genesis(&self) -> bool {
        self.parent.is_none()
    }
}

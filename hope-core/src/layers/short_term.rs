//! Short-term store: session memories demoted from working memory.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::decay::{DecayModel, elapsed_secs};
use crate::error::Result;
use crate::types::{ItemId, Layer, MemoryItem};

/// Session-scoped items with a retention window.
///
/// Sweeping is a hard delete; swept items are returned for audit and are
/// not recoverable from this store afterwards.
#[derive(Debug, Clone)]
pub struct ShortTermStore {
    items: HashMap<ItemId, MemoryItem>,
    retention: Duration,
    deletion_floor: f64,
    model: DecayModel,
}

impl ShortTermStore {
    pub fn new(retention: Duration, deletion_floor: f64, model: DecayModel) -> Self {
        Self {
            items: HashMap::new(),
            retention,
            deletion_floor,
            model,
        }
    }

    /// Insert or replace an item
    pub fn admit(&mut self, mut item: MemoryItem) {
        item.layer = Layer::ShortTerm;
        self.items.insert(item.id.clone(), item);
    }

    pub fn get(&self, id: &ItemId) -> Option<&MemoryItem> {
        self.items.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &ItemId) -> Option<&mut MemoryItem> {
        self.items.get_mut(id)
    }

    /// Take an item out, e.g. when it is recalled into working memory
    pub fn remove(&mut self, id: &ItemId) -> Option<MemoryItem> {
        self.items.remove(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &MemoryItem> {
        self.items.values()
    }

    /// Most recently created items first
    pub fn recent(&self, limit: usize) -> Vec<&MemoryItem> {
        let mut items: Vec<_> = self.items.values().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        items.truncate(limit);
        items
    }

    /// Fail with `InvalidInput` if `now` precedes any item's last access
    pub(crate) fn check_clock(&self, now: DateTime<Utc>) -> Result<()> {
        for item in self.items.values() {
            elapsed_secs(item.last_access, now)?;
        }
        Ok(())
    }

    /// Hard-delete expired or faded items and return them.
    ///
    /// Validates `now` against every item before removing anything, so an
    /// invalid timestamp leaves the store untouched.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Result<Vec<MemoryItem>> {
        self.check_clock(now)?;

        let mut doomed = Vec::new();
        for item in self.items.values() {
            let importance = self.model.decayed_importance(item, now)?;
            if importance < self.deletion_floor || item.age(now) > self.retention {
                doomed.push(item.id.clone());
            }
        }

        let mut removed: Vec<MemoryItem> = doomed
            .iter()
            .filter_map(|id| self.items.remove(id))
            .collect();
        removed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        if !removed.is_empty() {
            debug!(count = removed.len(), "Swept short-term memory");
        }
        Ok(removed)
    }
}

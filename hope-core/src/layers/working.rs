//! Working memory: the handful of items active right now.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;

use crate::decay::DecayModel;
use crate::types::{ItemId, Layer, MemoryItem};

/// Bounded buffer of the most recent active items, newest first.
#[derive(Debug, Clone)]
pub struct WorkingMemory {
    items: VecDeque<MemoryItem>,
    capacity: usize,
    model: DecayModel,
}

impl WorkingMemory {
    pub fn new(capacity: usize, model: DecayModel) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
            model,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert at the front and return the item evicted to make room, if any.
    ///
    /// An item already present under the same id is replaced in place of a
    /// duplicate. The victim is the lowest decayed importance at the newest
    /// timestamp seen in the buffer, ties broken by oldest last access.
    pub fn push(&mut self, mut item: MemoryItem) -> Option<MemoryItem> {
        item.layer = Layer::Working;
        if let Some(pos) = self.position(&item.id) {
            self.items.remove(pos);
        }
        self.items.push_front(item);

        if self.items.len() <= self.capacity {
            return None;
        }

        let now = self
            .items
            .iter()
            .map(|i| i.last_access)
            .max()
            .unwrap_or_else(Utc::now);
        let victim = self.eviction_candidate(now)?;
        let mut evicted = self.items.remove(victim)?;
        evicted.layer = Layer::ShortTerm;
        debug!(id = %evicted.id, "Evicted item from working memory");
        Some(evicted)
    }

    /// Reinforce an item if present; returns whether it was found
    pub fn touch(&mut self, id: &ItemId, now: DateTime<Utc>) -> bool {
        match self.items.iter_mut().find(|i| &i.id == id) {
            Some(item) => {
                item.reinforce(now);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &ItemId) -> Option<&MemoryItem> {
        self.items.iter().find(|i| &i.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &ItemId) -> Option<&mut MemoryItem> {
        self.items.iter_mut().find(|i| &i.id == id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.position(id).is_some()
    }

    /// Items in recency order, newest first
    pub fn items(&self) -> impl Iterator<Item = &MemoryItem> {
        self.items.iter()
    }

    /// Items with their decayed importance, most salient first.
    ///
    /// Items whose last access lies after `now` are ranked at full importance.
    pub fn ranked(&self, now: DateTime<Utc>) -> Vec<(&MemoryItem, f64)> {
        let mut ranked: Vec<_> = self
            .items
            .iter()
            .map(|i| {
                let score = self.model.decayed_importance(i, now).unwrap_or(i.importance);
                (i, score)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    fn position(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|i| &i.id == id)
    }

    fn eviction_candidate(&self, now: DateTime<Utc>) -> Option<usize> {
        self.items
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let sa = self.model.decayed_importance(a, now).unwrap_or(a.importance);
                let sb = self.model.decayed_importance(b, now).unwrap_or(b.importance);
                sa.total_cmp(&sb).then(a.last_access.cmp(&b.last_access))
            })
            .map(|(idx, _)| idx)
    }
}

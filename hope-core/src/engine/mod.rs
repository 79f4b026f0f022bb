//! The memory engine: one session's layers in front of a shared chain.
//!
//! ```text
//! think ──▶ Working ──evict──▶ Short-Term ──consolidate──▶ Snapshot ──▶ MemoryChain
//!                                                                         │
//!                                          resolve(ChainRef | latest) ◀───┘
//! ```
//!
//! Layers sit behind one mutex per [`HopeMemory`]; the [`MemoryChain`] is
//! shared through an `Arc` and serialises only its head advance.

mod dispatch;
#[cfg(feature = "db")]
mod durable;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::chain::{ChainRef, ChainStats, ChainTarget, ChainWalk, MemoryChain, Snapshot};
use crate::config::HopeConfig;
use crate::consolidation::{self, Capture, Consolidation, Thresholds};
use crate::decay::{DecayModel, elapsed_secs};
use crate::error::{Error, Result};
use crate::layers::{
    AssociationEdge, AssociativeNetwork, Emotion, EmotionState, EmotionVector, RelationalEntity,
    RelationalGraph, ShortTermStore, WorkingMemory,
};
use crate::recall::{self, Recollection, SemanticIndex, Source};
use crate::types::{ItemId, Layer, MemoryItem, check_unit};

/// Associations weaker than this are left out of recall
const RECALL_MIN_STRENGTH: f64 = 0.3;

/// Results requested from the semantic index per recall
const SEMANTIC_TOP_K: usize = 5;

/// Outcome of [`HopeMemory::think`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thought {
    pub item: ItemId,
    /// Chain head after the call; `None` until something is consolidated
    pub head: Option<ChainRef>,
}

/// What a sweep deleted
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub removed: Vec<MemoryItem>,
    pub pruned: Vec<AssociationEdge>,
}

/// Point-in-time overview of every layer
#[derive(Debug, Clone, Serialize)]
pub struct CognitiveStatus {
    pub working: usize,
    pub working_capacity: usize,
    pub short_term: usize,
    pub long_term: usize,
    pub head: Option<ChainRef>,
    pub generation: Option<u64>,
    pub dominant_emotion: Option<(Emotion, f64)>,
    pub people: usize,
    pub associations: usize,
    pub chain: ChainStats,
}

struct Session {
    working: WorkingMemory,
    short_term: ShortTermStore,
    emotions: EmotionState,
    people: RelationalGraph,
    associations: AssociativeNetwork,
    model: DecayModel,
    thoughts_since_consolidation: u32,
}

impl Session {
    fn new(config: &HopeConfig) -> Self {
        let model = DecayModel::from(&config.memory);
        let retention = config.memory.retention();
        Self {
            working: WorkingMemory::new(config.memory.working_capacity, model),
            short_term: ShortTermStore::new(retention, config.memory.deletion_floor, model),
            emotions: EmotionState::new(config.emotion.half_life_secs as f64),
            people: RelationalGraph::new(config.relational.half_life_secs as f64),
            associations: AssociativeNetwork::new(&config.association),
            model,
            thoughts_since_consolidation: 0,
        }
    }

    fn demote(&mut self, evicted: Option<MemoryItem>) {
        if let Some(item) = evicted {
            self.short_term.admit(item);
        }
    }
}

/// Items from working and short-term memory with their decayed importance
fn candidates<'a>(
    working: &'a WorkingMemory,
    short_term: &'a ShortTermStore,
    model: &DecayModel,
    now: DateTime<Utc>,
) -> Result<Vec<(&'a MemoryItem, f64)>> {
    working
        .items()
        .chain(short_term.items())
        .map(|item| Ok((item, model.decayed_importance(item, now)?)))
        .collect()
}

/// Layered memory for one session scope
pub struct HopeMemory {
    config: HopeConfig,
    thresholds: Thresholds,
    session: Mutex<Session>,
    chain: Arc<MemoryChain>,
    index: Option<Arc<dyn SemanticIndex>>,
    #[cfg(feature = "db")]
    archive: Option<crate::archive::SnapshotArchive>,
}

impl HopeMemory {
    /// Engine with a private chain
    pub fn new(config: HopeConfig) -> Result<Self> {
        Self::with_chain(config, Arc::new(MemoryChain::new()))
    }

    /// Engine appending to a chain shared with other sessions
    pub fn with_chain(config: HopeConfig, chain: Arc<MemoryChain>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            thresholds: Thresholds::from(&config.memory),
            session: Mutex::new(Session::new(&config)),
            config,
            chain,
            index: None,
            #[cfg(feature = "db")]
            archive: None,
        })
    }

    /// Attach a semantic index for long-term recall
    pub fn with_index(mut self, index: Arc<dyn SemanticIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn config(&self) -> &HopeConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<MemoryChain> {
        &self.chain
    }

    fn lock(&self) -> Result<MutexGuard<'_, Session>> {
        self.session.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Bring a thought into working memory.
    ///
    /// Thinking a payload already held reinforces it and keeps the higher of
    /// the two importances. Every `consolidate_every` thoughts a consolidation
    /// runs; if it cannot (a conflict, or a clock behind some stored memory)
    /// it is logged and retried on the next thought.
    pub fn think(&self, payload: &str, importance: f64, now: DateTime<Utc>) -> Result<Thought> {
        self.think_feeling(payload, importance, &[], now)
    }

    /// [`think`](Self::think) while feeling `emotions`.
    ///
    /// The emotions are blended into the emotional state first and the
    /// thought is stamped with the result. Without emotions the thought is
    /// stamped with the current state. Every input is validated before
    /// anything changes.
    pub fn think_feeling(
        &self,
        payload: &str,
        importance: f64,
        emotions: &[(Emotion, f64)],
        now: DateTime<Utc>,
    ) -> Result<Thought> {
        let item = new_item(payload, importance, now)?;
        let id = item.id.clone();

        let mut guard = self.lock()?;
        let session = &mut *guard;

        let held = session
            .working
            .get(&id)
            .or_else(|| session.short_term.get(&id))
            .map(|existing| existing.last_access);
        if let Some(last_access) = held {
            elapsed_secs(last_access, now)?;
        }

        // Last fallible step; everything after it applies in full
        let mood = if emotions.is_empty() {
            session.emotions.current(now)
        } else {
            session.emotions.feel(emotions, now)?
        };

        if let Some(existing) = session.working.get_mut(&id) {
            existing.importance = existing.importance.max(importance);
            existing.reinforce(now);
            existing.emotion = mood;
            debug!(id = %id, reinforcement = existing.reinforcement, "Reinforced working memory");
        } else if let Some(mut recalled) = session.short_term.remove(&id) {
            recalled.importance = recalled.importance.max(importance);
            recalled.reinforce(now);
            recalled.emotion = mood;
            debug!(id = %id, "Recalled short-term memory into working memory");
            let evicted = session.working.push(recalled);
            session.demote(evicted);
        } else {
            let evicted = session.working.push(item.with_emotion(mood));
            session.demote(evicted);
        }

        session.thoughts_since_consolidation += 1;
        let every = self.config.memory.consolidate_every;
        if every > 0 && session.thoughts_since_consolidation >= every {
            // The thought is already stored, so a failed pass must not fail the call
            if let Err(e) = self.consolidate_session(session, now) {
                warn!(error = %e, "Automatic consolidation skipped; will retry on the next thought");
            }
        }

        Ok(Thought {
            item: id,
            head: self.chain.head()?,
        })
    }

    /// Store a memory straight into short-term, bypassing working memory
    pub fn note(&self, payload: &str, importance: f64, now: DateTime<Utc>) -> Result<ItemId> {
        let item = new_item(payload, importance, now)?;
        let id = item.id.clone();

        let mut guard = self.lock()?;
        let session = &mut *guard;

        let existing = match session.working.get_mut(&id) {
            Some(existing) => Some(existing),
            None => session.short_term.get_mut(&id),
        };
        match existing {
            Some(existing) => {
                elapsed_secs(existing.last_access, now)?;
                existing.importance = existing.importance.max(importance);
                existing.reinforce(now);
            }
            None => session.short_term.admit(item),
        }
        Ok(id)
    }

    /// Reinforce an item in working or short-term memory; `false` if absent
    pub fn touch(&self, id: &ItemId, now: DateTime<Utc>) -> Result<bool> {
        let mut guard = self.lock()?;
        let session = &mut *guard;

        let item = match session.working.get_mut(id) {
            Some(item) => Some(item),
            None => session.short_term.get_mut(id),
        };
        match item {
            Some(item) => {
                elapsed_secs(item.last_access, now)?;
                item.reinforce(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn feel(&self, updates: &[(Emotion, f64)], now: DateTime<Utc>) -> Result<EmotionVector> {
        self.lock()?.emotions.feel(updates, now)
    }

    pub fn feel_named(&self, updates: &[(&str, f64)], now: DateTime<Utc>) -> Result<EmotionVector> {
        self.lock()?.emotions.feel_named(updates, now)
    }

    pub fn emotions(&self, now: DateTime<Utc>) -> Result<EmotionVector> {
        Ok(self.lock()?.emotions.current(now))
    }

    pub fn meet(&self, name: &str, role: &str, now: DateTime<Utc>) -> Result<RelationalEntity> {
        self.lock()?.people.meet(name, role, now)
    }

    pub fn person(&self, name: &str) -> Result<Option<RelationalEntity>> {
        Ok(self.lock()?.people.get(name).cloned())
    }

    pub fn associate(&self, a: &str, b: &str, strength: f64, now: DateTime<Utc>) -> Result<AssociationEdge> {
        self.lock()?.associations.associate(a, b, strength, now)
    }

    pub fn associations(&self, now: DateTime<Utc>) -> Result<Vec<AssociationEdge>> {
        Ok(self.lock()?.associations.edges(now))
    }

    /// Concepts linked to `concept` at or above `min_strength`, strongest first
    pub fn associated(&self, concept: &str, min_strength: f64, now: DateTime<Utc>) -> Result<Vec<(String, f64)>> {
        Ok(self.lock()?.associations.associated(concept, min_strength, now))
    }

    /// Promote what qualifies into a new snapshot on the shared chain.
    ///
    /// `ChainConflict` is returned as-is; calling again re-plans against the
    /// new head.
    pub fn consolidate(&self, now: DateTime<Utc>) -> Result<Consolidation> {
        let mut guard = self.lock()?;
        self.consolidate_session(&mut guard, now)
    }

    fn consolidate_session(&self, session: &mut Session, now: DateTime<Utc>) -> Result<Consolidation> {
        // Validate before the prune below mutates anything
        session.associations.check_clock(now)?;
        let candidates = candidates(&session.working, &session.short_term, &session.model, now)?;

        session.associations.prune(now)?;
        let capture = Capture {
            emotions: session.emotions.current(now),
            associations: session.associations.edges(now),
        };

        let outcome = consolidation::consolidate(&self.chain, &candidates, &self.thresholds, capture, now)?;
        session.thoughts_since_consolidation = 0;
        Ok(outcome)
    }

    pub fn resolve(&self, target: impl Into<ChainTarget>) -> Result<Arc<Snapshot>> {
        self.chain.resolve(target)
    }

    pub fn walk(&self, target: impl Into<ChainTarget>, depth: usize) -> Result<ChainWalk<'_>> {
        self.chain.walk(target, depth)
    }

    /// Delete faded short-term items and prune weak associations.
    ///
    /// Both layers are checked against `now` before either is touched.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut guard = self.lock()?;
        let session = &mut *guard;

        session.short_term.check_clock(now)?;
        session.associations.check_clock(now)?;

        let removed = session.short_term.sweep(now)?;
        let pruned = session.associations.prune(now)?;
        debug!(removed = removed.len(), pruned = pruned.len(), "Swept memory");
        Ok(SweepReport { removed, pruned })
    }

    /// Recall by text across every layer, most salient first
    pub fn remember(&self, query: &str, now: DateTime<Utc>) -> Result<Vec<Recollection>> {
        let words = recall::query_words(query);
        if words.is_empty() {
            return Err(Error::invalid_input("recall query must not be empty"));
        }

        let mut out = Vec::new();
        let head = self.chain.head_snapshot()?;
        {
            let session = self.lock()?;

            for (item, score) in session.working.ranked(now) {
                if recall::matches(&words, &item.payload) {
                    out.push(recollect(item, score, Source::Layer(Layer::Working)));
                }
            }
            for item in session.short_term.recent(usize::MAX) {
                if recall::matches(&words, &item.payload) {
                    let score = session.model.decayed_importance(item, now).unwrap_or(item.importance);
                    out.push(recollect(item, score, Source::Layer(Layer::ShortTerm)));
                }
            }

            let concept = words.join(" ");
            for (other, strength) in session.associations.associated(&concept, RECALL_MIN_STRENGTH, now) {
                out.push(Recollection {
                    id: None,
                    text: other,
                    score: strength,
                    source: Source::Association,
                });
            }
        }

        if let Some(head) = &head {
            for consolidated in &head.items {
                if recall::matches(&words, &consolidated.item.payload)
                    && !out.iter().any(|r| r.id.as_ref() == Some(&consolidated.item.id))
                {
                    out.push(recollect(
                        &consolidated.item,
                        consolidated.importance,
                        Source::Layer(Layer::LongTerm),
                    ));
                }
            }
        }

        if let Some(index) = &self.index {
            for (id, score) in index.query(query, SEMANTIC_TOP_K)? {
                let item_id = ItemId::from(id.as_str());
                if out.iter().any(|r| r.id.as_ref() == Some(&item_id)) {
                    continue;
                }
                let text = head
                    .as_ref()
                    .and_then(|h| h.find(&item_id))
                    .map(|c| c.item.payload.clone())
                    .unwrap_or(id);
                out.push(Recollection {
                    id: Some(item_id),
                    text,
                    score: f64::from(score),
                    source: Source::Semantic,
                });
            }
        }

        out.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(out)
    }

    pub fn status(&self, now: DateTime<Utc>) -> Result<CognitiveStatus> {
        let head = self.chain.head_snapshot()?;
        let session = self.lock()?;
        Ok(CognitiveStatus {
            working: session.working.len(),
            working_capacity: session.working.capacity(),
            short_term: session.short_term.len(),
            long_term: head.as_ref().map(|h| h.items.len()).unwrap_or(0),
            head: head.as_ref().map(|h| h.id),
            generation: head.as_ref().map(|h| h.generation),
            dominant_emotion: session.emotions.dominant(now),
            people: session.people.len(),
            associations: session.associations.len(),
            chain: self.chain.stats(),
        })
    }

    /// Items currently in working memory, newest first
    pub fn working_items(&self) -> Result<Vec<MemoryItem>> {
        Ok(self.lock()?.working.items().cloned().collect())
    }

    /// Up to `limit` short-term items, most recently created first
    pub fn recent(&self, limit: usize) -> Result<Vec<MemoryItem>> {
        Ok(self.lock()?.short_term.recent(limit).into_iter().cloned().collect())
    }
}

fn new_item(payload: &str, importance: f64, now: DateTime<Utc>) -> Result<MemoryItem> {
    if payload.trim().is_empty() {
        return Err(Error::invalid_input("payload must not be empty"));
    }
    check_unit("importance", importance)?;
    MemoryItem::new(payload, importance, now)
}

fn recollect(item: &MemoryItem, score: f64, source: Source) -> Recollection {
    Recollection {
        id: Some(item.id.clone()),
        text: item.payload.clone(),
        score,
        source,
    }
}

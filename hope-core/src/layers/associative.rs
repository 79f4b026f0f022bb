//! Associative network: weighted, decaying links between concepts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::config::AssociationConfig;
use crate::decay::{decay_factor, elapsed_secs};
use crate::error::{Error, Result};
use crate::types::check_unit;

/// Link between two concepts; the pair is unordered and stored sorted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationEdge {
    pub a: String,
    pub b: String,
    pub strength: f64,
    pub last_reinforced: DateTime<Utc>,
}

impl AssociationEdge {
    /// The other end of the edge, if `concept` is one end
    pub fn other(&self, concept: &str) -> Option<&str> {
        let concept = normalize(concept);
        if self.a == concept {
            Some(&self.b)
        } else if self.b == concept {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// Network of edges with lazily computed decay
#[derive(Debug, Clone)]
pub struct AssociativeNetwork {
    edges: HashMap<(String, String), AssociationEdge>,
    half_life_secs: f64,
    prune_floor: f64,
    reinforcement_step: f64,
}

impl AssociativeNetwork {
    pub fn new(config: &AssociationConfig) -> Self {
        Self {
            edges: HashMap::new(),
            half_life_secs: config.half_life_secs as f64,
            prune_floor: config.prune_floor,
            reinforcement_step: config.reinforcement_step,
        }
    }

    /// Link two concepts, or reinforce an existing link.
    ///
    /// A new edge starts at `strength`; an existing edge gains the
    /// reinforcement step on top of its decayed strength, capped at 1.
    pub fn associate(
        &mut self,
        a: &str,
        b: &str,
        strength: f64,
        now: DateTime<Utc>,
    ) -> Result<AssociationEdge> {
        check_unit("strength", strength)?;
        let key = edge_key(a, b)?;

        let edge = match self.edges.get(&key) {
            Some(existing) => {
                elapsed_secs(existing.last_reinforced, now)?;
                let decayed = self.decayed(existing, now);
                AssociationEdge {
                    strength: (decayed + self.reinforcement_step).min(1.0),
                    last_reinforced: now,
                    ..existing.clone()
                }
            }
            None => AssociationEdge {
                a: key.0.clone(),
                b: key.1.clone(),
                strength,
                last_reinforced: now,
            },
        };

        self.edges.insert(key, edge.clone());
        Ok(edge)
    }

    /// Insert an edge as-is, e.g. when restoring persisted state
    pub fn insert(&mut self, edge: AssociationEdge) -> Result<()> {
        check_unit("strength", edge.strength)?;
        let key = edge_key(&edge.a, &edge.b)?;
        self.edges.insert(
            key.clone(),
            AssociationEdge {
                a: key.0,
                b: key.1,
                ..edge
            },
        );
        Ok(())
    }

    /// Strength of an edge decayed to `now`
    pub fn strength(&self, a: &str, b: &str, now: DateTime<Utc>) -> Option<f64> {
        let key = edge_key(a, b).ok()?;
        self.edges.get(&key).map(|e| self.decayed(e, now))
    }

    /// Concepts linked to `concept` at or above `min_strength`, strongest first
    pub fn associated(&self, concept: &str, min_strength: f64, now: DateTime<Utc>) -> Vec<(String, f64)> {
        let mut out: Vec<_> = self
            .edges
            .values()
            .filter_map(|e| {
                let other = e.other(concept)?;
                let s = self.decayed(e, now);
                (s >= min_strength).then(|| (other.to_string(), s))
            })
            .collect();
        out.sort_by(|x, y| y.1.total_cmp(&x.1).then_with(|| x.0.cmp(&y.0)));
        out
    }

    /// Decay pass: destroy every edge whose decayed strength is below the floor.
    ///
    /// Timestamps are validated first so a bad `now` prunes nothing.
    pub fn prune(&mut self, now: DateTime<Utc>) -> Result<Vec<AssociationEdge>> {
        self.check_clock(now)?;

        let doomed: Vec<_> = self
            .edges
            .iter()
            .filter(|(_, e)| self.decayed(e, now) < self.prune_floor)
            .map(|(k, _)| k.clone())
            .collect();

        let mut pruned: Vec<_> = doomed.iter().filter_map(|k| self.edges.remove(k)).collect();
        pruned.sort_by(|x, y| (&x.a, &x.b).cmp(&(&y.a, &y.b)));

        if !pruned.is_empty() {
            debug!(count = pruned.len(), "Pruned association edges");
        }
        Ok(pruned)
    }

    /// Copies of every edge with strength decayed to `now`, sorted by pair
    pub fn edges(&self, now: DateTime<Utc>) -> Vec<AssociationEdge> {
        let mut out: Vec<_> = self
            .edges
            .values()
            .map(|e| AssociationEdge {
                strength: self.decayed(e, now),
                ..e.clone()
            })
            .collect();
        out.sort_by(|x, y| (&x.a, &x.b).cmp(&(&y.a, &y.b)));
        out
    }

    /// Fail with `InvalidInput` if `now` precedes any edge's last reinforcement
    pub(crate) fn check_clock(&self, now: DateTime<Utc>) -> Result<()> {
        for edge in self.edges.values() {
            elapsed_secs(edge.last_reinforced, now)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    fn decayed(&self, edge: &AssociationEdge, now: DateTime<Utc>) -> f64 {
        let elapsed = elapsed_secs(edge.last_reinforced, now).unwrap_or(0.0);
        edge.strength * decay_factor(elapsed, self.half_life_secs)
    }
}

fn normalize(concept: &str) -> String {
    concept.trim().to_lowercase()
}

fn edge_key(a: &str, b: &str) -> Result<(String, String)> {
    let (a, b) = (normalize(a), normalize(b));
    if a.is_empty() || b.is_empty() {
        return Err(Error::invalid_input("association concepts must not be empty"));
    }
    if a == b {
        return Err(Error::invalid_input(format!("cannot associate {:?} with itself", a)));
    }
    Ok(if a <= b { (a, b) } else { (b, a) })
}

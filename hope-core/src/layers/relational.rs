//! Relational layer: who the agent has met.
//!
//! Identity never decays; only the recency-derived salience does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::decay::{decay_factor, elapsed_secs};
use crate::error::{Error, Result};

/// Someone the agent has interacted with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationalEntity {
    pub name: String,
    pub role: String,
    pub first_seen: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
    pub interaction_count: u32,
}

/// Entities keyed by case-folded name
#[derive(Debug, Clone)]
pub struct RelationalGraph {
    people: HashMap<String, RelationalEntity>,
    half_life_secs: f64,
}

impl RelationalGraph {
    pub fn new(half_life_secs: f64) -> Self {
        Self {
            people: HashMap::new(),
            half_life_secs,
        }
    }

    /// Record an encounter, creating the entity on first meeting.
    ///
    /// The role given at first meeting sticks unless it was left empty.
    pub fn meet(&mut self, name: &str, role: &str, now: DateTime<Utc>) -> Result<RelationalEntity> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_input("entity name must not be empty"));
        }

        let key = name.to_lowercase();
        let entity = match self.people.get_mut(&key) {
            Some(existing) => {
                elapsed_secs(existing.last_interaction, now)?;
                existing.last_interaction = now;
                existing.interaction_count = existing.interaction_count.saturating_add(1);
                if existing.role.is_empty() {
                    existing.role = role.to_string();
                }
                existing.clone()
            }
            None => {
                let entity = RelationalEntity {
                    name: name.to_string(),
                    role: role.to_string(),
                    first_seen: now,
                    last_interaction: now,
                    interaction_count: 1,
                };
                self.people.insert(key, entity.clone());
                entity
            }
        };
        Ok(entity)
    }

    pub fn get(&self, name: &str) -> Option<&RelationalEntity> {
        self.people.get(&name.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelationalEntity> {
        self.people.values()
    }

    /// Recency decay times familiarity, in [0, 1]; `None` for strangers
    pub fn salience(&self, name: &str, now: DateTime<Utc>) -> Option<f64> {
        let entity = self.get(name)?;
        let elapsed = elapsed_secs(entity.last_interaction, now).unwrap_or(0.0);
        let recency = decay_factor(elapsed, self.half_life_secs);
        let familiarity = 1.0 - 0.5_f64.powi(entity.interaction_count.min(64) as i32);
        Some(recency * familiarity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 8, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_meet_creates_then_updates() {
        let mut graph = RelationalGraph::new(604_800.0);
        let bob = graph.meet("Bob", "Colleague", t0()).unwrap();
        assert_eq!(bob.interaction_count, 1);

        let bob = graph.meet("bob", "Stranger", t0() + Duration::hours(1)).unwrap();
        assert_eq!(bob.interaction_count, 2);
        assert_eq!(bob.role, "Colleague");
        assert_eq!(bob.name, "Bob");
        assert_eq!(bob.first_seen, t0());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_meet_rejects_bad_input() {
        let mut graph = RelationalGraph::new(604_800.0);
        assert!(graph.meet("  ", "x", t0()).is_err());

        graph.meet("Alice", "Manager", t0()).unwrap();
        assert!(graph.meet("Alice", "Manager", t0() - Duration::hours(1)).is_err());
        assert_eq!(graph.get("alice").unwrap().interaction_count, 1);
    }

    #[test]
    fn test_salience_fades_but_identity_stays() {
        let mut graph = RelationalGraph::new(3600.0);
        graph.meet("Alice", "Manager", t0()).unwrap();
        graph.meet("Alice", "Manager", t0()).unwrap();

        let fresh = graph.salience("Alice", t0()).unwrap();
        let stale = graph.salience("Alice", t0() + Duration::days(30)).unwrap();
        assert!((fresh - 0.75).abs() < 1e-9);
        assert!(stale < fresh);
        assert!(graph.get("Alice").is_some());
        assert!(graph.salience("Mallory", t0()).is_none());
    }
}

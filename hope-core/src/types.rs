//! Memory item types shared by every layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};
use crate::hashing::content_hash;
use crate::layers::EmotionVector;

/// Content-derived identifier of a memory item.
///
/// The same payload always yields the same id, so thinking something twice
/// reinforces one item instead of storing a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Derive the id for a payload
    pub fn for_payload(payload: &str) -> Self {
        Self(content_hash(payload))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Layer currently owning an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Working,
    ShortTerm,
    LongTerm,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Working => write!(f, "working"),
            Layer::ShortTerm => write!(f, "short_term"),
            Layer::LongTerm => write!(f, "long_term"),
        }
    }
}

impl std::str::FromStr for Layer {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "working" => Ok(Layer::Working),
            "short_term" => Ok(Layer::ShortTerm),
            "long_term" => Ok(Layer::LongTerm),
            _ => Err(format!("Invalid memory layer: {}", s)),
        }
    }
}

/// A unit of remembered content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: ItemId,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    /// Base importance in [0, 1]
    pub importance: f64,
    /// Number of repeat accesses
    pub reinforcement: u32,
    pub last_access: DateTime<Utc>,
    pub tags: BTreeSet<String>,
    pub layer: Layer,
    /// Emotional context the item was last thought in
    #[serde(default)]
    pub emotion: EmotionVector,
}

impl MemoryItem {
    /// Create a new working-memory item; importance must be within [0, 1]
    pub fn new(payload: impl Into<String>, importance: f64, now: DateTime<Utc>) -> Result<Self> {
        let payload = payload.into();
        check_unit("importance", importance)?;

        Ok(Self {
            id: ItemId::for_payload(&payload),
            payload,
            created_at: now,
            importance,
            reinforcement: 0,
            last_access: now,
            tags: BTreeSet::new(),
            layer: Layer::Working,
            emotion: EmotionVector::default(),
        })
    }

    /// Attach tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Record a repeat access: bump the count and reset the decay clock.
    ///
    /// A `now` earlier than the last access leaves the clock where it is.
    pub fn reinforce(&mut self, now: DateTime<Utc>) {
        self.reinforcement = self.reinforcement.saturating_add(1);
        if now > self.last_access {
            self.last_access = now;
        }
    }

    /// Stamp the emotional context the item was thought in
    pub fn with_emotion(mut self, emotion: EmotionVector) -> Self {
        self.emotion = emotion;
        self
    }

    /// Age since creation
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// Reject values outside [0, 1], including NaN
pub(crate) fn check_unit(field: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::invalid_input(format!(
            "{} must be within [0, 1], got {}",
            field, value
        )))
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
    fn test_item_id_is_content_derived() {
        let a = MemoryItem::new("The password is Sponge", 0.9, t0()).unwrap();
        let b = MemoryItem::new("The password is Sponge", 0.2, t0() + Duration::hours(1)).unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, ItemId::for_payload("The password is Squid"));
    }

    #[test]
    fn test_rejects_out_of_range_importance() {
        assert!(MemoryItem::new("x", 1.01, t0()).is_err());
        assert!(MemoryItem::new("x", -0.1, t0()).is_err());
        assert!(MemoryItem::new("x", f64::NAN, t0()).is_err());
    }

    #[test]
    fn test_reinforce() {
        let mut item = MemoryItem::new("x", 0.5, t0()).unwrap();
        item.reinforce(t0() + Duration::minutes(5));
        assert_eq!(item.reinforcement, 1);
        assert_eq!(item.last_access, t0() + Duration::minutes(5));

        // Out-of-order timestamp does not rewind the clock
        item.reinforce(t0());
        assert_eq!(item.reinforcement, 2);
        assert_eq!(item.last_access, t0() + Duration::minutes(5));
    }

    #[test]
    fn test_layer_roundtrip() {
        for layer in [Layer::Working, Layer::ShortTerm, Layer::LongTerm] {
            assert_eq!(layer.to_string().parse::<Layer>().unwrap(), layer);
        }
        assert!("episodic".parse::<Layer>().is_err());
    }
}

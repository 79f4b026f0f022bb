//! Emotional layer: 21 independent intensity axes decaying toward zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decay::{decay_factor, elapsed_secs};
use crate::error::{Error, Result};
use crate::types::check_unit;

/// Weight kept from the current intensity when blending in a new feeling
const BLEND_KEEP: f64 = 0.7;

/// The fixed set of emotion dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Disgust,
    Trust,
    Curiosity,
    Excitement,
    Calm,
    Anxiety,
    Hope,
    Love,
    Pride,
    Shame,
    Guilt,
    Gratitude,
    Awe,
    Confusion,
    Determination,
    Peace,
}

impl Emotion {
    pub const COUNT: usize = 21;

    pub const ALL: [Emotion; Emotion::COUNT] = [
        Emotion::Joy,
        Emotion::Sadness,
        Emotion::Anger,
        Emotion::Fear,
        Emotion::Surprise,
        Emotion::Disgust,
        Emotion::Trust,
        Emotion::Curiosity,
        Emotion::Excitement,
        Emotion::Calm,
        Emotion::Anxiety,
        Emotion::Hope,
        Emotion::Love,
        Emotion::Pride,
        Emotion::Shame,
        Emotion::Guilt,
        Emotion::Gratitude,
        Emotion::Awe,
        Emotion::Confusion,
        Emotion::Determination,
        Emotion::Peace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Sadness => "sadness",
            Emotion::Anger => "anger",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
            Emotion::Disgust => "disgust",
            Emotion::Trust => "trust",
            Emotion::Curiosity => "curiosity",
            Emotion::Excitement => "excitement",
            Emotion::Calm => "calm",
            Emotion::Anxiety => "anxiety",
            Emotion::Hope => "hope",
            Emotion::Love => "love",
            Emotion::Pride => "pride",
            Emotion::Shame => "shame",
            Emotion::Guilt => "guilt",
            Emotion::Gratitude => "gratitude",
            Emotion::Awe => "awe",
            Emotion::Confusion => "confusion",
            Emotion::Determination => "determination",
            Emotion::Peace => "peace",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Emotion {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Emotion::ALL
            .into_iter()
            .find(|e| e.as_str() == lower)
            .ok_or_else(|| Error::invalid_input(format!("unknown emotion: {}", s)))
    }
}

/// Intensity per emotion, each clamped to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionVector([f64; Emotion::COUNT]);

impl Default for EmotionVector {
    fn default() -> Self {
        Self([0.0; Emotion::COUNT])
    }
}

impl EmotionVector {
    pub fn get(&self, emotion: Emotion) -> f64 {
        self.0[emotion.index()]
    }

    pub fn set(&mut self, emotion: Emotion, intensity: f64) {
        self.0[emotion.index()] = intensity.clamp(0.0, 1.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f64)> + '_ {
        Emotion::ALL.iter().map(|e| (*e, self.0[e.index()]))
    }

    /// Strongest emotion; `None` when every axis is at zero
    pub fn dominant(&self) -> Option<(Emotion, f64)> {
        self.iter()
            .filter(|(_, v)| *v > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn scaled(&self, factor: f64) -> Self {
        let mut out = *self;
        for v in out.0.iter_mut() {
            *v = (*v * factor).clamp(0.0, 1.0);
        }
        out
    }
}

/// Mutable emotional state with lazy decay
#[derive(Debug, Clone)]
pub struct EmotionState {
    vector: EmotionVector,
    updated_at: Option<DateTime<Utc>>,
    half_life_secs: f64,
}

impl EmotionState {
    pub fn new(half_life_secs: f64) -> Self {
        Self {
            vector: EmotionVector::default(),
            updated_at: None,
            half_life_secs,
        }
    }

    /// Blend new intensities into the decayed current state.
    ///
    /// Every value is validated before any is applied.
    pub fn feel(&mut self, updates: &[(Emotion, f64)], now: DateTime<Utc>) -> Result<EmotionVector> {
        for (emotion, value) in updates {
            check_unit(emotion.as_str(), *value)?;
        }
        if let Some(at) = self.updated_at {
            elapsed_secs(at, now)?;
        }

        let mut next = self.current(now);
        for (emotion, value) in updates {
            let blended = BLEND_KEEP * next.get(*emotion) + (1.0 - BLEND_KEEP) * value;
            next.set(*emotion, blended);
        }

        self.vector = next;
        self.updated_at = Some(now);
        Ok(next)
    }

    /// Like `feel`, with emotion names parsed first
    pub fn feel_named(&mut self, updates: &[(&str, f64)], now: DateTime<Utc>) -> Result<EmotionVector> {
        let parsed = updates
            .iter()
            .map(|(name, v)| Ok((name.parse::<Emotion>()?, *v)))
            .collect::<Result<Vec<_>>>()?;
        self.feel(&parsed, now)
    }

    /// State decayed to `now`; timestamps before the last update see no decay
    pub fn current(&self, now: DateTime<Utc>) -> EmotionVector {
        match self.updated_at {
            Some(at) => {
                let elapsed = elapsed_secs(at, now).unwrap_or(0.0);
                self.vector.scaled(decay_factor(elapsed, self.half_life_secs))
            }
            None => self.vector,
        }
    }

    pub fn dominant(&self, now: DateTime<Utc>) -> Option<(Emotion, f64)> {
        self.current(now).dominant()
    }
}

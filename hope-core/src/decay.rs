//! Importance and decay model.
//!
//! Decay is computed lazily at read time; nothing in the crate runs a timer.
//! Every layer measures elapsed time against a half-life and multiplies by
//! `0.5^(elapsed / half_life)`.

use chrono::{DateTime, Utc};

use crate::config::MemoryConfig;
use crate::error::{Error, Result};
use crate::types::MemoryItem;

/// Parameters of the importance decay curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayModel {
    /// Half-life of an unreinforced item, in seconds
    pub half_life_secs: f64,
    /// Half-life stretch per reinforcement
    pub reinforcement_weight: f64,
}

impl Default for DecayModel {
    fn default() -> Self {
        Self::from(&MemoryConfig::default())
    }
}

impl From<&MemoryConfig> for DecayModel {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            half_life_secs: config.half_life_secs as f64,
            reinforcement_weight: config.reinforcement_weight,
        }
    }
}

impl DecayModel {
    /// Effective half-life after `reinforcement` repeat accesses
    pub fn half_life_for(&self, reinforcement: u32) -> f64 {
        self.half_life_secs * (1.0 + self.reinforcement_weight * reinforcement as f64)
    }

    /// Current salience of `item` at `now`, in [0, 1].
    ///
    /// Fails with `InvalidInput` when `now` precedes the item's last access.
    pub fn decayed_importance(&self, item: &MemoryItem, now: DateTime<Utc>) -> Result<f64> {
        let elapsed = elapsed_secs(item.last_access, now)?;
        let factor = decay_factor(elapsed, self.half_life_for(item.reinforcement));
        Ok((item.importance * factor).clamp(0.0, 1.0))
    }
}

/// Shorthand for `model.decayed_importance(item, now)`
pub fn decayed_importance(item: &MemoryItem, now: DateTime<Utc>, model: &DecayModel) -> Result<f64> {
    model.decayed_importance(item, now)
}

/// Multiplier after `elapsed_secs` under the given half-life
pub fn decay_factor(elapsed_secs: f64, half_life_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 1.0;
    }
    if half_life_secs <= 0.0 {
        return 0.0;
    }
    0.5_f64.powf(elapsed_secs / half_life_secs)
}

/// Seconds between `since` and `now`; negative spans are invalid input
pub fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> Result<f64> {
    let elapsed = now - since;
    if elapsed < chrono::Duration::zero() {
        return Err(Error::invalid_input(format!(
            "timestamp {} precedes last access {}",
            now.to_rfc3339(),
            since.to_rfc3339()
        )));
    }
    Ok(elapsed.num_milliseconds() as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 8, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_half_life() {
        let model = DecayModel::default();
        let item = MemoryItem::new("x", 0.8, t0()).unwrap();

        assert_eq!(model.decayed_importance(&item, t0()).unwrap(), 0.8);
        let after = model.decayed_importance(&item, t0() + Duration::hours(1)).unwrap();
        assert!((after - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_reinforcement_slows_decay() {
        let model = DecayModel::default();
        let plain = MemoryItem::new("x", 0.8, t0()).unwrap();
        let mut reinforced = plain.clone();
        reinforced.reinforcement = 4;

        let later = t0() + Duration::hours(3);
        assert!(
            model.decayed_importance(&reinforced, later).unwrap()
                > model.decayed_importance(&plain, later).unwrap()
        );
    }

    #[test]
    fn test_rejects_time_travel() {
        let model = DecayModel::default();
        let item = MemoryItem::new("x", 0.8, t0()).unwrap();
        let err = model.decayed_importance(&item, t0() - Duration::seconds(1)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_does_not_mutate() {
        let model = DecayModel::default();
        let item = MemoryItem::new("x", 0.8, t0()).unwrap();
        let before = item.clone();
        let _ = decayed_importance(&item, t0() + Duration::hours(5), &model).unwrap();
        assert_eq!(item, before);
    }

    proptest! {
        #[test]
        fn prop_non_increasing_over_time(
            importance in 0.0f64..=1.0,
            reinforcement in 0u32..20,
            t1 in 0i64..1_000_000,
            dt in 0i64..1_000_000,
        ) {
            let model = DecayModel::default();
            let mut item = MemoryItem::new("p", importance, t0()).unwrap();
            item.reinforcement = reinforcement;

            let a = model.decayed_importance(&item, t0() + Duration::seconds(t1)).unwrap();
            let b = model.decayed_importance(&item, t0() + Duration::seconds(t1 + dt)).unwrap();
            prop_assert!(b <= a);
            prop_assert!((0.0..=1.0).contains(&b));
        }
    }
}

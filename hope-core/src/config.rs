//! Engine Configuration
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (HOPE_*)
//! 2. Config file (TOML)
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Top-level configuration for a memory engine and its storage pool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HopeConfig {
    /// Working/short-term memory and consolidation
    pub memory: MemoryConfig,

    /// Emotional layer
    pub emotion: EmotionConfig,

    /// Relational layer
    pub relational: RelationalConfig,

    /// Associative network
    pub association: AssociationConfig,

    /// Durable store connection pool
    pub pool: PoolConfig,
}

/// Memory layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Working memory capacity (default: 7, allowed 5..=9)
    pub working_capacity: usize,

    /// Importance half-life in seconds for an unreinforced item (default: 3600)
    pub half_life_secs: u64,

    /// Half-life stretch per reinforcement (default: 0.5)
    pub reinforcement_weight: f64,

    /// Minimum decayed importance for promotion (default: 0.6)
    pub promotion_threshold: f64,

    /// Reinforcement count that qualifies an item regardless of importance (default: 3)
    pub repetition_threshold: u32,

    /// Short-term retention window in seconds (default: 86400 = 24 hours)
    pub retention_secs: u64,

    /// Decayed importance below which short-term items are deleted (default: 0.05)
    pub deletion_floor: f64,

    /// Consolidate automatically every N thoughts, 0 disables (default: 7)
    pub consolidate_every: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            working_capacity: 7,
            half_life_secs: 3600,
            reinforcement_weight: 0.5,
            promotion_threshold: 0.6,
            repetition_threshold: 3,
            retention_secs: 86_400,
            deletion_floor: 0.05,
            consolidate_every: 7,
        }
    }
}

/// Longest accepted short-term retention window (100 years)
pub const MAX_RETENTION_SECS: u64 = 100 * 365 * 86_400;

impl MemoryConfig {
    /// Retention window as a chrono duration, saturating at the largest span
    pub fn retention(&self) -> chrono::TimeDelta {
        i64::try_from(self.retention_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .unwrap_or(chrono::TimeDelta::MAX)
    }
}

/// Emotional layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    /// Intensity half-life in seconds (default: 1800)
    pub half_life_secs: u64,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self { half_life_secs: 1800 }
    }
}

/// Relational layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalConfig {
    /// Recency half-life in seconds (default: 604800 = 1 week)
    pub half_life_secs: u64,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self { half_life_secs: 604_800 }
    }
}

/// Associative network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    /// Edge strength half-life in seconds (default: 86400)
    pub half_life_secs: u64,

    /// Edges whose decayed strength falls below this are pruned (default: 0.1)
    pub prune_floor: f64,

    /// Strength added when an existing edge is reinforced (default: 0.1)
    pub reinforcement_step: f64,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            half_life_secs: 86_400,
            prune_floor: 0.1,
            reinforcement_step: 0.1,
        }
    }
}

/// Connection pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Path to the SQLite database backing the durable store
    pub database_path: PathBuf,

    /// Maximum number of connections, leased or idle (default: 5)
    pub max_size: usize,

    /// Connections opened eagerly at startup (default: 2)
    pub min_idle: usize,

    /// How long `acquire` waits before failing (default: 5000)
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("hope_memory.db"),
            max_size: 5,
            min_idle: 2,
            acquire_timeout_ms: 5_000,
        }
    }
}

impl PoolConfig {
    /// Acquire timeout as a Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl HopeConfig {
    /// Parse configuration from a TOML document; missing keys take defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: HopeConfig = toml::from_str(s).map_err(|e| ConfigValidationError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content).map_err(|e| ConfigValidationError::Parse {
                    message: e.to_string(),
                })?
            }
            _ => HopeConfig::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("HOPE_DATABASE_PATH") {
            self.pool.database_path = PathBuf::from(path);
        }
        if let Ok(size) = std::env::var("HOPE_POOL_SIZE") {
            match size.parse() {
                Ok(size) => self.pool.max_size = size,
                Err(_) => tracing::warn!("Ignoring HOPE_POOL_SIZE={:?}: not a number", size),
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        let m = &self.memory;
        if !(5..=9).contains(&m.working_capacity) {
            return Err(invalid("memory.working_capacity", "must be between 5 and 9"));
        }
        if m.half_life_secs == 0 {
            return Err(invalid("memory.half_life_secs", "must be greater than 0"));
        }
        if m.reinforcement_weight < 0.0 {
            return Err(invalid("memory.reinforcement_weight", "must not be negative"));
        }
        check_unit("memory.promotion_threshold", m.promotion_threshold)?;
        check_unit("memory.deletion_floor", m.deletion_floor)?;
        if m.retention_secs == 0 {
            return Err(invalid("memory.retention_secs", "must be greater than 0"));
        }
        if m.retention_secs > MAX_RETENTION_SECS {
            return Err(invalid("memory.retention_secs", "must be at most 100 years"));
        }

        if self.emotion.half_life_secs == 0 {
            return Err(invalid("emotion.half_life_secs", "must be greater than 0"));
        }
        if self.relational.half_life_secs == 0 {
            return Err(invalid("relational.half_life_secs", "must be greater than 0"));
        }

        let a = &self.association;
        if a.half_life_secs == 0 {
            return Err(invalid("association.half_life_secs", "must be greater than 0"));
        }
        check_unit("association.prune_floor", a.prune_floor)?;
        check_unit("association.reinforcement_step", a.reinforcement_step)?;

        let p = &self.pool;
        if p.max_size == 0 {
            return Err(invalid("pool.max_size", "must be greater than 0"));
        }
        if p.min_idle > p.max_size {
            return Err(invalid("pool.min_idle", "cannot exceed pool.max_size"));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigValidationError {
    ConfigValidationError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

fn check_unit(field: &str, value: f64) -> std::result::Result<(), ConfigValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, "must be between 0 and 1"))
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("could not parse configuration: {message}")]
    Parse { message: String },
}

//! hope-core - Layered, decaying memory for conversational agents
//!
//! This crate provides the memory engine and its wire format:
//!
//! - **layers**: working memory, short-term store, emotions, people and associations
//! - **decay**: lazy half-life decay of importance, shared by every layer
//! - **consolidation**: promotion of salient items into immutable snapshots
//! - **chain**: the content-addressed Memory Chain Cache with a `latest` alias
//! - **shp**: the Silent Hope Protocol binary codec
//! - **pool**: bounded connection pool for the durable store
//! - **engine**: the [`HopeMemory`] facade tying it all together
//!
//! All time-dependent operations take `now` explicitly.

#[cfg(feature = "db")]
pub mod archive;
pub mod chain;
pub mod config;
pub mod consolidation;
pub mod decay;
pub mod engine;
pub mod error;
pub mod hashing;
pub mod layers;
pub mod pool;
pub mod recall;
pub mod shp;
pub mod types;

// Re-export commonly used types
#[cfg(feature = "db")]
pub use archive::SnapshotArchive;
pub use chain::{ChainRef, ChainTarget, MemoryChain, Snapshot};
pub use config::HopeConfig;
pub use consolidation::Consolidation;
pub use engine::{CognitiveStatus, HopeMemory, SweepReport, Thought};
pub use error::{Error, Result};
pub use layers::{Emotion, EmotionVector};
pub use recall::{Recollection, SemanticIndex};
pub use types::{ItemId, Layer, MemoryItem};

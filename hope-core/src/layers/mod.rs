//! Cognitive layers.
//!
//! Working and short-term memory hold items; the emotional, relational and
//! associative layers hold the context captured alongside them at
//! consolidation time.

pub mod associative;
pub mod emotion;
pub mod relational;
pub mod short_term;
pub mod working;

pub use associative::{AssociationEdge, AssociativeNetwork};
pub use emotion::{Emotion, EmotionState, EmotionVector};
pub use relational::{RelationalEntity, RelationalGraph};
pub use short_term::ShortTermStore;
pub use working::WorkingMemory;

//! Pure data types flowing through the enrichment pipeline.
//!
//! Modules under this namespace must remain free of IO and external side effects
//! so they can be reused across orchestrators and test harnesses.

pub mod checkpoint;
pub mod hit;
pub mod query_set;

pub use checkpoint::{Checkpoint, CheckpointMeta};
pub use hit::{EnrichedHit, Hit};
pub use query_set::{QueryCategory, QuerySet, QuerySetValidationError};

//! Cross-cutting application constants.

use std::num::NonZeroUsize;

/// Content longer than this many characters is cut before it is sent to the
/// generation provider.
pub const MAX_CONTENT_CHARS: usize = 8_000;

/// Default generation model key.
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash-lite";

/// Hits per outer batch; the unit flush decisions are made in.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(10).unwrap();

/// Simultaneous in-flight generation calls.
pub const DEFAULT_CONCURRENCY: NonZeroUsize = NonZeroUsize::new(5).unwrap();

/// Flush the checkpoint after this many batches' worth of new hits.
pub const DEFAULT_SAVE_EVERY: NonZeroUsize = NonZeroUsize::new(1).unwrap();

/// File name of the checkpoint under the data directory.
pub const DEFAULT_CHECKPOINT_FILE: &str = "hits_with_queries.json";

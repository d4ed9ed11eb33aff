//! Orchestration layer for IO-bound pipeline services.
//!
//! Modules here talk to the generation provider and the filesystem. Pure data
//! types and their validation belong in `crate::pipeline`.

pub mod checkpoint_store;
pub mod dataset;
pub mod driver;
pub mod export;
pub mod generator;
pub mod progress;
pub mod scheduler;

pub use checkpoint_store::{CheckpointError, CheckpointStore, FsCheckpointStore, StagedCheckpoint};
pub use dataset::{DatasetError, load_hits};
pub use driver::{PipelineDriver, PipelineError, PipelineOptions, RunState, RunSummary};
pub use export::{ExportError, export_csv};
pub use generator::{
    GeminiQueryProvider, GenerationClient, GenerationError, GenerationRequest, QueryProvider,
    truncate_chars,
};
pub use progress::{ProgressReporter, ProgressSnapshot};
pub use scheduler::BatchScheduler;

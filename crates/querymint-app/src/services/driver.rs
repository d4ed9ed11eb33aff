//! Run orchestration: resume, batching, flush cadence.
//!
//! The driver is the only code that touches the accumulating checkpoint and
//! the processed-id set, and it does so strictly between scheduler calls.
//! Saves are issued from this sequential flow only.

use std::collections::HashSet;
use std::num::NonZeroUsize;

use bon::Builder;
use thiserror::Error;

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_SAVE_EVERY};
use crate::pipeline::checkpoint::Checkpoint;
use crate::pipeline::hit::Hit;
use crate::services::checkpoint_store::{CheckpointError, CheckpointStore};
use crate::services::generator::{GenerationClient, GenerationError, QueryProvider};
use crate::services::progress::ProgressReporter;
use crate::services::scheduler::BatchScheduler;

#[derive(Debug, Clone, Builder)]
pub struct PipelineOptions {
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub batch_size: NonZeroUsize,
    #[builder(default = DEFAULT_CONCURRENCY)]
    pub concurrency: NonZeroUsize,
    #[builder(default = DEFAULT_SAVE_EVERY)]
    pub save_every: NonZeroUsize,
    #[builder(default)]
    pub resume: bool,
    pub limit: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Loading,
    Running { offset: usize },
    Flushing,
    Done,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Hits considered after applying `limit`.
    pub considered: usize,
    /// Hits skipped because they were already enriched or repeated an id.
    pub skipped: usize,
    /// Hits enriched by this run.
    pub generated: usize,
    /// Durable writes issued, final flush included.
    pub saves: usize,
    pub checkpoint_count: usize,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// `persisted` is the size of the checkpoint this run last wrote, or of the
    /// resumed checkpoint. Without resume and before the first flush it is 0
    /// and whatever file already sits at the store path is left untouched.
    #[error("run aborted; {persisted} enriched hits are in the last checkpoint: {source}")]
    Aborted {
        persisted: usize,
        #[source]
        source: GenerationError,
    },
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl PipelineError {
    /// Hits that survived in durable storage, when the run was aborted.
    pub fn persisted(&self) -> Option<usize> {
        match self {
            PipelineError::Aborted { persisted, .. } => Some(*persisted),
            PipelineError::Checkpoint(_) => None,
        }
    }
}

pub struct PipelineDriver<'a, P, S: ?Sized> {
    client: &'a GenerationClient<P>,
    store: &'a S,
    options: PipelineOptions,
    state: RunState,
}

impl<'a, P, S> PipelineDriver<'a, P, S>
where
    P: QueryProvider,
    S: CheckpointStore + ?Sized,
{
    pub fn new(client: &'a GenerationClient<P>, store: &'a S, options: PipelineOptions) -> Self {
        Self {
            client,
            store,
            options,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run with a hidden progress reporter.
    pub async fn run(&mut self, hits: &[Hit]) -> Result<RunSummary, PipelineError> {
        let considered = self.considered(hits);
        let progress = ProgressReporter::hidden(considered.len());
        self.run_with_progress(hits, &progress).await
    }

    pub async fn run_with_progress(
        &mut self,
        hits: &[Hit],
        progress: &ProgressReporter,
    ) -> Result<RunSummary, PipelineError> {
        let hits = self.considered(hits);

        self.transition(RunState::Loading);
        let mut checkpoint = self.load_initial();
        let mut processed = checkpoint.processed_ids();
        let mut persisted = checkpoint.len();

        let scheduler = BatchScheduler::new(self.client, self.options.concurrency);
        let batch_size = self.options.batch_size.get();
        let save_every = self.options.save_every.get();

        let mut summary = RunSummary {
            considered: hits.len(),
            skipped: 0,
            generated: 0,
            saves: 0,
            checkpoint_count: checkpoint.len(),
        };
        // batches that ran the scheduler since the last flush
        let mut unflushed_batches = 0usize;

        for (batch_idx, batch) in hits.chunks(batch_size).enumerate() {
            let offset = batch_idx * batch_size;
            self.transition(RunState::Running { offset });

            let pending = pending_hits(batch, &processed);
            let skipped = batch.len() - pending.len();
            summary.skipped += skipped;
            progress.record_skipped(skipped);

            if pending.is_empty() {
                tracing::debug!(batch = batch_idx, offset, "batch already enriched; skipping");
                continue;
            }

            let enriched = match scheduler.process(&pending, batch_idx, progress).await {
                Ok(enriched) => enriched,
                Err(source) => {
                    self.transition(RunState::Aborted);
                    progress.abandon();
                    return Err(PipelineError::Aborted { persisted, source });
                }
            };

            processed.extend(enriched.iter().map(|hit| hit.id.clone()));
            summary.generated += enriched.len();
            checkpoint.extend(enriched);
            unflushed_batches += 1;

            if unflushed_batches >= save_every {
                self.flush(&mut checkpoint, progress.errors())?;
                persisted = checkpoint.len();
                summary.saves += 1;
                unflushed_batches = 0;
            }
        }

        self.flush(&mut checkpoint, progress.errors())?;
        summary.saves += 1;
        summary.checkpoint_count = checkpoint.len();
        self.transition(RunState::Done);
        progress.finish();

        tracing::info!(
            considered = summary.considered,
            generated = summary.generated,
            skipped = summary.skipped,
            saves = summary.saves,
            checkpoint = summary.checkpoint_count,
            "enrichment run complete"
        );
        Ok(summary)
    }

    fn considered<'h>(&self, hits: &'h [Hit]) -> &'h [Hit] {
        match self.options.limit {
            Some(limit) if limit < hits.len() => &hits[..limit],
            _ => hits,
        }
    }

    fn load_initial(&self) -> Checkpoint {
        if !self.options.resume {
            return Checkpoint::empty();
        }
        match self.store.load() {
            Some(checkpoint) => {
                tracing::info!(count = checkpoint.len(), "resuming from checkpoint");
                checkpoint
            }
            None => {
                tracing::info!("no usable checkpoint; starting fresh");
                Checkpoint::empty()
            }
        }
    }

    fn flush(&mut self, checkpoint: &mut Checkpoint, errors: usize) -> Result<(), PipelineError> {
        let resume_at = self.state;
        self.transition(RunState::Flushing);
        checkpoint.stamp(errors);
        if let Err(err) = self.store.save(checkpoint) {
            self.transition(RunState::Aborted);
            return Err(err.into());
        }
        self.transition(resume_at);
        Ok(())
    }

    fn transition(&mut self, next: RunState) {
        if self.state != next {
            tracing::trace!(from = ?self.state, to = ?next, "pipeline state");
            self.state = next;
        }
    }
}

/// Hits from `batch` that still need work, in order. Repeated ids inside the
/// batch are kept only once.
fn pending_hits(batch: &[Hit], processed: &HashSet<String>) -> Vec<Hit> {
    let mut seen = HashSet::with_capacity(batch.len());
    batch
        .iter()
        .filter(|hit| {
            if processed.contains(&hit.id) {
                return false;
            }
            if !seen.insert(hit.id.as_str()) {
                tracing::warn!(id = %hit.id, "duplicate hit id in input; skipping");
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

//! Concurrency-bounded dispatch of one batch of hits.
//!
//! A batch is cut into chunks of `concurrency` hits. Chunks run strictly one
//! after another; inside a chunk every call is in flight at once and the chunk
//! settles when all of them have. The first failure short-circuits the join and
//! aborts the batch, discarding whatever the chunk's other calls produced.

use std::num::NonZeroUsize;

use futures_util::future::try_join_all;

use crate::pipeline::hit::{EnrichedHit, Hit};
use crate::services::generator::{GenerationClient, GenerationError, QueryProvider};
use crate::services::progress::ProgressReporter;

pub struct BatchScheduler<'a, P> {
    client: &'a GenerationClient<P>,
    concurrency: NonZeroUsize,
}

impl<'a, P> BatchScheduler<'a, P>
where
    P: QueryProvider,
{
    pub fn new(client: &'a GenerationClient<P>, concurrency: NonZeroUsize) -> Self {
        Self {
            client,
            concurrency,
        }
    }

    /// Enrich `hits`, returning results in input order. `batch_label` only
    /// feeds progress output.
    pub async fn process(
        &self,
        hits: &[Hit],
        batch_label: usize,
        progress: &ProgressReporter,
    ) -> Result<Vec<EnrichedHit>, GenerationError> {
        let mut enriched = Vec::with_capacity(hits.len());

        for (chunk_idx, chunk) in hits.chunks(self.concurrency.get()).enumerate() {
            tracing::trace!(
                batch = batch_label,
                chunk = chunk_idx,
                size = chunk.len(),
                "dispatching chunk"
            );

            let calls = chunk.iter().map(|hit| async move {
                let query_set = self.client.generate(hit).await?;
                Ok::<_, GenerationError>(EnrichedHit::from_hit(hit, query_set))
            });

            match try_join_all(calls).await {
                Ok(settled) => {
                    let produced = settled.len();
                    enriched.extend(settled);
                    progress.record_chunk(batch_label, produced);
                }
                Err(err) => {
                    let errors = progress.record_error();
                    tracing::error!(
                        batch = batch_label,
                        chunk = chunk_idx,
                        errors,
                        error = %err,
                        "generation failed; aborting batch"
                    );
                    return Err(err);
                }
            }
        }

        debug_assert_eq!(enriched.len(), hits.len());
        Ok(enriched)
    }
}

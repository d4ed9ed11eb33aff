use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use querymint_app::pipeline::{Checkpoint, Hit, QuerySet};
use querymint_app::services::{
    CheckpointError, CheckpointStore, FsCheckpointStore, GenerationClient, GenerationError,
    GenerationRequest, PipelineDriver, PipelineError, PipelineOptions, QueryProvider, RunState,
};
use tempfile::TempDir;

/// Echoes the hit id back as a keyword and can be told to fail on one id.
#[derive(Default)]
struct EchoProvider {
    calls: AtomicUsize,
    fail_on: Option<String>,
    attempted: Mutex<Vec<String>>,
}

impl EchoProvider {
    fn failing_on(id: &str) -> Self {
        Self {
            fail_on: Some(id.to_string()),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn attempted(&self) -> HashSet<String> {
        self.attempted
            .lock()
            .expect("attempt log poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl QueryProvider for EchoProvider {
    async fn complete(&self, request: &GenerationRequest) -> Result<QuerySet, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.attempted
            .lock()
            .expect("attempt log poisoned")
            .push(request.id.clone());
        if self.fail_on.as_deref() == Some(request.id.as_str()) {
            return Err(GenerationError::provider(&request.id, "service unavailable"));
        }
        Ok(QuerySet {
            keywords: vec![format!("{} keyword", request.id)],
            questions: vec![format!("what is {}?", request.display_name)],
            ..QuerySet::default()
        })
    }
}

/// Filesystem store that also records the item count of every save.
struct RecordingStore {
    inner: FsCheckpointStore,
    saves: Mutex<Vec<usize>>,
}

impl RecordingStore {
    fn new(inner: FsCheckpointStore) -> Self {
        Self {
            inner,
            saves: Mutex::new(Vec::new()),
        }
    }

    fn saves(&self) -> Vec<usize> {
        self.saves.lock().expect("save log poisoned").clone()
    }
}

impl CheckpointStore for RecordingStore {
    fn load(&self) -> Option<Checkpoint> {
        self.inner.load()
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.inner.save(checkpoint)?;
        self.saves
            .lock()
            .expect("save log poisoned")
            .push(checkpoint.meta.count);
        Ok(())
    }
}

fn hits(count: usize) -> Vec<Hit> {
    (0..count)
        .map(|idx| Hit::new(format!("hit-{idx}"), format!("Hit {idx}"), format!("body {idx}")))
        .collect()
}

fn nz(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).expect("non-zero")
}

fn options(batch_size: usize, concurrency: usize, save_every: usize, resume: bool) -> PipelineOptions {
    PipelineOptions::builder()
        .batch_size(nz(batch_size))
        .concurrency(nz(concurrency))
        .save_every(nz(save_every))
        .resume(resume)
        .build()
}

fn ids(checkpoint: &Checkpoint) -> Vec<String> {
    checkpoint.items.iter().map(|item| item.id.clone()).collect()
}

#[tokio::test]
async fn full_run_enriches_every_hit_in_input_order() {
    let temp = TempDir::new().expect("temp dir");
    let store = FsCheckpointStore::new(temp.path().join("checkpoint.json"));
    let client = GenerationClient::new(EchoProvider::default());
    let input = hits(7);

    let mut driver = PipelineDriver::new(&client, &store, options(3, 2, 1, false));
    let summary = driver.run(&input).await.expect("run completes");

    assert_eq!(driver.state(), RunState::Done);
    assert_eq!(summary.generated, 7);
    assert_eq!(summary.checkpoint_count, 7);

    let checkpoint = store.load().expect("checkpoint written");
    let expected: Vec<String> = input.iter().map(|hit| hit.id.clone()).collect();
    assert_eq!(ids(&checkpoint), expected);
    assert_eq!(checkpoint.meta.count, 7);
    assert!(checkpoint.items.iter().all(|item| item.query_set.is_some()));
}

#[tokio::test]
async fn resume_after_completion_makes_no_calls() {
    let temp = TempDir::new().expect("temp dir");
    let store = FsCheckpointStore::new(temp.path().join("checkpoint.json"));
    let input = hits(9);

    let first_client = GenerationClient::new(EchoProvider::default());
    PipelineDriver::new(&first_client, &store, options(4, 3, 1, false))
        .run(&input)
        .await
        .expect("first run");
    let first = store.load().expect("first checkpoint");

    let second_client = GenerationClient::new(EchoProvider::default());
    let summary = PipelineDriver::new(&second_client, &store, options(4, 3, 1, true))
        .run(&input)
        .await
        .expect("resumed run");
    let second = store.load().expect("second checkpoint");

    assert_eq!(second_client.provider().calls(), 0);
    assert_eq!(summary.generated, 0);
    assert_eq!(summary.skipped, 9);
    assert_eq!(second.items, first.items);
    assert_eq!(second.meta.count, first.meta.count);
}

#[tokio::test]
async fn resume_with_shifted_batches_only_fills_the_gap() {
    let temp = TempDir::new().expect("temp dir");
    let store = FsCheckpointStore::new(temp.path().join("checkpoint.json"));
    let input = hits(10);

    let first_client = GenerationClient::new(EchoProvider::default());
    let first = PipelineDriver::new(
        &first_client,
        &store,
        PipelineOptions::builder()
            .batch_size(nz(2))
            .concurrency(nz(2))
            .limit(5)
            .build(),
    )
    .run(&input)
    .await
    .expect("partial run");
    assert_eq!(first.generated, 5);

    let second_client = GenerationClient::new(EchoProvider::default());
    let summary = PipelineDriver::new(&second_client, &store, options(3, 2, 1, true))
        .run(&input)
        .await
        .expect("resumed run");

    assert_eq!(second_client.provider().calls(), 5);
    let expected: HashSet<String> = (5..10).map(|idx| format!("hit-{idx}")).collect();
    assert_eq!(second_client.provider().attempted(), expected);
    assert_eq!(summary.skipped, 5);

    let checkpoint = store.load().expect("checkpoint");
    let all: Vec<String> = input.iter().map(|hit| hit.id.clone()).collect();
    assert_eq!(ids(&checkpoint), all);
}

#[tokio::test]
async fn flushes_every_second_batch_plus_final_save() {
    let temp = TempDir::new().expect("temp dir");
    let store = RecordingStore::new(FsCheckpointStore::new(temp.path().join("checkpoint.json")));
    let client = GenerationClient::new(EchoProvider::default());

    let summary = PipelineDriver::new(&client, &store, options(2, 2, 2, false))
        .run(&hits(10))
        .await
        .expect("run completes");

    assert_eq!(store.saves(), vec![4, 8, 10]);
    assert_eq!(summary.saves, 3);
}

#[tokio::test]
async fn default_cadence_flushes_after_every_batch() {
    let temp = TempDir::new().expect("temp dir");
    let store = RecordingStore::new(FsCheckpointStore::new(temp.path().join("checkpoint.json")));
    let client = GenerationClient::new(EchoProvider::default());

    PipelineDriver::new(&client, &store, options(3, 3, 1, false))
        .run(&hits(7))
        .await
        .expect("run completes");

    assert_eq!(store.saves(), vec![3, 6, 7, 7]);
}

#[tokio::test]
async fn failure_aborts_run_and_keeps_last_flush() {
    let temp = TempDir::new().expect("temp dir");
    let store = RecordingStore::new(FsCheckpointStore::new(temp.path().join("checkpoint.json")));
    let client = GenerationClient::new(EchoProvider::failing_on("hit-5"));

    let mut driver = PipelineDriver::new(&client, &store, options(4, 2, 1, false));
    let err = driver.run(&hits(12)).await.expect_err("hit-5 fails");

    assert_eq!(driver.state(), RunState::Aborted);
    assert_eq!(err.persisted(), Some(4));
    match &err {
        PipelineError::Aborted { source, .. } => {
            assert!(matches!(source, GenerationError::Provider { id, .. } if id == "hit-5"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let attempted = client.provider().attempted();
    let expected: HashSet<String> = (0..6).map(|idx| format!("hit-{idx}")).collect();
    assert_eq!(attempted, expected);

    assert_eq!(store.saves(), vec![4]);
    let checkpoint = store.load().expect("checkpoint from first batch");
    assert_eq!(checkpoint.meta.count, 4);
}

#[tokio::test]
async fn corrupt_checkpoint_with_resume_starts_fresh() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("checkpoint.json");
    std::fs::write(&path, b"{ this is not json").expect("write corrupt checkpoint");
    let store = FsCheckpointStore::new(&path);
    let client = GenerationClient::new(EchoProvider::default());

    let summary = PipelineDriver::new(&client, &store, options(2, 2, 1, true))
        .run(&hits(3))
        .await
        .expect("run completes");

    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.generated, 3);
    assert_eq!(store.load().expect("rewritten checkpoint").meta.count, 3);
}

#[tokio::test]
async fn limit_caps_leading_hits() {
    let temp = TempDir::new().expect("temp dir");
    let store = FsCheckpointStore::new(temp.path().join("checkpoint.json"));
    let client = GenerationClient::new(EchoProvider::default());

    let summary = PipelineDriver::new(
        &client,
        &store,
        PipelineOptions::builder().limit(3).build(),
    )
    .run(&hits(8))
    .await
    .expect("run completes");

    assert_eq!(summary.considered, 3);
    assert_eq!(client.provider().calls(), 3);
    let checkpoint = store.load().expect("checkpoint");
    assert_eq!(ids(&checkpoint), vec!["hit-0", "hit-1", "hit-2"]);
}

#[tokio::test]
async fn duplicate_ids_are_enriched_once() {
    let temp = TempDir::new().expect("temp dir");
    let store = FsCheckpointStore::new(temp.path().join("checkpoint.json"));
    let client = GenerationClient::new(EchoProvider::default());
    let mut input = hits(3);
    input.push(Hit::new("hit-1", "Hit 1 again", "other body"));
    input.push(Hit::new("hit-0", "Hit 0 again", "other body"));

    let summary = PipelineDriver::new(&client, &store, options(4, 4, 1, false))
        .run(&input)
        .await
        .expect("run completes");

    assert_eq!(summary.generated, 3);
    assert_eq!(summary.skipped, 2);
    assert_eq!(client.provider().calls(), 3);
    assert_eq!(store.load().expect("checkpoint").meta.count, 3);
}

#[tokio::test]
async fn empty_input_still_writes_final_checkpoint() {
    let temp = TempDir::new().expect("temp dir");
    let store = RecordingStore::new(FsCheckpointStore::new(temp.path().join("checkpoint.json")));
    let client = GenerationClient::new(EchoProvider::default());

    let summary = PipelineDriver::new(&client, &store, PipelineOptions::default())
        .run(&[])
        .await
        .expect("run completes");

    assert_eq!(summary.saves, 1);
    assert_eq!(store.saves(), vec![0]);
    assert!(store.load().expect("checkpoint").is_empty());
}

/// Writes a checkpoint holding every even-numbered hit out of `count`.
async fn seed_even_hits(path: &std::path::Path, count: usize) {
    let store = FsCheckpointStore::new(path);
    let client = GenerationClient::new(EchoProvider::default());
    let evens: Vec<Hit> = hits(count).into_iter().step_by(2).collect();
    PipelineDriver::new(&client, &store, options(count, 2, 1, false))
        .run(&evens)
        .await
        .expect("seed run");
}

#[tokio::test]
async fn partly_resumed_batches_each_flush() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("checkpoint.json");
    seed_even_hits(&path, 8).await;

    let store = RecordingStore::new(FsCheckpointStore::new(&path));
    let client = GenerationClient::new(EchoProvider::default());
    let summary = PipelineDriver::new(&client, &store, options(2, 2, 1, true))
        .run(&hits(8))
        .await
        .expect("resumed run");

    assert_eq!(summary.skipped, 4);
    assert_eq!(summary.generated, 4);
    assert_eq!(store.saves(), vec![5, 6, 7, 8, 8]);
}

#[tokio::test]
async fn abort_during_partial_resume_loses_only_current_batch() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("checkpoint.json");
    seed_even_hits(&path, 8).await;

    let store = RecordingStore::new(FsCheckpointStore::new(&path));
    let client = GenerationClient::new(EchoProvider::failing_on("hit-5"));
    let err = PipelineDriver::new(&client, &store, options(2, 2, 1, true))
        .run(&hits(8))
        .await
        .expect_err("hit-5 fails");

    assert_eq!(err.persisted(), Some(6));
    assert_eq!(store.saves(), vec![5, 6]);
    let checkpoint = store.load().expect("checkpoint");
    assert!(checkpoint.items.iter().any(|item| item.id == "hit-3"));
    assert!(!checkpoint.items.iter().any(|item| item.id == "hit-5"));
}

#[tokio::test]
async fn abort_before_first_flush_leaves_previous_file_untouched() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("checkpoint.json");
    let store = FsCheckpointStore::new(&path);

    let first_client = GenerationClient::new(EchoProvider::default());
    PipelineDriver::new(&first_client, &store, options(3, 3, 1, false))
        .run(&hits(3))
        .await
        .expect("first run");

    let failing = GenerationClient::new(EchoProvider::failing_on("hit-0"));
    let err = PipelineDriver::new(&failing, &store, options(3, 3, 1, false))
        .run(&hits(6))
        .await
        .expect_err("hit-0 fails");

    assert_eq!(err.persisted(), Some(0));
    let previous = store.load().expect("previous checkpoint intact");
    assert_eq!(previous.meta.count, 3);
}

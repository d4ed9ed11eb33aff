//! Run progress: one status line plus the numbers behind it.
//!
//! A reporter is built once per run and handed to the scheduler by reference.
//! Hits already present in a resumed checkpoint count towards completion but
//! not towards the per-item average, so the ETA reflects work done in this
//! process only.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::{FormattedDuration, ProgressBar, ProgressDrawTarget, ProgressStyle};

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub generated: usize,
    pub percent: f64,
    pub elapsed: Duration,
    pub avg_per_item: Option<Duration>,
    pub eta: Option<Duration>,
    pub errors: usize,
}

impl ProgressSnapshot {
    pub fn status_line(&self) -> String {
        let eta = self
            .eta
            .map(|eta| FormattedDuration(eta).to_string())
            .unwrap_or_else(|| "--:--:--".to_string());
        format!(
            "elapsed {} | eta {} | {:.1}% | errors {}",
            FormattedDuration(self.elapsed),
            eta,
            self.percent,
            self.errors
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    skipped: usize,
    generated: usize,
    errors: usize,
}

pub struct ProgressReporter {
    bar: ProgressBar,
    started: Instant,
    total: usize,
    counters: Mutex<Counters>,
}

impl ProgressReporter {
    /// Reporter drawing a status bar on stderr.
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {pos}/{len} hits {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
        bar.enable_steady_tick(Duration::from_millis(120));
        Self::with_bar(bar, total)
    }

    /// Reporter that only tracks numbers; used with verbose logging and in tests.
    pub fn hidden(total: usize) -> Self {
        Self::with_bar(ProgressBar::hidden(), total)
    }

    fn with_bar(bar: ProgressBar, total: usize) -> Self {
        bar.set_length(total as u64);
        Self {
            bar,
            started: Instant::now(),
            total,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Hits that were already enriched by a previous run.
    pub fn record_skipped(&self, count: usize) {
        if count == 0 {
            return;
        }
        let snapshot = self.update(|counters| counters.skipped += count);
        self.bar.set_position(snapshot.completed as u64);
    }

    /// Called after every settled chunk with the number of hits it produced.
    pub fn record_chunk(&self, batch_label: usize, generated: usize) -> ProgressSnapshot {
        let snapshot = self.update(|counters| counters.generated += generated);
        self.bar.set_position(snapshot.completed as u64);
        self.bar.set_message(snapshot.status_line());
        tracing::debug!(
            batch = batch_label,
            completed = snapshot.completed,
            total = snapshot.total,
            percent = snapshot.percent,
            eta_secs = snapshot.eta.map(|eta| eta.as_secs()),
            errors = snapshot.errors,
            "chunk settled"
        );
        snapshot
    }

    pub fn record_error(&self) -> usize {
        let snapshot = self.update(|counters| counters.errors += 1);
        self.bar.set_message(snapshot.status_line());
        snapshot.errors
    }

    pub fn errors(&self) -> usize {
        self.lock().errors
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let counters = self.lock();
        self.compute(&counters)
    }

    pub fn finish(&self) {
        let snapshot = self.snapshot();
        self.bar.finish_with_message(snapshot.status_line());
    }

    pub fn abandon(&self) {
        let snapshot = self.snapshot();
        self.bar.abandon_with_message(snapshot.status_line());
    }

    fn update(&self, apply: impl FnOnce(&mut Counters)) -> ProgressSnapshot {
        let mut counters = self.lock();
        apply(&mut counters);
        self.compute(&counters)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn compute(&self, counters: &Counters) -> ProgressSnapshot {
        compute_snapshot(self.total, counters, self.started.elapsed())
    }
}

fn compute_snapshot(total: usize, counters: &Counters, elapsed: Duration) -> ProgressSnapshot {
    let completed = (counters.skipped + counters.generated).min(total);
    let percent = if total == 0 {
        100.0
    } else {
        completed as f64 * 100.0 / total as f64
    };
    let avg_per_item = (counters.generated > 0)
        .then(|| Duration::from_secs_f64(elapsed.as_secs_f64() / counters.generated as f64));
    let remaining = total.saturating_sub(completed);
    let eta = avg_per_item
        .and_then(|avg| Duration::try_from_secs_f64(avg.as_secs_f64() * remaining as f64).ok());

    ProgressSnapshot {
        completed,
        total,
        generated: counters.generated,
        percent,
        elapsed,
        avg_per_item,
        eta,
        errors: counters.errors,
    }
}

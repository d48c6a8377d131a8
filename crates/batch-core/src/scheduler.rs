//! Bounded concurrency scheduler
//!
//! Admits jobs in the order given, never running more than `num_workers` at
//! once. A slot is a semaphore permit: each admitted job runs in its own task
//! holding a permit, and sends its outcome back over a channel when terminal.
//! The coordinating loop waits on three things at once: a free permit, an
//! arriving outcome, and cancellation. Every job also watches the token for
//! an abort, which kills it where it stands.

use crate::cancel::CancelToken;
use crate::descriptor::JobDescriptor;
use crate::error::{BatchError, Result};
use crate::outcome::{JobOutcome, OutcomeKind};
use crate::report::Aggregator;
use crate::runner::run_job;
use indicatif::ProgressBar;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

pub struct Scheduler {
    num_workers: usize,
    cancel: CancelToken,
    progress: Option<ProgressBar>,
}

impl Scheduler {
    /// Create a scheduler with `num_workers` slots. Zero is rejected.
    pub fn new(num_workers: usize) -> Result<Self> {
        if num_workers == 0 {
            return Err(BatchError::InvalidWorkerCount(num_workers));
        }
        Ok(Self {
            num_workers,
            cancel: CancelToken::new(),
            progress: None,
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Advance `progress` by one for every terminal job
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Run all `jobs`, recording one outcome per admitted job into
    /// `aggregator`. Returns once every admitted job is terminal.
    ///
    /// If cancelled, jobs not yet admitted are recorded as not started and
    /// jobs already running are drained.
    pub async fn run(&self, jobs: Vec<JobDescriptor>, aggregator: &mut Aggregator) {
        let total = jobs.len();
        if total == 0 {
            return;
        }
        info!(
            "Scheduling {} job(s) on {} worker(s)",
            total, self.num_workers
        );

        let semaphore = Arc::new(Semaphore::new(self.num_workers));
        let (tx, mut rx) = mpsc::channel::<JobOutcome>(self.num_workers);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut pending = jobs.into_iter().peekable();
        let mut done = 0usize;

        while pending.peek().is_some() {
            if self.cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                Some(outcome) = rx.recv() => {
                    done += 1;
                    self.record(aggregator, outcome, done, total);
                }

                permit = semaphore.clone().acquire_owned() => {
                    let Ok(permit) = permit else { break };
                    let Some(job) = pending.next() else { break };

                    let tx = tx.clone();
                    let abort = self.cancel.clone();
                    let running = running.clone();
                    let peak = peak.clone();
                    tokio::spawn(async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);

                        let outcome = run_guarded(job, abort).await;

                        running.fetch_sub(1, Ordering::SeqCst);
                        // Receiver outlives every sender; a send error means
                        // the coordinator itself was dropped
                        let _ = tx.send(outcome).await;
                        drop(permit);
                    });
                }
            }
        }

        let not_started: Vec<_> = pending.map(|job| job.unit().clone()).collect();
        if !not_started.is_empty() {
            warn!(
                "Cancelled: {} job(s) not started, waiting for running jobs",
                not_started.len()
            );
            aggregator.record_not_started(not_started);
        }

        drop(tx);
        while let Some(outcome) = rx.recv().await {
            done += 1;
            self.record(aggregator, outcome, done, total);
        }

        aggregator.set_peak_concurrency(peak.load(Ordering::SeqCst));
    }

    fn record(&self, aggregator: &mut Aggregator, outcome: JobOutcome, done: usize, total: usize) {
        let name = outcome.unit.name().into_owned();
        if outcome.is_success() {
            debug!(
                "✓ [{}/{}] {} ({:.1}s)",
                done,
                total,
                name,
                outcome.elapsed.as_secs_f64()
            );
        } else {
            warn!("✗ [{}/{}] {} {}", done, total, name, outcome.kind);
        }
        aggregator.record(outcome);

        if let Some(pb) = &self.progress {
            pb.inc(1);
            pb.set_message(name);
        }
    }
}

/// Run a job in its own task so that a panic still yields exactly one
/// outcome for the unit.
async fn run_guarded(job: JobDescriptor, abort: CancelToken) -> JobOutcome {
    let unit = job.unit().clone();
    let start = Instant::now();
    match tokio::spawn(async move { run_job(&job, &abort).await }).await {
        Ok(outcome) => outcome,
        Err(e) => JobOutcome::new(
            unit,
            OutcomeKind::LaunchFailed {
                reason: format!("job task failed: {}", e),
            },
            start.elapsed(),
        ),
    }
}

//! Batch engine: discovery → completion filter → descriptors → scheduler → report

use crate::cancel::CancelToken;
use crate::discovery::Discovery;
use crate::error::{BatchError, Result};
use crate::filter::{CompletionFilter, SentinelPolicy};
use crate::report::{Aggregator, BatchReport};
use crate::scheduler::Scheduler;
use crate::stage::Stage;
use indicatif::ProgressBar;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// One worker per available core
pub fn default_num_workers() -> usize {
    num_cpus::get()
}

/// Half the available cores, at least one. For jobs that are themselves
/// multi-threaded (SLAM).
pub fn heavy_num_workers() -> usize {
    (num_cpus::get() / 2).max(1)
}

/// Runs one stage over one root directory
#[derive(Clone)]
pub struct BatchEngine {
    num_workers: usize,
    sentinel_policy: SentinelPolicy,
    cancel: CancelToken,
    progress: Option<ProgressBar>,
}

impl BatchEngine {
    pub fn new(num_workers: usize) -> Result<Self> {
        if num_workers == 0 {
            return Err(BatchError::InvalidWorkerCount(num_workers));
        }
        Ok(Self {
            num_workers,
            sentinel_policy: SentinelPolicy::default(),
            cancel: CancelToken::new(),
            progress: None,
        })
    }

    pub fn with_sentinel_policy(mut self, policy: SentinelPolicy) -> Self {
        self.sentinel_policy = policy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The bar's length is set to the number of admitted jobs
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Run `stage` over `root`.
    ///
    /// Configuration problems (failed preflight, missing root, a pending unit
    /// missing a required input, an invalid descriptor) are returned as errors
    /// before any job starts. Job failures are never errors; they are in the
    /// returned report.
    pub async fn run(&self, stage: &dyn Stage, root: &Path) -> Result<BatchReport> {
        let start = Instant::now();
        info!("=== Stage {} started ===", stage.name());
        info!("Root: {}", root.display());

        stage.preflight().await?;

        let discovery = Discovery::new(root)?;
        let units = discovery.find(&stage.patterns(), stage.required_inputs())?;

        let filter = CompletionFilter::new(stage.sentinel(), self.sentinel_policy);
        let (pending, skipped) = filter.partition(units);
        info!(
            "Found {} unit(s): {} pending, {} already done",
            pending.len() + skipped.len(),
            pending.len(),
            skipped.len()
        );

        for unit in &pending {
            unit.validate()?;
        }
        let mut jobs = Vec::with_capacity(pending.len());
        for unit in &pending {
            jobs.push(stage.build_job(unit).await?);
        }
        debug!("Built {} job descriptor(s)", jobs.len());

        let mut aggregator = Aggregator::new(stage.name());
        aggregator.record_skipped(skipped);

        let mut scheduler = Scheduler::new(self.num_workers)?.with_cancel(self.cancel.clone());
        if let Some(pb) = &self.progress {
            pb.set_length(jobs.len() as u64);
            scheduler = scheduler.with_progress(pb.clone());
        }
        scheduler.run(jobs, &mut aggregator).await;

        let report = aggregator.finalize(start.elapsed());
        info!(
            "=== Stage {} complete in {:.1}s: {} ===",
            stage.name(),
            report.elapsed.as_secs_f64(),
            report.summary()
        );
        Ok(report)
    }
}

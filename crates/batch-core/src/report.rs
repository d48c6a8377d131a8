//! Result aggregation and the batch report

use crate::outcome::{JobOutcome, OutcomeKind};
use crate::unit::WorkUnit;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Aggregate of one batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub stage: String,
    /// Terminal outcomes in completion order
    pub outcomes: Vec<JobOutcome>,
    /// Units skipped because their sentinel already existed
    pub skipped: Vec<WorkUnit>,
    /// Units never admitted because the batch was cancelled
    pub not_started: Vec<WorkUnit>,
    pub peak_concurrency: usize,
    #[serde(with = "crate::outcome::duration_secs")]
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            skipped: self.skipped.len(),
            not_started: self.not_started.len(),
            ..Default::default()
        };
        for outcome in &self.outcomes {
            match &outcome.kind {
                OutcomeKind::Completed { exit_code: 0 } => summary.succeeded += 1,
                OutcomeKind::Completed { .. } => summary.failed += 1,
                OutcomeKind::TimedOut { .. } => summary.timed_out += 1,
                OutcomeKind::LaunchFailed { .. } => summary.launch_failed += 1,
                OutcomeKind::Aborted => summary.aborted += 1,
            }
        }
        summary
    }

    /// True when every admitted job exited 0 and nothing was left unstarted
    pub fn is_success(&self) -> bool {
        self.not_started.is_empty() && self.outcomes.iter().all(JobOutcome::is_success)
    }

    /// Outcomes that were not a clean exit 0
    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Outcomes ordered by unit path, for stable presentation
    pub fn sorted_by_unit(&self) -> Vec<&JobOutcome> {
        let mut sorted: Vec<_> = self.outcomes.iter().collect();
        sorted.sort_by(|a, b| a.unit.dir().cmp(b.unit.dir()));
        sorted
    }
}

/// Counts per outcome category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub launch_failed: usize,
    pub aborted: usize,
    pub skipped: usize,
    pub not_started: usize,
}

impl BatchSummary {
    pub fn admitted(&self) -> usize {
        self.succeeded + self.failed + self.timed_out + self.launch_failed + self.aborted
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} timed out, {} failed to launch, {} skipped",
            self.succeeded, self.failed, self.timed_out, self.launch_failed, self.skipped
        )?;
        if self.aborted > 0 {
            write!(f, ", {} aborted", self.aborted)?;
        }
        if self.not_started > 0 {
            write!(f, ", {} not started", self.not_started)?;
        }
        Ok(())
    }
}

/// Collects outcomes as they arrive.
///
/// Each unit may be recorded once; a second outcome for the same unit is
/// rejected. After [`finalize`](Self::finalize) the report is frozen and
/// further calls return the same report.
#[derive(Debug)]
pub struct Aggregator {
    stage: String,
    outcomes: Vec<JobOutcome>,
    skipped: Vec<WorkUnit>,
    not_started: Vec<WorkUnit>,
    seen: HashSet<WorkUnit>,
    peak_concurrency: usize,
    finalized: Option<BatchReport>,
}

impl Aggregator {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            outcomes: Vec::new(),
            skipped: Vec::new(),
            not_started: Vec::new(),
            seen: HashSet::new(),
            peak_concurrency: 0,
            finalized: None,
        }
    }

    /// Record a terminal outcome. Returns `false` if the unit already has one
    /// or the report has been finalized.
    pub fn record(&mut self, outcome: JobOutcome) -> bool {
        if self.finalized.is_some() {
            warn!("{}: outcome arrived after finalize, ignoring", outcome.unit.name());
            return false;
        }
        if !self.seen.insert(outcome.unit.clone()) {
            warn!("{}: duplicate outcome rejected", outcome.unit.name());
            return false;
        }
        self.outcomes.push(outcome);
        true
    }

    pub fn record_skipped(&mut self, units: impl IntoIterator<Item = WorkUnit>) {
        if self.finalized.is_none() {
            self.skipped.extend(units);
        }
    }

    pub fn record_not_started(&mut self, units: impl IntoIterator<Item = WorkUnit>) {
        if self.finalized.is_none() {
            self.not_started.extend(units);
        }
    }

    pub fn set_peak_concurrency(&mut self, peak: usize) {
        self.peak_concurrency = self.peak_concurrency.max(peak);
    }

    pub fn recorded(&self) -> usize {
        self.outcomes.len()
    }

    pub fn finalize(&mut self, elapsed: Duration) -> BatchReport {
        self.finalized
            .get_or_insert_with(|| BatchReport {
                stage: self.stage.clone(),
                outcomes: std::mem::take(&mut self.outcomes),
                skipped: std::mem::take(&mut self.skipped),
                not_started: std::mem::take(&mut self.not_started),
                peak_concurrency: self.peak_concurrency,
                elapsed,
            })
            .clone()
    }
}

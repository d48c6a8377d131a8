//! Completion filter: skip units whose output already exists

use crate::unit::WorkUnit;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Output file whose presence marks a unit as done
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sentinel {
    /// File name inside the unit directory
    InUnit(String),
    /// Fixed absolute path, for stages whose output lives outside the unit
    Path(PathBuf),
}

impl Sentinel {
    pub fn in_unit(name: impl Into<String>) -> Self {
        Self::InUnit(name.into())
    }

    /// Resolve the sentinel for a given unit
    pub fn path_for(&self, unit: &WorkUnit) -> PathBuf {
        match self {
            Self::InUnit(name) => unit.input(name),
            Self::Path(path) => path.clone(),
        }
    }
}

/// How strictly a sentinel file is checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentinelPolicy {
    /// Any file at the sentinel path counts as done
    #[default]
    Exists,
    /// Only a non-empty file counts; a zero-byte leftover of an interrupted
    /// run is treated as not done
    NonEmpty,
}

impl SentinelPolicy {
    pub fn is_satisfied(self, path: &Path) -> bool {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => match self {
                Self::Exists => true,
                Self::NonEmpty => meta.len() > 0,
            },
            _ => false,
        }
    }
}

/// Splits discovered units into pending and already-completed
#[derive(Debug, Clone)]
pub struct CompletionFilter {
    sentinel: Sentinel,
    policy: SentinelPolicy,
}

impl CompletionFilter {
    pub fn new(sentinel: Sentinel, policy: SentinelPolicy) -> Self {
        Self { sentinel, policy }
    }

    pub fn is_complete(&self, unit: &WorkUnit) -> bool {
        self.policy.is_satisfied(&self.sentinel.path_for(unit))
    }

    /// Returns `(pending, skipped)`, both in input order
    pub fn partition(&self, units: Vec<WorkUnit>) -> (Vec<WorkUnit>, Vec<WorkUnit>) {
        let (skipped, pending): (Vec<_>, Vec<_>) =
            units.into_iter().partition(|unit| self.is_complete(unit));
        for unit in &skipped {
            debug!("{}: already done, skipping", unit.name());
        }
        (pending, skipped)
    }
}

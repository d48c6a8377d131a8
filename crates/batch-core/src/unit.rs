//! Work units: one directory, one recording, one pass of a stage's tool

use crate::error::{BatchError, Result};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

/// A directory that needs one run of a stage's external tool.
///
/// The directory is always absolute. Units are immutable values; the
/// scheduler and aggregator only ever clone them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkUnit {
    dir: PathBuf,
    #[serde(skip)]
    required_inputs: Vec<String>,
}

impl WorkUnit {
    /// Create a unit for `dir`. Relative paths are rejected so that job
    /// descriptors never depend on the engine's current directory.
    pub fn new(dir: impl Into<PathBuf>, required_inputs: &[&str]) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_absolute() {
            return Err(BatchError::InvalidDescriptor(format!(
                "work unit directory must be absolute: {}",
                dir.display()
            )));
        }
        Ok(Self {
            dir,
            required_inputs: required_inputs.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path component, used as the unit's display name
    pub fn name(&self) -> Cow<'_, str> {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| self.dir.to_string_lossy())
    }

    pub fn required_inputs(&self) -> &[String] {
        &self.required_inputs
    }

    /// Absolute path of a file inside the unit directory
    pub fn input(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Check that every required input exists.
    ///
    /// A missing input is a configuration error, never a silent skip.
    pub fn validate(&self) -> Result<()> {
        for input in &self.required_inputs {
            if !self.dir.join(input).is_file() {
                return Err(BatchError::MissingInput {
                    unit: self.dir.clone(),
                    input: input.clone(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir.display())
    }
}

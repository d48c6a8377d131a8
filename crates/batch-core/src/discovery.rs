//! Work-unit discovery
//!
//! A stage describes the shape of its units as one or more [`UnitPattern`]s.
//! Discovery expands them below a root directory and returns the matching
//! unit directories in a stable order: patterns in the order given, matches
//! of one pattern sorted by path, duplicates dropped.

use crate::error::{BatchError, Result};
use crate::unit::WorkUnit;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Shape of a work unit relative to the discovery root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitPattern {
    /// Directories matching `dir_glob` (relative to the root) that contain
    /// the file `marker`, e.g. `demos/*` + `raw_video.mp4`
    Child { dir_glob: String, marker: String },

    /// The root directory itself is the single unit
    Root,
}

impl UnitPattern {
    pub fn child(dir_glob: impl Into<String>, marker: impl Into<String>) -> Self {
        Self::Child {
            dir_glob: dir_glob.into(),
            marker: marker.into(),
        }
    }
}

/// Expands unit patterns below a root directory
#[derive(Debug, Clone)]
pub struct Discovery {
    root: PathBuf,
}

impl Discovery {
    /// Create a discovery for `root`. The root must exist; it is resolved to
    /// an absolute path so that every unit directory is absolute too.
    pub fn new(root: &Path) -> Result<Self> {
        let root = std::fs::canonicalize(root)
            .map_err(|_| BatchError::RootNotFound(root.to_path_buf()))?;
        if !root.is_dir() {
            return Err(BatchError::RootNotFound(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return all unit directories matching any of `patterns`
    pub fn find(&self, patterns: &[UnitPattern], required_inputs: &[&str]) -> Result<Vec<WorkUnit>> {
        let mut seen = HashSet::new();
        let mut units = Vec::new();

        for pattern in patterns {
            for dir in self.expand(pattern)? {
                if seen.insert(dir.clone()) {
                    units.push(WorkUnit::new(dir, required_inputs)?);
                }
            }
        }

        debug!(
            "Discovered {} unit(s) under {}",
            units.len(),
            self.root.display()
        );
        Ok(units)
    }

    fn expand(&self, pattern: &UnitPattern) -> Result<Vec<PathBuf>> {
        let (dir_glob, marker) = match pattern {
            UnitPattern::Root => return Ok(vec![self.root.clone()]),
            UnitPattern::Child { dir_glob, marker } => (dir_glob, marker),
        };

        let root = self.root.to_str().ok_or_else(|| BatchError::InvalidPattern {
            pattern: dir_glob.clone(),
            reason: format!("root is not valid UTF-8: {}", self.root.display()),
        })?;
        let full = format!(
            "{}/{}/{}",
            glob::Pattern::escape(root),
            dir_glob,
            glob::Pattern::escape(marker)
        );

        let entries = glob::glob(&full).map_err(|e| BatchError::InvalidPattern {
            pattern: dir_glob.clone(),
            reason: e.to_string(),
        })?;

        let mut dirs = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => {
                    if let Some(parent) = path.parent() {
                        dirs.push(parent.to_path_buf());
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable path during discovery: {}", e),
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

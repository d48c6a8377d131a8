//! The seam between the engine and a concrete pipeline stage

use crate::descriptor::JobDescriptor;
use crate::discovery::UnitPattern;
use crate::error::Result;
use crate::filter::Sentinel;
use crate::unit::WorkUnit;
use async_trait::async_trait;

/// A pipeline stage: which directories are its units, when a unit is done,
/// and how to turn a unit into an external invocation.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name, also used for the per-unit log file names
    fn name(&self) -> &str;

    /// Unit shapes below the stage root, in admission order
    fn patterns(&self) -> Vec<UnitPattern>;

    /// Files that must exist in every pending unit
    fn required_inputs(&self) -> &[&str];

    fn sentinel(&self) -> Sentinel;

    /// Checks that must pass before any job is scheduled, such as the
    /// availability of external tools. Defaults to no checks.
    async fn preflight(&self) -> Result<()> {
        Ok(())
    }

    /// Build the invocation for one validated unit
    async fn build_job(&self, unit: &WorkUnit) -> Result<JobDescriptor>;
}

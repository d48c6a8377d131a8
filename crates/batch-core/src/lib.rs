//! UMI batch core - bounded-concurrency execution of external per-unit jobs
//!
//! A pipeline stage scans a directory tree for work units (one directory per
//! recording), skips the ones whose output already exists, and runs an
//! external tool on each remaining unit with a fixed number of parallel
//! workers and an optional per-job timeout. Every admitted unit ends in
//! exactly one [`JobOutcome`]; the outcomes and skip counts make up the
//! [`BatchReport`].
//!
//! ```no_run
//! # use umi_batch_core::{BatchEngine, Stage};
//! # async fn demo(stage: &dyn Stage) -> umi_batch_core::Result<()> {
//! let engine = BatchEngine::new(4)?;
//! let report = engine.run(stage, std::path::Path::new("/data/session/demos")).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod descriptor;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod filter;
pub mod outcome;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod stage;
pub mod unit;

pub use cancel::CancelToken;
pub use descriptor::{JobDescriptor, JobDescriptorBuilder};
pub use discovery::{Discovery, UnitPattern};
pub use engine::{default_num_workers, heavy_num_workers, BatchEngine};
pub use error::{BatchError, Result};
pub use filter::{CompletionFilter, Sentinel, SentinelPolicy};
pub use outcome::{JobOutcome, OutcomeKind};
pub use report::{Aggregator, BatchReport, BatchSummary};
pub use runner::run_job;
pub use scheduler::Scheduler;
pub use stage::Stage;
pub use unit::WorkUnit;

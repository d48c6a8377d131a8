//! Subcommands and the stage-running loop they share

pub mod run;
pub mod stages;

use crate::output::{self, OutputFormat};
use crate::signals;
use anyhow::{bail, Context as _, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use umi_batch_core::{BatchEngine, CancelToken, SentinelPolicy};
use umi_stages::{default_config_path, load_config, Overrides, PipelineConfig, StageFactory, StageKind};

/// Settings shared by every subcommand
pub struct Context {
    pub config: PipelineConfig,
    pub format: OutputFormat,
    pub verbose: bool,
}

impl Context {
    /// Load the config file. An explicit `path` must exist; the default
    /// location may be absent.
    pub fn load(path: Option<&Path>, format: OutputFormat, verbose: bool) -> Result<Self> {
        let config = match path {
            Some(path) => {
                if !path.is_file() {
                    bail!("Config file not found: {}", path.display());
                }
                load_config(path)?
            }
            None => {
                let path = default_config_path()?;
                debug!("Loading config from {}", path.display());
                load_config(&path)?
            }
        };
        Ok(Self {
            config,
            format,
            verbose,
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Session directory (holds demos/)
    #[arg(value_name = "SESSION")]
    pub session: PathBuf,

    /// Parallel jobs (default: config, else per-stage CPU-based default)
    #[arg(short = 'n', long)]
    pub num_workers: Option<usize>,

    /// Skip `docker pull` before running containers
    #[arg(long)]
    pub no_docker_pull: bool,

    /// Only count non-empty output files as done
    #[arg(long)]
    pub strict_sentinel: bool,
}

/// Run `kinds` in order over one session.
///
/// Returns whether every stage succeeded. A failing stage stops the run
/// unless `keep_going` is set; cancellation always stops it.
pub async fn run_stages(
    ctx: &Context,
    args: &SessionArgs,
    mut overrides: Overrides,
    kinds: &[StageKind],
    keep_going: bool,
) -> Result<bool> {
    if !args.session.is_dir() {
        bail!("Session directory not found: {}", args.session.display());
    }
    if args.no_docker_pull {
        overrides.docker_pull = Some(false);
    }
    let factory = StageFactory::new(ctx.config.clone(), overrides, &args.session);

    let policy = if args.strict_sentinel || ctx.config.strict_sentinel() {
        SentinelPolicy::NonEmpty
    } else {
        SentinelPolicy::Exists
    };

    let cancel = CancelToken::new();
    let signals = signals::spawn_handler(cancel.clone());

    let mut all_ok = true;
    for &kind in kinds {
        let workers = args
            .num_workers
            .or_else(|| ctx.config.num_workers())
            .unwrap_or_else(|| kind.default_workers());

        info!("Stage {}", kind);
        let result = run_stage(ctx, &factory, kind, workers, policy, &cancel).await;
        let ok = match result {
            Ok(ok) => ok,
            Err(e) if keep_going => {
                error!("{:#}", e);
                false
            }
            Err(e) => {
                signals.abort();
                return Err(e);
            }
        };

        if !ok {
            all_ok = false;
            if cancel.is_cancelled() || !keep_going {
                break;
            }
        }
    }

    signals.abort();
    Ok(all_ok)
}

async fn run_stage(
    ctx: &Context,
    factory: &StageFactory,
    kind: StageKind,
    workers: usize,
    policy: SentinelPolicy,
    cancel: &CancelToken,
) -> Result<bool> {
    let stage = factory
        .build(kind)
        .with_context(|| format!("Failed to configure stage {}", kind))?;

    let pb = output::progress_bar(ctx.format, ctx.verbose);
    let engine = BatchEngine::new(workers)?
        .with_sentinel_policy(policy)
        .with_cancel(cancel.clone())
        .with_progress(pb.clone());

    let report = engine
        .run(stage.as_ref(), &kind.root(factory.layout()))
        .await
        .with_context(|| format!("Stage {} failed", kind));
    pb.finish_and_clear();
    let report = report?;

    output::print_report(&report, ctx.format)?;
    Ok(report.is_success())
}

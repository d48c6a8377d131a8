//! One subcommand per pipeline stage

use super::{run_stages, Context, SessionArgs};
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use umi_stages::{Overrides, StageKind};

#[derive(Args, Debug, Clone, Default)]
pub struct MapArgs {
    /// Map atlas file (default: demos/mapping/map_atlas.osa)
    #[arg(long, value_name = "PATH")]
    pub map_path: Option<PathBuf>,

    /// Do not pass slam_mask.png to ORB-SLAM3
    #[arg(long)]
    pub no_mask: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SlamArgs {
    #[command(flatten)]
    pub map: MapArgs,

    /// Lost frames tolerated before a demo is abandoned
    #[arg(long)]
    pub max_lost_frames: Option<u32>,

    /// Per-video timeout as a multiple of its duration (0 disables)
    #[arg(long)]
    pub timeout_multiple: Option<f64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ArucoArgs {
    /// Camera intrinsics JSON
    #[arg(long, value_name = "PATH")]
    pub camera_intrinsics: Option<PathBuf>,

    /// ArUco marker config YAML
    #[arg(long, value_name = "PATH")]
    pub aruco_config: Option<PathBuf>,
}

impl MapArgs {
    pub fn apply(&self, overrides: &mut Overrides) {
        overrides.map_path = self.map_path.clone();
        overrides.no_mask = self.no_mask;
    }
}

impl SlamArgs {
    pub fn apply(&self, overrides: &mut Overrides) {
        self.map.apply(overrides);
        overrides.max_lost_frames = self.max_lost_frames;
        overrides.timeout_multiple = self.timeout_multiple;
    }
}

impl ArucoArgs {
    pub fn apply(&self, overrides: &mut Overrides) {
        overrides.camera_intrinsics = self.camera_intrinsics.clone();
        overrides.aruco_config = self.aruco_config.clone();
    }
}

#[derive(Args, Debug)]
pub struct ExtractImuCommand {
    #[command(flatten)]
    session: SessionArgs,
}

impl ExtractImuCommand {
    pub async fn execute(self, ctx: &Context) -> Result<bool> {
        run_stages(
            ctx,
            &self.session,
            Overrides::default(),
            &[StageKind::ExtractImu],
            false,
        )
        .await
    }
}

#[derive(Args, Debug)]
pub struct CreateMapCommand {
    #[command(flatten)]
    session: SessionArgs,

    #[command(flatten)]
    map: MapArgs,
}

impl CreateMapCommand {
    pub async fn execute(self, ctx: &Context) -> Result<bool> {
        let mut overrides = Overrides::default();
        self.map.apply(&mut overrides);
        run_stages(ctx, &self.session, overrides, &[StageKind::CreateMap], false).await
    }
}

#[derive(Args, Debug)]
pub struct BatchSlamCommand {
    #[command(flatten)]
    session: SessionArgs,

    #[command(flatten)]
    slam: SlamArgs,
}

impl BatchSlamCommand {
    pub async fn execute(self, ctx: &Context) -> Result<bool> {
        let mut overrides = Overrides::default();
        self.slam.apply(&mut overrides);
        run_stages(ctx, &self.session, overrides, &[StageKind::BatchSlam], false).await
    }
}

#[derive(Args, Debug)]
pub struct DetectArucoCommand {
    #[command(flatten)]
    session: SessionArgs,

    #[command(flatten)]
    aruco: ArucoArgs,
}

impl DetectArucoCommand {
    pub async fn execute(self, ctx: &Context) -> Result<bool> {
        let mut overrides = Overrides::default();
        self.aruco.apply(&mut overrides);
        run_stages(ctx, &self.session, overrides, &[StageKind::DetectAruco], false).await
    }
}

#[derive(Args, Debug)]
pub struct CalibrateCommand {
    #[command(flatten)]
    session: SessionArgs,

    /// Run gripper-range calibration even if SLAM-tag calibration fails
    #[arg(long)]
    keep_going: bool,
}

impl CalibrateCommand {
    pub async fn execute(self, ctx: &Context) -> Result<bool> {
        run_stages(
            ctx,
            &self.session,
            Overrides::default(),
            &[StageKind::CalibrateSlamTag, StageKind::CalibrateGripperRange],
            self.keep_going,
        )
        .await
    }
}

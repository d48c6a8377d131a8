use super::stages::{ArucoArgs, SlamArgs};
use super::{run_stages, Context, SessionArgs};
use anyhow::Result;
use clap::Args;
use umi_stages::{Overrides, StageKind};

#[derive(Args, Debug)]
pub struct RunCommand {
    #[command(flatten)]
    session: SessionArgs,

    #[command(flatten)]
    slam: SlamArgs,

    #[command(flatten)]
    aruco: ArucoArgs,

    /// Continue with later stages after a stage fails
    #[arg(long)]
    keep_going: bool,
}

impl RunCommand {
    pub async fn execute(self, ctx: &Context) -> Result<bool> {
        let mut overrides = Overrides::default();
        self.slam.apply(&mut overrides);
        self.aruco.apply(&mut overrides);
        run_stages(ctx, &self.session, overrides, &StageKind::ALL, self.keep_going).await
    }
}

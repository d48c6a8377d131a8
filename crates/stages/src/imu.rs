//! IMU extraction from GoPro telemetry

use crate::layout::{IMU_DATA, RAW_VIDEO};
use crate::tools::DockerImage;
use async_trait::async_trait;
use umi_batch_core::{JobDescriptor, Result, Sentinel, Stage, UnitPattern, WorkUnit};

const EXTRACT_SCRIPT: &str = "/OpenImuCameraCalibrator/javascript/extract_metadata_single.js";

/// Runs the OpenICC metadata extractor on every `demos/*/raw_video.mp4`,
/// producing `imu_data.json` next to the video.
#[derive(Debug, Clone)]
pub struct ImuStage {
    image: DockerImage,
}

impl ImuStage {
    pub fn new(image: DockerImage) -> Self {
        Self { image }
    }
}

#[async_trait]
impl Stage for ImuStage {
    fn name(&self) -> &str {
        "extract_gopro_imu"
    }

    fn patterns(&self) -> Vec<UnitPattern> {
        vec![UnitPattern::child("*", RAW_VIDEO)]
    }

    fn required_inputs(&self) -> &[&str] {
        &[RAW_VIDEO]
    }

    fn sentinel(&self) -> Sentinel {
        Sentinel::in_unit(IMU_DATA)
    }

    async fn preflight(&self) -> Result<()> {
        self.image.prepare().await
    }

    async fn build_job(&self, unit: &WorkUnit) -> Result<JobDescriptor> {
        JobDescriptor::for_unit(self.name(), unit, "docker")
            .args(self.image.run_args(&[(unit.dir(), "/data")]))
            .args([
                "node",
                EXTRACT_SCRIPT,
                "/data/raw_video.mp4",
                "/data/imu_data.json",
            ])
            .build()
    }
}

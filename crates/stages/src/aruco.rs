//! ArUco tag detection on every demonstration video

use crate::layout::{RAW_VIDEO, TAG_DETECTION};
use crate::tools::{self, PythonScript};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use umi_batch_core::{JobDescriptor, Result, Sentinel, Stage, UnitPattern, WorkUnit};

pub const DETECT_SCRIPT: &str = "detect_aruco.py";

#[derive(Debug, Clone)]
pub struct ArucoStage {
    script: PythonScript,
    camera_intrinsics: PathBuf,
    aruco_config: PathBuf,
}

impl ArucoStage {
    /// `scripts_dir` holds `detect_aruco.py`. Relative paths are resolved
    /// against the current directory.
    pub fn new(
        python: impl Into<String>,
        scripts_dir: &Path,
        camera_intrinsics: &Path,
        aruco_config: &Path,
    ) -> Result<Self> {
        Ok(Self {
            script: PythonScript::new(python, tools::absolute(&scripts_dir.join(DETECT_SCRIPT))?),
            camera_intrinsics: tools::absolute(camera_intrinsics)?,
            aruco_config: tools::absolute(aruco_config)?,
        })
    }
}

#[async_trait]
impl Stage for ArucoStage {
    fn name(&self) -> &str {
        "detect_aruco"
    }

    fn patterns(&self) -> Vec<UnitPattern> {
        vec![UnitPattern::child("*", RAW_VIDEO)]
    }

    fn required_inputs(&self) -> &[&str] {
        &[RAW_VIDEO]
    }

    fn sentinel(&self) -> Sentinel {
        Sentinel::in_unit(TAG_DETECTION)
    }

    async fn preflight(&self) -> Result<()> {
        tools::require_file(&self.camera_intrinsics, "camera intrinsics")?;
        tools::require_file(&self.aruco_config, "ArUco config")?;
        self.script.check()
    }

    async fn build_job(&self, unit: &WorkUnit) -> Result<JobDescriptor> {
        JobDescriptor::for_unit(self.name(), unit, &self.script.interpreter)
            .arg(&self.script.script)
            .arg("--input")
            .arg(unit.input(RAW_VIDEO))
            .arg("--output")
            .arg(unit.input(TAG_DETECTION))
            .arg("--intrinsics_json")
            .arg(&self.camera_intrinsics)
            .arg("--aruco_yaml")
            .arg(&self.aruco_config)
            // parallelism comes from the engine, one process per video
            .args(["--num_workers", "1"])
            .build()
    }
}

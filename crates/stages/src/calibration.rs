//! Calibration stages run after tag detection:
//! the SLAM-to-tag transform from the mapping video, and the gripper opening
//! range from each gripper calibration video.

use crate::layout::{
    CAMERA_TRAJECTORY, GRIPPER_RANGE, MAPPING_TRAJECTORY, RAW_VIDEO, TAG_DETECTION, TX_SLAM_TAG,
};
use crate::tools::{self, PythonScript};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;
use umi_batch_core::{BatchError, JobDescriptor, Result, Sentinel, Stage, UnitPattern, WorkUnit};

pub const SLAM_TAG_SCRIPT: &str = "calibrate_slam_tag.py";
pub const GRIPPER_RANGE_SCRIPT: &str = "calibrate_gripper_range.py";

/// Computes `tx_slam_tag.json` in `demos/mapping` from the detected tags and
/// the mapping trajectory
#[derive(Debug, Clone)]
pub struct SlamTagStage {
    script: PythonScript,
}

impl SlamTagStage {
    pub fn new(python: impl Into<String>, scripts_dir: &Path) -> Result<Self> {
        Ok(Self {
            script: PythonScript::new(python, tools::absolute(&scripts_dir.join(SLAM_TAG_SCRIPT))?),
        })
    }
}

/// Relocalized trajectory if batch SLAM produced one, else the trajectory
/// written while building the map
fn trajectory_for(unit: &WorkUnit) -> Result<PathBuf> {
    let relocalized = unit.input(CAMERA_TRAJECTORY);
    if relocalized.is_file() {
        return Ok(relocalized);
    }
    let mapping = unit.input(MAPPING_TRAJECTORY);
    if mapping.is_file() {
        info!(
            "{}: {} not found, using {}",
            unit.name(),
            CAMERA_TRAJECTORY,
            MAPPING_TRAJECTORY
        );
        return Ok(mapping);
    }
    Err(BatchError::MissingInput {
        unit: unit.dir().to_path_buf(),
        input: format!("{} or {}", CAMERA_TRAJECTORY, MAPPING_TRAJECTORY),
    })
}

#[async_trait]
impl Stage for SlamTagStage {
    fn name(&self) -> &str {
        "calibrate_slam_tag"
    }

    fn patterns(&self) -> Vec<UnitPattern> {
        vec![UnitPattern::Root]
    }

    fn required_inputs(&self) -> &[&str] {
        &[TAG_DETECTION]
    }

    fn sentinel(&self) -> Sentinel {
        Sentinel::in_unit(TX_SLAM_TAG)
    }

    async fn preflight(&self) -> Result<()> {
        self.script.check()
    }

    async fn build_job(&self, unit: &WorkUnit) -> Result<JobDescriptor> {
        let trajectory = trajectory_for(unit)?;
        JobDescriptor::for_unit(self.name(), unit, &self.script.interpreter)
            .arg(&self.script.script)
            .arg("--tag_detection")
            .arg(unit.input(TAG_DETECTION))
            .arg("--csv_trajectory")
            .arg(trajectory)
            .arg("--output")
            .arg(unit.input(TX_SLAM_TAG))
            .arg("--keyframe_only")
            .build()
    }
}

/// Computes `gripper_range.json` for every `demos/gripper_calibration*`
#[derive(Debug, Clone)]
pub struct GripperRangeStage {
    script: PythonScript,
}

impl GripperRangeStage {
    pub fn new(python: impl Into<String>, scripts_dir: &Path) -> Result<Self> {
        Ok(Self {
            script: PythonScript::new(
                python,
                tools::absolute(&scripts_dir.join(GRIPPER_RANGE_SCRIPT))?,
            ),
        })
    }
}

#[async_trait]
impl Stage for GripperRangeStage {
    fn name(&self) -> &str {
        "calibrate_gripper_range"
    }

    fn patterns(&self) -> Vec<UnitPattern> {
        vec![UnitPattern::child("gripper_calibration*", RAW_VIDEO)]
    }

    fn required_inputs(&self) -> &[&str] {
        &[TAG_DETECTION]
    }

    fn sentinel(&self) -> Sentinel {
        Sentinel::in_unit(GRIPPER_RANGE)
    }

    async fn preflight(&self) -> Result<()> {
        self.script.check()
    }

    async fn build_job(&self, unit: &WorkUnit) -> Result<JobDescriptor> {
        JobDescriptor::for_unit(self.name(), unit, &self.script.interpreter)
            .arg(&self.script.script)
            .arg("--input")
            .arg(unit.input(TAG_DETECTION))
            .arg("--output")
            .arg(unit.input(GRIPPER_RANGE))
            .build()
    }
}

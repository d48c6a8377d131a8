//! On-disk layout of a recording session
//!
//! ```text
//! <session>/
//!   demos/
//!     mapping/                    mapping video, map atlas, tx_slam_tag.json
//!     demo_<camera>_<time>/       one directory per demonstration
//!     gripper_calibration_<...>/  gripper range recordings
//! ```

use std::path::{Path, PathBuf};

pub const RAW_VIDEO: &str = "raw_video.mp4";
pub const IMU_DATA: &str = "imu_data.json";
pub const MAP_ATLAS: &str = "map_atlas.osa";
pub const SLAM_MASK: &str = "slam_mask.png";
pub const CAMERA_TRAJECTORY: &str = "camera_trajectory.csv";
pub const MAPPING_TRAJECTORY: &str = "mapping_camera_trajectory.csv";
pub const TAG_DETECTION: &str = "tag_detection.pkl";
pub const TX_SLAM_TAG: &str = "tx_slam_tag.json";
pub const GRIPPER_RANGE: &str = "gripper_range.json";

pub const DEMOS_DIR: &str = "demos";
pub const MAPPING_DIR: &str = "mapping";

#[derive(Debug, Clone)]
pub struct SessionLayout {
    session: PathBuf,
}

impl SessionLayout {
    pub fn new(session: impl Into<PathBuf>) -> Self {
        Self {
            session: session.into(),
        }
    }

    pub fn session(&self) -> &Path {
        &self.session
    }

    pub fn demos(&self) -> PathBuf {
        self.session.join(DEMOS_DIR)
    }

    pub fn mapping(&self) -> PathBuf {
        self.demos().join(MAPPING_DIR)
    }

    /// Map atlas written by mapping and loaded by batch SLAM
    pub fn default_map_path(&self) -> PathBuf {
        self.mapping().join(MAP_ATLAS)
    }
}

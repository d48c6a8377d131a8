//! Configuration loading for the pipeline.
//!
//! All sections and keys are optional; accessors fall back to the defaults
//! below. Command-line flags override values from the file.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub engine: Option<EngineConfig>,
    pub docker: Option<DockerConfig>,
    pub slam: Option<SlamConfig>,
    pub scripts: Option<ScriptsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub num_workers: Option<usize>,
    /// Treat empty sentinel files as not done
    pub strict_sentinel: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct DockerConfig {
    pub pull: Option<bool>,
    pub imu_image: Option<String>,
    pub slam_image: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct SlamConfig {
    pub binary: Option<String>,
    pub vocabulary: Option<String>,
    pub settings: Option<String>,
    pub max_lost_frames: Option<u32>,
    pub timeout_multiple: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScriptsConfig {
    pub python: Option<String>,
    /// Directory holding detect_aruco.py and the calibration scripts
    pub dir: Option<PathBuf>,
    pub camera_intrinsics: Option<PathBuf>,
    pub aruco_config: Option<PathBuf>,
}

pub const DEFAULT_IMU_IMAGE: &str = "chicheng/openicc:latest";
pub const DEFAULT_SLAM_IMAGE: &str = "chicheng/orb_slam3:latest";

pub const DEFAULT_SLAM_BINARY: &str = "/ORB_SLAM3/Examples/Monocular-Inertial/gopro_slam";
pub const DEFAULT_SLAM_VOCABULARY: &str = "/ORB_SLAM3/Vocabulary/ORBvoc.txt";
pub const DEFAULT_SLAM_SETTINGS: &str =
    "/ORB_SLAM3/Examples/Monocular-Inertial/gopro10_maxlens_fisheye_setting_v1_720.yaml";

/// Frames SLAM may lose tracking for before giving up on a video
pub const DEFAULT_MAX_LOST_FRAMES: u32 = 60;

/// SLAM timeout = video duration * this
pub const DEFAULT_TIMEOUT_MULTIPLE: f64 = 16.0;

pub const DEFAULT_PYTHON: &str = "python";
pub const DEFAULT_SCRIPTS_DIR: &str = "scripts";
pub const DEFAULT_CAMERA_INTRINSICS: &str = "example/calibration/gopro_intrinsics_2_7k.json";
pub const DEFAULT_ARUCO_CONFIG: &str = "example/calibration/aruco_config.yaml";

impl PipelineConfig {
    pub fn num_workers(&self) -> Option<usize> {
        self.engine.as_ref().and_then(|e| e.num_workers)
    }

    pub fn strict_sentinel(&self) -> bool {
        self.engine
            .as_ref()
            .and_then(|e| e.strict_sentinel)
            .unwrap_or(false)
    }

    pub fn docker_pull(&self) -> bool {
        self.docker.as_ref().and_then(|d| d.pull).unwrap_or(true)
    }

    pub fn imu_image(&self) -> String {
        self.docker
            .as_ref()
            .and_then(|d| d.imu_image.clone())
            .unwrap_or_else(|| DEFAULT_IMU_IMAGE.to_string())
    }

    pub fn slam_image(&self) -> String {
        self.docker
            .as_ref()
            .and_then(|d| d.slam_image.clone())
            .unwrap_or_else(|| DEFAULT_SLAM_IMAGE.to_string())
    }

    pub fn slam_binary(&self) -> String {
        self.slam
            .as_ref()
            .and_then(|s| s.binary.clone())
            .unwrap_or_else(|| DEFAULT_SLAM_BINARY.to_string())
    }

    pub fn slam_vocabulary(&self) -> String {
        self.slam
            .as_ref()
            .and_then(|s| s.vocabulary.clone())
            .unwrap_or_else(|| DEFAULT_SLAM_VOCABULARY.to_string())
    }

    pub fn slam_settings(&self) -> String {
        self.slam
            .as_ref()
            .and_then(|s| s.settings.clone())
            .unwrap_or_else(|| DEFAULT_SLAM_SETTINGS.to_string())
    }

    pub fn max_lost_frames(&self) -> u32 {
        self.slam
            .as_ref()
            .and_then(|s| s.max_lost_frames)
            .unwrap_or(DEFAULT_MAX_LOST_FRAMES)
    }

    pub fn timeout_multiple(&self) -> f64 {
        self.slam
            .as_ref()
            .and_then(|s| s.timeout_multiple)
            .unwrap_or(DEFAULT_TIMEOUT_MULTIPLE)
    }

    pub fn python(&self) -> String {
        self.scripts
            .as_ref()
            .and_then(|s| s.python.clone())
            .unwrap_or_else(|| DEFAULT_PYTHON.to_string())
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.scripts
            .as_ref()
            .and_then(|s| s.dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRIPTS_DIR))
    }

    pub fn camera_intrinsics(&self) -> PathBuf {
        self.scripts
            .as_ref()
            .and_then(|s| s.camera_intrinsics.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CAMERA_INTRINSICS))
    }

    pub fn aruco_config(&self) -> PathBuf {
        self.scripts
            .as_ref()
            .and_then(|s| s.aruco_config.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARUCO_CONFIG))
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "umi-pipeline")
        .context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

/// Load `path`, or the defaults if it does not exist
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        return Ok(PipelineConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: PipelineConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file as TOML: {}", path.display()))?;
    Ok(config)
}

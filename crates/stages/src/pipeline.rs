//! The full pipeline: which stages exist, in what order, over which root

use crate::aruco::ArucoStage;
use crate::calibration::{GripperRangeStage, SlamTagStage};
use crate::config::PipelineConfig;
use crate::imu::ImuStage;
use crate::layout::SessionLayout;
use crate::slam::{BatchSlamStage, MappingStage, SlamSettings};
use crate::tools::DockerImage;
use std::fmt;
use std::path::{Path, PathBuf};
use umi_batch_core::{default_num_workers, heavy_num_workers, Result, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    ExtractImu,
    CreateMap,
    BatchSlam,
    DetectAruco,
    CalibrateSlamTag,
    CalibrateGripperRange,
}

impl StageKind {
    /// Pipeline order
    pub const ALL: [StageKind; 6] = [
        StageKind::ExtractImu,
        StageKind::CreateMap,
        StageKind::BatchSlam,
        StageKind::DetectAruco,
        StageKind::CalibrateSlamTag,
        StageKind::CalibrateGripperRange,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StageKind::ExtractImu => "extract_gopro_imu",
            StageKind::CreateMap => "create_map",
            StageKind::BatchSlam => "batch_slam",
            StageKind::DetectAruco => "detect_aruco",
            StageKind::CalibrateSlamTag => "calibrate_slam_tag",
            StageKind::CalibrateGripperRange => "calibrate_gripper_range",
        }
    }

    /// Directory the stage discovers its units in
    pub fn root(self, layout: &SessionLayout) -> PathBuf {
        match self {
            StageKind::CreateMap | StageKind::CalibrateSlamTag => layout.mapping(),
            _ => layout.demos(),
        }
    }

    /// Worker count when none is configured
    pub fn default_workers(self) -> usize {
        match self {
            StageKind::CreateMap | StageKind::CalibrateSlamTag => 1,
            StageKind::BatchSlam => heavy_num_workers(),
            _ => default_num_workers(),
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub docker_pull: Option<bool>,
    pub map_path: Option<PathBuf>,
    pub no_mask: bool,
    pub max_lost_frames: Option<u32>,
    pub timeout_multiple: Option<f64>,
    pub camera_intrinsics: Option<PathBuf>,
    pub aruco_config: Option<PathBuf>,
}

/// Builds configured stages for one session
#[derive(Debug, Clone)]
pub struct StageFactory {
    config: PipelineConfig,
    overrides: Overrides,
    layout: SessionLayout,
}

impl StageFactory {
    pub fn new(config: PipelineConfig, overrides: Overrides, session: &Path) -> Self {
        Self {
            config,
            overrides,
            layout: SessionLayout::new(session),
        }
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    pub fn map_path(&self) -> PathBuf {
        self.overrides
            .map_path
            .clone()
            .unwrap_or_else(|| self.layout.default_map_path())
    }

    fn docker_pull(&self) -> bool {
        self.overrides
            .docker_pull
            .unwrap_or_else(|| self.config.docker_pull())
    }

    fn slam_settings(&self) -> SlamSettings {
        SlamSettings {
            binary: self.config.slam_binary(),
            vocabulary: self.config.slam_vocabulary(),
            settings: self.config.slam_settings(),
        }
    }

    pub fn build(&self, kind: StageKind) -> Result<Box<dyn Stage>> {
        let stage: Box<dyn Stage> = match kind {
            StageKind::ExtractImu => Box::new(ImuStage::new(DockerImage::new(
                self.config.imu_image(),
                self.docker_pull(),
            ))),
            StageKind::CreateMap => Box::new(MappingStage::new(
                DockerImage::new(self.config.slam_image(), self.docker_pull()),
                self.slam_settings(),
                &self.map_path(),
                !self.overrides.no_mask,
            )?),
            StageKind::BatchSlam => Box::new(BatchSlamStage::new(
                DockerImage::new(self.config.slam_image(), self.docker_pull()),
                self.slam_settings(),
                &self.map_path(),
                self.overrides
                    .max_lost_frames
                    .unwrap_or_else(|| self.config.max_lost_frames()),
                self.overrides
                    .timeout_multiple
                    .unwrap_or_else(|| self.config.timeout_multiple()),
                !self.overrides.no_mask,
            )?),
            StageKind::DetectAruco => Box::new(ArucoStage::new(
                self.config.python(),
                &self.config.scripts_dir(),
                &self
                    .overrides
                    .camera_intrinsics
                    .clone()
                    .unwrap_or_else(|| self.config.camera_intrinsics()),
                &self
                    .overrides
                    .aruco_config
                    .clone()
                    .unwrap_or_else(|| self.config.aruco_config()),
            )?),
            StageKind::CalibrateSlamTag => Box::new(SlamTagStage::new(
                self.config.python(),
                &self.config.scripts_dir(),
            )?),
            StageKind::CalibrateGripperRange => Box::new(GripperRangeStage::new(
                self.config.python(),
                &self.config.scripts_dir(),
            )?),
        };
        Ok(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_match_built_stages() {
        let factory = StageFactory::new(
            PipelineConfig::default(),
            Overrides::default(),
            Path::new("/data/session"),
        );
        for kind in StageKind::ALL {
            let stage = factory.build(kind).unwrap();
            assert_eq!(stage.name(), kind.name());
        }
    }

    #[test]
    fn test_roots() {
        let layout = SessionLayout::new("/s");
        assert_eq!(StageKind::CreateMap.root(&layout), Path::new("/s/demos/mapping"));
        assert_eq!(StageKind::BatchSlam.root(&layout), Path::new("/s/demos"));
        assert_eq!(StageKind::CalibrateSlamTag.root(&layout), Path::new("/s/demos/mapping"));
    }

    #[test]
    fn test_map_path_override() {
        let factory = StageFactory::new(
            PipelineConfig::default(),
            Overrides {
                map_path: Some(PathBuf::from("/maps/atlas.osa")),
                ..Default::default()
            },
            Path::new("/data/session"),
        );
        assert_eq!(factory.map_path(), Path::new("/maps/atlas.osa"));

        let factory = StageFactory::new(
            PipelineConfig::default(),
            Overrides::default(),
            Path::new("/data/session"),
        );
        assert_eq!(
            factory.map_path(),
            Path::new("/data/session/demos/mapping/map_atlas.osa")
        );
    }

    #[test]
    fn test_single_unit_stages_use_one_worker() {
        assert_eq!(StageKind::CreateMap.default_workers(), 1);
        assert!(StageKind::BatchSlam.default_workers() >= 1);
        assert!(StageKind::DetectAruco.default_workers() >= StageKind::BatchSlam.default_workers());
    }
}

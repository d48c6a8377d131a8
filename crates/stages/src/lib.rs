//! UMI pipeline stages
//!
//! Each stage implements [`umi_batch_core::Stage`] for one step of turning a
//! session's raw GoPro videos into calibrated trajectories:
//!
//! | stage | units | output |
//! |---|---|---|
//! | [`ImuStage`] | `demos/*` | `imu_data.json` |
//! | [`MappingStage`] | `demos/mapping` | map atlas |
//! | [`BatchSlamStage`] | `demos/demo*`, `demos/map*` | `camera_trajectory.csv` |
//! | [`ArucoStage`] | `demos/*` | `tag_detection.pkl` |
//! | [`SlamTagStage`] | `demos/mapping` | `tx_slam_tag.json` |
//! | [`GripperRangeStage`] | `demos/gripper_calibration*` | `gripper_range.json` |

pub mod aruco;
pub mod calibration;
pub mod config;
pub mod imu;
pub mod layout;
pub mod media;
pub mod pipeline;
pub mod slam;
pub mod tools;

pub use aruco::ArucoStage;
pub use calibration::{GripperRangeStage, SlamTagStage};
pub use config::{default_config_path, load_config, PipelineConfig};
pub use imu::ImuStage;
pub use layout::SessionLayout;
pub use pipeline::{Overrides, StageFactory, StageKind};
pub use slam::{BatchSlamStage, MappingStage, SlamSettings};
pub use tools::{DockerImage, PythonScript};

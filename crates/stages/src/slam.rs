//! ORB-SLAM3 stages: building the map from the mapping video, and
//! localizing every demonstration against that map.

use crate::layout::{CAMERA_TRAJECTORY, IMU_DATA, MAPPING_TRAJECTORY, RAW_VIDEO, SLAM_MASK};
use crate::media;
use crate::tools::{self, DockerImage};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use umi_batch_core::{
    BatchError, JobDescriptor, Result, Sentinel, Stage, UnitPattern, WorkUnit,
};

/// Log file prefix shared by both SLAM stages
const SLAM_LOG: &str = "slam";

/// Paths inside the SLAM container
#[derive(Debug, Clone)]
pub struct SlamSettings {
    pub binary: String,
    pub vocabulary: String,
    pub settings: String,
}

impl SlamSettings {
    fn base_args(&self) -> Vec<OsString> {
        vec![
            self.binary.clone().into(),
            "--vocabulary".into(),
            self.vocabulary.clone().into(),
            "--setting".into(),
            self.settings.clone().into(),
            "--input_video".into(),
            "/data/raw_video.mp4".into(),
            "--input_imu_json".into(),
            "/data/imu_data.json".into(),
        ]
    }
}

/// Map atlas location split into the directory mounted at `/map` and the
/// file name inside it
#[derive(Debug, Clone)]
struct MapLocation {
    path: PathBuf,
    dir: PathBuf,
    container_path: String,
}

impl MapLocation {
    fn new(map_path: &Path) -> Result<Self> {
        let path = tools::absolute(map_path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                BatchError::Config(format!("invalid map path: {}", map_path.display()))
            })?
            .to_string();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| BatchError::Config(format!("invalid map path: {}", path.display())))?;
        Ok(Self {
            container_path: format!("/map/{}", file_name),
            dir,
            path,
        })
    }
}

/// Mask args, when masking is on and the unit has a mask image
fn mask_args(unit: &WorkUnit, use_mask: bool) -> Vec<OsString> {
    if !use_mask {
        return Vec::new();
    }
    if unit.input(SLAM_MASK).is_file() {
        vec!["--mask_img".into(), "/data/slam_mask.png".into()]
    } else {
        warn!("{}: no {}, running unmasked", unit.name(), SLAM_MASK);
        Vec::new()
    }
}

/// Builds the ORB-SLAM3 map atlas from `demos/mapping`.
///
/// The mapping directory itself is the single unit; it is done once the map
/// atlas exists.
#[derive(Debug, Clone)]
pub struct MappingStage {
    image: DockerImage,
    slam: SlamSettings,
    map: MapLocation,
    use_mask: bool,
}

impl MappingStage {
    pub fn new(image: DockerImage, slam: SlamSettings, map_path: &Path, use_mask: bool) -> Result<Self> {
        Ok(Self {
            image,
            slam,
            map: MapLocation::new(map_path)?,
            use_mask,
        })
    }

    pub fn map_path(&self) -> &Path {
        &self.map.path
    }
}

#[async_trait]
impl Stage for MappingStage {
    fn name(&self) -> &str {
        "create_map"
    }

    fn patterns(&self) -> Vec<UnitPattern> {
        vec![UnitPattern::Root]
    }

    fn required_inputs(&self) -> &[&str] {
        &[RAW_VIDEO, IMU_DATA]
    }

    fn sentinel(&self) -> Sentinel {
        Sentinel::Path(self.map.path.clone())
    }

    async fn preflight(&self) -> Result<()> {
        std::fs::create_dir_all(&self.map.dir)?;
        self.image.prepare().await
    }

    async fn build_job(&self, unit: &WorkUnit) -> Result<JobDescriptor> {
        JobDescriptor::for_unit(SLAM_LOG, unit, "docker")
            .args(self.image.run_args(&[(unit.dir(), "/data"), (self.map.dir.as_path(), "/map")]))
            .args(self.slam.base_args())
            .args([
                "--output_trajectory_csv".to_string(),
                format!("/data/{}", MAPPING_TRAJECTORY),
                "--save_map".to_string(),
                self.map.container_path.clone(),
            ])
            .args(mask_args(unit, self.use_mask))
            .build()
    }
}

/// Localizes every `demos/demo*` and `demos/map*` video against the map.
///
/// Each job gets a timeout of the video's duration times `timeout_multiple`;
/// a multiple of zero disables the timeout.
#[derive(Debug, Clone)]
pub struct BatchSlamStage {
    image: DockerImage,
    slam: SlamSettings,
    map: MapLocation,
    max_lost_frames: u32,
    timeout_multiple: f64,
    use_mask: bool,
}

impl BatchSlamStage {
    pub fn new(
        image: DockerImage,
        slam: SlamSettings,
        map_path: &Path,
        max_lost_frames: u32,
        timeout_multiple: f64,
        use_mask: bool,
    ) -> Result<Self> {
        if !timeout_multiple.is_finite() || timeout_multiple < 0.0 {
            return Err(BatchError::Config(format!(
                "timeout multiple must be a non-negative number, got {}",
                timeout_multiple
            )));
        }
        Ok(Self {
            image,
            slam,
            map: MapLocation::new(map_path)?,
            max_lost_frames,
            timeout_multiple,
            use_mask,
        })
    }

    async fn timeout_for(&self, unit: &WorkUnit) -> Result<Option<Duration>> {
        if self.timeout_multiple == 0.0 {
            return Ok(None);
        }
        let duration = media::video_duration(&unit.input(RAW_VIDEO))
            .await
            .map_err(|e| BatchError::Config(format!("{}: {}", unit.name(), e)))?;
        scaled_timeout(duration, self.timeout_multiple)
            .map(Some)
            .map_err(|e| BatchError::Config(format!("{}: {}", unit.name(), e)))
    }
}

/// Video duration times the timeout multiple, or an error when the product
/// does not fit in a `Duration`
fn scaled_timeout(duration: Duration, multiple: f64) -> std::result::Result<Duration, String> {
    Duration::try_from_secs_f64(duration.as_secs_f64() * multiple).map_err(|_| {
        format!(
            "timeout of {:.2}s x {} is out of range",
            duration.as_secs_f64(),
            multiple
        )
    })
}

#[async_trait]
impl Stage for BatchSlamStage {
    fn name(&self) -> &str {
        "batch_slam"
    }

    fn patterns(&self) -> Vec<UnitPattern> {
        vec![
            UnitPattern::child("demo*", RAW_VIDEO),
            UnitPattern::child("map*", RAW_VIDEO),
        ]
    }

    fn required_inputs(&self) -> &[&str] {
        &[RAW_VIDEO, IMU_DATA]
    }

    fn sentinel(&self) -> Sentinel {
        Sentinel::in_unit(CAMERA_TRAJECTORY)
    }

    async fn preflight(&self) -> Result<()> {
        tools::require_file(&self.map.path, "map atlas")?;
        if self.timeout_multiple > 0.0 {
            tools::require_program("ffprobe")?;
        }
        self.image.prepare().await
    }

    async fn build_job(&self, unit: &WorkUnit) -> Result<JobDescriptor> {
        let timeout = self.timeout_for(unit).await?;
        if let Some(t) = timeout {
            info!("{}: timeout {:.0}s", unit.name(), t.as_secs_f64());
        }

        JobDescriptor::for_unit(SLAM_LOG, unit, "docker")
            .args(self.image.run_args(&[(unit.dir(), "/data"), (self.map.dir.as_path(), "/map")]))
            .args(self.slam.base_args())
            .args([
                "--output_trajectory_csv".to_string(),
                format!("/data/{}", CAMERA_TRAJECTORY),
                "--load_map".to_string(),
                self.map.container_path.clone(),
            ])
            .args(mask_args(unit, self.use_mask))
            .args(["--max_lost_frames".to_string(), self.max_lost_frames.to_string()])
            .timeout(timeout)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings() -> SlamSettings {
        SlamSettings {
            binary: "/ORB_SLAM3/gopro_slam".to_string(),
            vocabulary: "/ORB_SLAM3/ORBvoc.txt".to_string(),
            settings: "/ORB_SLAM3/setting.yaml".to_string(),
        }
    }

    fn image() -> DockerImage {
        DockerImage::new("chicheng/orb_slam3:latest", false)
    }

    fn args(job: &JobDescriptor) -> Vec<String> {
        job.args().iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[tokio::test]
    async fn test_mapping_job_saves_map() {
        let tmp = TempDir::new().unwrap();
        let map_path = tmp.path().join("maps/map_atlas.osa");
        std::fs::create_dir_all(tmp.path().join("maps")).unwrap();
        let stage = MappingStage::new(image(), settings(), &map_path, true).unwrap();
        let unit = WorkUnit::new(tmp.path(), &[RAW_VIDEO, IMU_DATA]).unwrap();

        let job = stage.build_job(&unit).await.unwrap();
        let args = args(&job);
        let save = args.iter().position(|a| a == "--save_map").unwrap();
        assert_eq!(args[save + 1], "/map/map_atlas.osa");
        assert!(args.contains(&format!("{}:/map", tmp.path().join("maps").display())));
        assert!(args.contains(&"/data/mapping_camera_trajectory.csv".to_string()));
        // no mask file present
        assert!(!args.contains(&"--mask_img".to_string()));
        assert_eq!(job.stdout_path(), tmp.path().join("slam_stdout.txt"));
        assert_eq!(stage.sentinel(), Sentinel::Path(map_path));
    }

    #[tokio::test]
    async fn test_mask_used_when_present() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(SLAM_MASK), b"png").unwrap();
        let unit = WorkUnit::new(tmp.path(), &[]).unwrap();

        let masked = MappingStage::new(image(), settings(), &tmp.path().join("m.osa"), true).unwrap();
        let job = masked.build_job(&unit).await.unwrap();
        assert!(args(&job).contains(&"--mask_img".to_string()));

        let unmasked =
            MappingStage::new(image(), settings(), &tmp.path().join("m.osa"), false).unwrap();
        let job = unmasked.build_job(&unit).await.unwrap();
        assert!(!args(&job).contains(&"--mask_img".to_string()));
    }

    /// Log sink shared between the subscriber and the test
    #[derive(Clone, Default)]
    struct LogBuf(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_missing_mask_warns() {
        let tmp = TempDir::new().unwrap();
        let unit = WorkUnit::new(tmp.path(), &[]).unwrap();

        let buf = LogBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let args = tracing::subscriber::with_default(subscriber, || mask_args(&unit, true));

        assert!(args.is_empty());
        let logged = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("WARN"));
        assert!(logged.contains("running unmasked"));
    }

    #[tokio::test]
    async fn test_batch_slam_without_timeout() {
        let tmp = TempDir::new().unwrap();
        let map_path = tmp.path().join("map_atlas.osa");
        let stage =
            BatchSlamStage::new(image(), settings(), &map_path, 60, 0.0, false).unwrap();
        let unit = WorkUnit::new(tmp.path(), &[]).unwrap();

        let job = stage.build_job(&unit).await.unwrap();
        let args = args(&job);
        let load = args.iter().position(|a| a == "--load_map").unwrap();
        assert_eq!(args[load + 1], "/map/map_atlas.osa");
        assert_eq!(args[args.len() - 2..], ["--max_lost_frames", "60"]);
        assert!(args.contains(&"/data/camera_trajectory.csv".to_string()));
        assert!(job.timeout().is_none());
    }

    #[test]
    fn test_negative_timeout_multiple_rejected() {
        let result = BatchSlamStage::new(image(), settings(), Path::new("/m.osa"), 60, -1.0, false);
        assert!(matches!(result, Err(BatchError::Config(_))));
    }

    #[test]
    fn test_scaled_timeout() {
        assert_eq!(
            scaled_timeout(Duration::from_secs(30), 16.0).unwrap(),
            Duration::from_secs(480)
        );
        assert_eq!(
            scaled_timeout(Duration::from_millis(500), 0.5).unwrap(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_huge_timeout_multiple_is_config_error_not_panic() {
        // Finite multiples are accepted up front; the overflow only shows
        // once a real video duration is known
        assert!(
            BatchSlamStage::new(image(), settings(), Path::new("/m.osa"), 60, 1e300, false).is_ok()
        );
        let err = scaled_timeout(Duration::from_secs(30), 1e300).unwrap_err();
        assert!(err.contains("out of range"));
    }

    #[tokio::test]
    async fn test_missing_map_fails_preflight() {
        let tmp = TempDir::new().unwrap();
        let stage = BatchSlamStage::new(
            image(),
            settings(),
            &tmp.path().join("missing.osa"),
            60,
            16.0,
            false,
        )
        .unwrap();
        assert!(matches!(
            stage.preflight().await,
            Err(BatchError::Config(_))
        ));
    }

    #[test]
    fn test_patterns_cover_demos_and_mapping() {
        let stage =
            BatchSlamStage::new(image(), settings(), Path::new("/m.osa"), 60, 16.0, true).unwrap();
        assert_eq!(
            stage.patterns(),
            vec![
                UnitPattern::child("demo*", RAW_VIDEO),
                UnitPattern::child("map*", RAW_VIDEO),
            ]
        );
    }
}

//! External tool checks shared by the stages: docker images and python scripts

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;
use umi_batch_core::{BatchError, Result};

/// A docker image a stage runs its jobs in
#[derive(Debug, Clone)]
pub struct DockerImage {
    pub image: String,
    /// Pull the image before the batch starts
    pub pull: bool,
}

impl DockerImage {
    pub fn new(image: impl Into<String>, pull: bool) -> Self {
        Self {
            image: image.into(),
            pull,
        }
    }

    /// Check the docker daemon is reachable and optionally pull the image
    pub async fn prepare(&self) -> Result<()> {
        require_program("docker")?;

        let status = Command::new("docker")
            .arg("info")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(BatchError::ToolUnavailable(
                "docker daemon is not reachable (docker info failed)".to_string(),
            ));
        }

        if self.pull {
            info!("Pulling docker image {}", self.image);
            let status = Command::new("docker")
                .args(["pull", &self.image])
                .stdin(Stdio::null())
                .status()
                .await?;
            if !status.success() {
                return Err(BatchError::ToolUnavailable(format!(
                    "docker pull {} failed",
                    self.image
                )));
            }
        }
        Ok(())
    }

    /// `docker run --rm --volume host:container ... <image>`; the command to
    /// run inside the container is appended by the caller.
    pub fn run_args(&self, volumes: &[(&Path, &str)]) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["run".into(), "--rm".into()];
        for (host, container) in volumes {
            let mut spec = host.as_os_str().to_os_string();
            spec.push(":");
            spec.push(container);
            args.push("--volume".into());
            args.push(spec);
        }
        args.push(self.image.clone().into());
        args
    }
}

/// A python script run with a given interpreter
#[derive(Debug, Clone)]
pub struct PythonScript {
    pub interpreter: String,
    pub script: PathBuf,
}

impl PythonScript {
    pub fn new(interpreter: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
        }
    }

    pub fn check(&self) -> Result<()> {
        require_program(&self.interpreter)?;
        require_file(&self.script, "script")
    }
}

pub fn require_program(name: &str) -> Result<PathBuf> {
    which::which(name)
        .map_err(|e| BatchError::ToolUnavailable(format!("{} not found on PATH: {}", name, e)))
}

pub fn require_file(path: &Path, what: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(BatchError::Config(format!(
            "{} not found: {}",
            what,
            path.display()
        )))
    }
}

/// Make a configured path absolute against the current directory
pub fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args() {
        let image = DockerImage::new("chicheng/orb_slam3:latest", false);
        let args = image.run_args(&[
            (Path::new("/data/demos/demo_1"), "/data"),
            (Path::new("/data/demos/mapping"), "/map"),
        ]);
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "--volume",
                "/data/demos/demo_1:/data",
                "--volume",
                "/data/demos/mapping:/map",
                "chicheng/orb_slam3:latest",
            ]
        );
    }

    #[test]
    fn test_missing_program() {
        let result = require_program("definitely-not-installed-umi-tool");
        assert!(matches!(result, Err(BatchError::ToolUnavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_script_is_config_error() {
        let script = PythonScript::new("sh", "/nonexistent/detect_aruco.py");
        assert!(matches!(script.check(), Err(BatchError::Config(_))));
    }

    #[test]
    fn test_absolute_keeps_absolute() {
        assert_eq!(absolute(Path::new("/a/b")).unwrap(), PathBuf::from("/a/b"));
        assert!(absolute(Path::new("rel/c")).unwrap().is_absolute());
    }
}

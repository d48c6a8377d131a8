//! Job descriptors: the fully specified external invocation for one unit
//!
//! A [`JobDescriptor`] can only be obtained through [`JobDescriptorBuilder::build`],
//! which validates every field. Once built it is immutable.

use crate::error::{BatchError, Result};
use crate::unit::WorkUnit;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct JobDescriptor {
    unit: WorkUnit,
    program: OsString,
    args: Vec<OsString>,
    working_dir: PathBuf,
    stdout_path: PathBuf,
    stderr_path: PathBuf,
    timeout: Option<Duration>,
}

impl JobDescriptor {
    pub fn builder(unit: WorkUnit, program: impl Into<OsString>) -> JobDescriptorBuilder {
        JobDescriptorBuilder {
            working_dir: unit.dir().to_path_buf(),
            unit,
            program: program.into(),
            args: Vec::new(),
            stdout_path: None,
            stderr_path: None,
            timeout: None,
        }
    }

    /// Builder pre-filled with the conventional per-unit log files
    /// `<stage>_stdout.txt` and `<stage>_stderr.txt` inside the unit directory.
    pub fn for_unit(stage: &str, unit: &WorkUnit, program: impl Into<OsString>) -> JobDescriptorBuilder {
        let stdout = unit.input(&format!("{}_stdout.txt", stage));
        let stderr = unit.input(&format!("{}_stderr.txt", stage));
        Self::builder(unit.clone(), program)
            .stdout(stdout)
            .stderr(stderr)
    }

    pub fn unit(&self) -> &WorkUnit {
        &self.unit
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn stdout_path(&self) -> &Path {
        &self.stdout_path
    }

    pub fn stderr_path(&self) -> &Path {
        &self.stderr_path
    }

    /// Maximum wall-clock time, `None` means unlimited
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Command line rendered for logs
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct JobDescriptorBuilder {
    unit: WorkUnit,
    program: OsString,
    args: Vec<OsString>,
    working_dir: PathBuf,
    stdout_path: Option<PathBuf>,
    stderr_path: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl JobDescriptorBuilder {
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Defaults to the unit directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn stdout(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_path = Some(path.into());
        self
    }

    pub fn stderr(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr_path = Some(path.into());
        self
    }

    /// A zero duration is the same as no timeout
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn build(self) -> Result<JobDescriptor> {
        if self.program.is_empty() {
            return Err(invalid("program must not be empty"));
        }
        if has_nul(&self.program) {
            return Err(invalid("program contains a NUL byte"));
        }
        if let Some(pos) = self.args.iter().position(|a| has_nul(a)) {
            return Err(invalid(format!("argument {} contains a NUL byte", pos)));
        }

        if !self.working_dir.is_absolute() {
            return Err(invalid(format!(
                "working directory must be absolute: {}",
                self.working_dir.display()
            )));
        }
        if !self.working_dir.is_dir() {
            return Err(invalid(format!(
                "working directory does not exist: {}",
                self.working_dir.display()
            )));
        }

        let stdout_path = self
            .stdout_path
            .ok_or_else(|| invalid("stdout path not set"))?;
        let stderr_path = self
            .stderr_path
            .ok_or_else(|| invalid("stderr path not set"))?;
        check_log_path(&stdout_path)?;
        check_log_path(&stderr_path)?;
        if stdout_path == stderr_path {
            return Err(invalid(format!(
                "stdout and stderr must be separate files: {}",
                stdout_path.display()
            )));
        }

        Ok(JobDescriptor {
            unit: self.unit,
            program: self.program,
            args: self.args,
            working_dir: self.working_dir,
            stdout_path,
            stderr_path,
            timeout: self.timeout,
        })
    }
}

fn invalid(msg: impl Into<String>) -> BatchError {
    BatchError::InvalidDescriptor(msg.into())
}

fn has_nul(s: &OsStr) -> bool {
    s.as_encoded_bytes().contains(&0)
}

fn check_log_path(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(invalid(format!("log path must be absolute: {}", path.display())));
    }
    match path.parent() {
        Some(parent) if parent.is_dir() => Ok(()),
        _ => Err(invalid(format!(
            "log directory does not exist: {}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(tmp: &TempDir) -> WorkUnit {
        WorkUnit::new(tmp.path(), &[]).unwrap()
    }

    #[test]
    fn test_for_unit_uses_stage_log_names() {
        let tmp = TempDir::new().unwrap();
        let job = JobDescriptor::for_unit("slam", &unit(&tmp), "docker")
            .args(["run", "--rm"])
            .build()
            .unwrap();

        assert_eq!(job.stdout_path(), tmp.path().join("slam_stdout.txt"));
        assert_eq!(job.stderr_path(), tmp.path().join("slam_stderr.txt"));
        assert_eq!(job.working_dir(), tmp.path());
        assert_eq!(job.command_line(), "docker run --rm");
        assert!(job.timeout().is_none());
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let tmp = TempDir::new().unwrap();
        let job = JobDescriptor::for_unit("s", &unit(&tmp), "true")
            .timeout(Some(Duration::ZERO))
            .build()
            .unwrap();
        assert!(job.timeout().is_none());

        let job = JobDescriptor::for_unit("s", &unit(&tmp), "true")
            .timeout(Some(Duration::from_secs(3)))
            .build()
            .unwrap();
        assert_eq!(job.timeout(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_empty_program_rejected() {
        let tmp = TempDir::new().unwrap();
        let result = JobDescriptor::for_unit("s", &unit(&tmp), "").build();
        assert!(matches!(result, Err(BatchError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_nul_in_argument_rejected() {
        let tmp = TempDir::new().unwrap();
        let result = JobDescriptor::for_unit("s", &unit(&tmp), "echo")
            .arg("ok")
            .arg("bad\0arg")
            .build();
        match result {
            Err(BatchError::InvalidDescriptor(msg)) => assert!(msg.contains("argument 1")),
            other => panic!("expected InvalidDescriptor, got {:?}", other),
        }
    }

    #[test]
    fn test_relative_working_dir_rejected() {
        let tmp = TempDir::new().unwrap();
        let result = JobDescriptor::for_unit("s", &unit(&tmp), "true")
            .working_dir("relative/dir")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_log_directory_rejected() {
        let tmp = TempDir::new().unwrap();
        let result = JobDescriptor::builder(unit(&tmp), "true")
            .stdout(tmp.path().join("missing/out.txt"))
            .stderr(tmp.path().join("err.txt"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_shared_log_file_rejected() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("log.txt");
        let result = JobDescriptor::builder(unit(&tmp), "true")
            .stdout(&log)
            .stderr(&log)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_requires_log_paths() {
        let tmp = TempDir::new().unwrap();
        let result = JobDescriptor::builder(unit(&tmp), "true").build();
        assert!(result.is_err());
    }
}

//! Terminal job outcomes

use crate::unit::WorkUnit;
use serde::Serialize;
use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

/// How a job ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The process exited on its own. Zero is success, anything else is an
    /// execution failure; the value is not interpreted further.
    Completed { exit_code: i32 },

    /// The process ran past its timeout and was killed
    TimedOut {
        #[serde(with = "duration_secs")]
        limit: Duration,
    },

    /// The process could not be started
    LaunchFailed { reason: String },

    /// The process was killed because the batch was aborted
    Aborted,
}

impl OutcomeKind {
    pub fn from_exit_status(status: ExitStatus) -> Self {
        Self::Completed {
            exit_code: exit_code(status),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { exit_code: 0 })
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { exit_code: 0 } => write!(f, "completed"),
            Self::Completed { exit_code } => write!(f, "exited with code {}", exit_code),
            Self::TimedOut { limit } => write!(f, "timed out after {:.1}s", limit.as_secs_f64()),
            Self::LaunchFailed { reason } => write!(f, "failed to launch: {}", reason),
            Self::Aborted => write!(f, "killed on abort"),
        }
    }
}

/// Terminal result of one job, created once and never mutated
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub unit: WorkUnit,
    #[serde(flatten)]
    pub kind: OutcomeKind,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl JobOutcome {
    pub fn new(unit: WorkUnit, kind: OutcomeKind, elapsed: Duration) -> Self {
        Self { unit, kind, elapsed }
    }

    pub fn is_success(&self) -> bool {
        self.kind.is_success()
    }
}

/// Exit code of a finished process. On Unix a process killed by a signal
/// has no code and is reported as `128 + signal`, as shells do.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

pub(crate) mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_exit_zero_is_success() {
        assert!(OutcomeKind::Completed { exit_code: 0 }.is_success());
        assert!(!OutcomeKind::Completed { exit_code: 7 }.is_success());
        assert!(!OutcomeKind::TimedOut { limit: Duration::from_secs(2) }.is_success());
        assert!(!OutcomeKind::LaunchFailed { reason: "nope".into() }.is_success());
        assert!(!OutcomeKind::Aborted.is_success());
    }

    #[test]
    fn test_display() {
        assert_eq!(OutcomeKind::Completed { exit_code: 7 }.to_string(), "exited with code 7");
        assert_eq!(
            OutcomeKind::TimedOut { limit: Duration::from_millis(2500) }.to_string(),
            "timed out after 2.5s"
        );
    }

    #[test]
    fn test_serialized_shape() {
        let unit = WorkUnit::new("/data/demos/demo_1", &[]).unwrap();
        let outcome = JobOutcome::new(
            unit,
            OutcomeKind::Completed { exit_code: 3 },
            Duration::from_millis(1500),
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["exit_code"], 3);
        assert_eq!(json["elapsed"], 1.5);
        assert_eq!(json["unit"]["dir"], "/data/demos/demo_1");
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_maps_to_128_plus() {
        use std::os::unix::process::ExitStatusExt;
        let status = ExitStatus::from_raw(libc::SIGKILL);
        assert_eq!(exit_code(status), 128 + libc::SIGKILL);
    }
}

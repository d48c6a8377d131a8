//! Runs a single job descriptor as an external process

use crate::cancel::CancelToken;
use crate::descriptor::JobDescriptor;
use crate::outcome::{JobOutcome, OutcomeKind};
use std::fs::File;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Run `job` to a terminal state.
///
/// Never returns an error: launch problems become [`OutcomeKind::LaunchFailed`].
/// When the job exceeds its timeout, or `abort` is aborted while it runs, its
/// whole process group is killed and reaped before this returns.
pub async fn run_job(job: &JobDescriptor, abort: &CancelToken) -> JobOutcome {
    let start = Instant::now();
    let kind = execute(job, abort).await;
    JobOutcome::new(job.unit().clone(), kind, start.elapsed())
}

enum Ended {
    Exited(io::Result<ExitStatus>),
    TimedOut(Duration),
    Aborted,
}

async fn wait_with_limit(child: &mut Child, limit: Option<Duration>) -> Ended {
    match limit {
        None => Ended::Exited(child.wait().await),
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Ended::Exited(status),
            Err(_) => Ended::TimedOut(limit),
        },
    }
}

async fn execute(job: &JobDescriptor, abort: &CancelToken) -> OutcomeKind {
    let name = job.unit().name();

    let stdout = match File::create(job.stdout_path()) {
        Ok(f) => f,
        Err(e) => return launch_failed(format!(
            "cannot create {}: {}",
            job.stdout_path().display(),
            e
        )),
    };
    let stderr = match File::create(job.stderr_path()) {
        Ok(f) => f,
        Err(e) => return launch_failed(format!(
            "cannot create {}: {}",
            job.stderr_path().display(),
            e
        )),
    };

    let mut cmd = Command::new(job.program());
    cmd.args(job.args())
        .current_dir(job.working_dir())
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);
    // Own process group, so a timeout kill also reaches grandchildren
    #[cfg(unix)]
    cmd.process_group(0);

    debug!("{}: {}", name, job.command_line());
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return launch_failed(format!(
                "failed to spawn {}: {}",
                job.program().to_string_lossy(),
                e
            ))
        }
    };

    let ended = tokio::select! {
        biased;
        _ = abort.aborted() => Ended::Aborted,
        ended = wait_with_limit(&mut child, job.timeout()) => ended,
    };

    match ended {
        Ended::Exited(Ok(status)) => OutcomeKind::from_exit_status(status),
        Ended::Exited(Err(e)) => launch_failed(format!("failed to wait for process: {}", e)),
        Ended::TimedOut(limit) => {
            warn!("{}: exceeded {:.1}s, killing", name, limit.as_secs_f64());
            kill_hard(&mut child).await;
            OutcomeKind::TimedOut { limit }
        }
        Ended::Aborted => {
            warn!("{}: aborted, killing", name);
            kill_hard(&mut child).await;
            OutcomeKind::Aborted
        }
    }
}

fn launch_failed(reason: String) -> OutcomeKind {
    OutcomeKind::LaunchFailed { reason }
}

/// SIGKILL the child's process group, then reap the child
async fn kill_hard(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: killpg has no memory-safety preconditions. The group id is
        // the pid of a child we have not reaped yet, so it cannot be reused.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            debug!(
                "killpg({}) failed: {}",
                pid,
                std::io::Error::last_os_error()
            );
        }
    }

    if let Err(e) = child.start_kill() {
        debug!("start_kill failed: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("failed to reap killed process: {}", e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::unit::WorkUnit;
    use tempfile::TempDir;

    fn sh(tmp: &TempDir, script: &str, timeout: Option<Duration>) -> JobDescriptor {
        let unit = WorkUnit::new(tmp.path(), &[]).unwrap();
        JobDescriptor::for_unit("test", &unit, "sh")
            .args(["-c", script])
            .timeout(timeout)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_exit_codes_pass_through() {
        let tmp = TempDir::new().unwrap();
        let outcome = run_job(&sh(&tmp, "exit 0", None), &CancelToken::new()).await;
        assert_eq!(outcome.kind, OutcomeKind::Completed { exit_code: 0 });

        let outcome = run_job(&sh(&tmp, "exit 7", None), &CancelToken::new()).await;
        assert_eq!(outcome.kind, OutcomeKind::Completed { exit_code: 7 });
    }

    #[tokio::test]
    async fn test_output_goes_to_log_files() {
        let tmp = TempDir::new().unwrap();
        let outcome = run_job(&sh(&tmp, "echo out; echo err >&2", None), &CancelToken::new()).await;
        assert!(outcome.is_success());

        let out = std::fs::read_to_string(tmp.path().join("test_stdout.txt")).unwrap();
        let err = std::fs::read_to_string(tmp.path().join("test_stderr.txt")).unwrap();
        assert_eq!(out, "out\n");
        assert_eq!(err, "err\n");
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let tmp = TempDir::new().unwrap();
        run_job(&sh(&tmp, "pwd", None), &CancelToken::new()).await;
        let out = std::fs::read_to_string(tmp.path().join("test_stdout.txt")).unwrap();
        let expected = std::fs::canonicalize(tmp.path()).unwrap();
        assert_eq!(std::fs::canonicalize(out.trim()).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_failure() {
        let tmp = TempDir::new().unwrap();
        let unit = WorkUnit::new(tmp.path(), &[]).unwrap();
        let job = JobDescriptor::for_unit("test", &unit, "/nonexistent/definitely-not-a-tool")
            .build()
            .unwrap();
        let outcome = run_job(&job, &CancelToken::new()).await;
        assert!(matches!(outcome.kind, OutcomeKind::LaunchFailed { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_process_group() {
        let tmp = TempDir::new().unwrap();
        // The backgrounded sleep is a grandchild; it must die with the group
        let job = sh(
            &tmp,
            "sleep 10 & echo $! > bg.pid; wait",
            Some(Duration::from_millis(500)),
        );
        let outcome = run_job(&job, &CancelToken::new()).await;
        assert_eq!(
            outcome.kind,
            OutcomeKind::TimedOut { limit: Duration::from_millis(500) }
        );
        assert!(outcome.elapsed < Duration::from_secs(5));

        let pid: i32 = std::fs::read_to_string(tmp.path().join("bg.pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut alive = true;
        for _ in 0..50 {
            if !is_running(pid) {
                alive = false;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!alive, "background sleep {} survived the timeout", pid);
    }

    #[tokio::test]
    async fn test_abort_kills_job_without_timeout() {
        let tmp = TempDir::new().unwrap();
        let job = sh(&tmp, "echo $$ > pid.txt; exec sleep 30", None);
        let abort = CancelToken::new();
        let trigger = {
            let abort = abort.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                abort.abort();
            })
        };

        let outcome = run_job(&job, &abort).await;
        trigger.await.unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Aborted);
        assert!(outcome.elapsed < Duration::from_secs(5));

        let pid: i32 = std::fs::read_to_string(tmp.path().join("pid.txt"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(!is_running(pid), "aborted sleep {} still running", pid);
    }

    #[tokio::test]
    async fn test_plain_cancel_lets_job_finish() {
        let tmp = TempDir::new().unwrap();
        let abort = CancelToken::new();
        abort.cancel();
        let outcome = run_job(&sh(&tmp, "sleep 0.1; exit 3", None), &abort).await;
        assert_eq!(outcome.kind, OutcomeKind::Completed { exit_code: 3 });
    }

    /// A killed orphan may linger as a zombie until init reaps it
    fn is_running(pid: i32) -> bool {
        // SAFETY: signal 0 only checks for existence
        if unsafe { libc::kill(pid, 0) } != 0 {
            return false;
        }
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                .unwrap_or(true),
            Err(_) => true,
        }
    }
}

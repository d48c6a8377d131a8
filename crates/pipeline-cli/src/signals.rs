//! Interrupt handling for a running pipeline
//!
//! The first Ctrl-C cancels: no new jobs start and the running ones are left
//! to finish. A second Ctrl-C, or SIGTERM at any point, aborts: the running
//! jobs' process groups are killed.

use tokio::task::JoinHandle;
use tracing::warn;
use umi_batch_core::CancelToken;

/// Watch for interrupts until aborted. Abort the returned handle once the
/// pipeline is done.
pub fn spawn_handler(cancel: CancelToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut term = Terminate::new();

        tokio::select! {
            _ = interrupt() => {
                warn!("Interrupted, waiting for running jobs to finish (Ctrl-C again to kill them)");
                cancel.cancel();
            }
            _ = term.recv() => {
                warn!("Terminated, killing running jobs");
                cancel.abort();
                return;
            }
        }

        tokio::select! {
            _ = interrupt() => warn!("Interrupted again, killing running jobs"),
            _ = term.recv() => warn!("Terminated, killing running jobs"),
        }
        cancel.abort();
    })
}

async fn interrupt() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// SIGTERM listener, registered once so no signal is lost between waits
#[cfg(unix)]
struct Terminate(Option<tokio::signal::unix::Signal>);

#[cfg(unix)]
impl Terminate {
    fn new() -> Self {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(sig) => Self(Some(sig)),
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                Self(None)
            }
        }
    }

    async fn recv(&mut self) {
        if let Some(sig) = self.0.as_mut() {
            if sig.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

#[cfg(not(unix))]
struct Terminate;

#[cfg(not(unix))]
impl Terminate {
    fn new() -> Self {
        Self
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await
    }
}

//! Caller-requested cancellation of a batch
//!
//! Two levels. Cancelling stops admission and lets running jobs finish (or
//! time out) on their own. Aborting also kills every running job's process
//! group; an abort implies a cancel.

use std::sync::Arc;
use tokio::sync::watch;

const RUNNING: u8 = 0;
const CANCELLED: u8 = 1;
const ABORTED: u8 = 2;

/// Cloneable cancellation flag, shared by the scheduler and every job
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<u8>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RUNNING);
        Self { tx: Arc::new(tx) }
    }

    /// Stop admitting jobs
    pub fn cancel(&self) {
        self.raise(CANCELLED);
    }

    /// Stop admitting jobs and kill the running ones
    pub fn abort(&self) {
        self.raise(ABORTED);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow() >= CANCELLED
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow() >= ABORTED
    }

    /// Resolves once [`cancel`](Self::cancel) or [`abort`](Self::abort) has
    /// been called
    pub async fn cancelled(&self) {
        self.reached(CANCELLED).await
    }

    /// Resolves once [`abort`](Self::abort) has been called
    pub async fn aborted(&self) {
        self.reached(ABORTED).await
    }

    fn raise(&self, level: u8) {
        // Levels only go up
        self.tx.send_if_modified(|current| {
            if *current < level {
                *current = level;
                true
            } else {
                false
            }
        });
    }

    async fn reached(&self, level: u8) {
        let mut rx = self.tx.subscribe();
        // Sender lives in self, so wait_for cannot fail while we hold it
        let _ = rx.wait_for(|current| *current >= level).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
        assert!(!other.is_aborted());
    }

    #[test]
    fn test_abort_implies_cancel_and_never_downgrades() {
        let token = CancelToken::new();
        token.abort();
        assert!(token.is_cancelled());
        assert!(token.is_aborted());

        token.cancel();
        assert!(token.is_aborted());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
    }

    #[tokio::test]
    async fn test_aborted_waits_past_plain_cancel() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.aborted().await })
        };
        token.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        token.abort();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_is_immediate_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }
}

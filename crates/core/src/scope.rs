//! Deadline-bounded cancellation scope for a single job.
//!
//! An [`ExecutionScope`] wraps a [`CancellationToken`] and remembers why it
//! was canceled. An explicit request and the deadline timer go through the
//! same token, so every supervised process, input wait and throttle bound to
//! the scope reacts identically. The first reason recorded wins.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Someone asked for the job to stop.
    Requested,
    /// The per-job deadline elapsed.
    DeadlineExceeded,
}

#[derive(Debug, Clone)]
pub struct ExecutionScope {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
    deadline: Duration,
}

impl ExecutionScope {
    /// Create a scope as a child of `parent` that cancels itself once
    /// `deadline` has elapsed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_deadline(parent: &CancellationToken, deadline: Duration) -> Self {
        let scope = Self {
            token: parent.child_token(),
            reason: Arc::new(OnceLock::new()),
            deadline,
        };

        let timer = scope.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.token.cancelled() => {}
                _ = tokio::time::sleep(timer.deadline) => {
                    let _ = timer.reason.set(CancelReason::DeadlineExceeded);
                    timer.token.cancel();
                }
            }
        });

        scope
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        let _ = self.reason.set(CancelReason::Requested);
        self.token.cancel();
    }

    /// Release the scope after the job has finished. Stops the deadline timer
    /// and any watcher still bound to the token without recording a reason.
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Why the scope was canceled. `None` while it is live, or when it was
    /// only closed or canceled through its parent.
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_with_reason() {
        let root = CancellationToken::new();
        let scope = ExecutionScope::with_deadline(&root, Duration::from_secs(300));

        scope.cancelled().await;

        assert_eq!(scope.reason(), Some(CancelReason::DeadlineExceeded));
        assert!(!root.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_cancel_wins_over_later_deadline() {
        let root = CancellationToken::new();
        let scope = ExecutionScope::with_deadline(&root, Duration::from_secs(1));

        scope.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(scope.reason(), Some(CancelReason::Requested));
    }

    #[tokio::test]
    async fn close_records_no_reason() {
        let root = CancellationToken::new();
        let scope = ExecutionScope::with_deadline(&root, Duration::from_secs(60));

        scope.close();

        assert!(scope.is_cancelled());
        assert_eq!(scope.reason(), None);
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_scope() {
        let root = CancellationToken::new();
        let scope = ExecutionScope::with_deadline(&root, Duration::from_secs(60));

        root.cancel();

        assert!(scope.is_cancelled());
        assert_eq!(scope.reason(), None);
    }
}

//! Rate limiting of progress updates.
//!
//! An update is delivered immediately when at least one interval has passed
//! since the previous delivery. Otherwise it is held as pending, replacing any
//! older pending update, and flushed one interval after the latest deferred
//! update unless a newer update is delivered first.

use std::time::Duration;

use audiobot_core::progress::Progress;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::status::StatusMessage;

#[derive(Debug, Clone, Copy)]
pub struct ProgressThrottle {
    interval: Duration,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Forward progress from `rx` to `status` until the channel closes or
    /// `scope` is canceled. Nothing is delivered once `scope` is canceled.
    pub async fn run(
        &self,
        status: &mut StatusMessage,
        mut rx: mpsc::Receiver<Progress>,
        scope: &CancellationToken,
    ) {
        let flush = tokio::time::sleep(self.interval);
        tokio::pin!(flush);
        let mut pending: Option<Progress> = None;

        loop {
            tokio::select! {
                biased;

                _ = scope.cancelled() => break,

                _ = &mut flush, if pending.is_some() => {
                    if let Some(progress) = pending.take() {
                        status.progress(&progress).await;
                    }
                }

                event = rx.recv() => {
                    let Some(progress) = event else { break };
                    if self.is_due(status) {
                        pending = None;
                        status.progress(&progress).await;
                    } else {
                        pending = Some(progress);
                        flush.as_mut().reset(Instant::now() + self.interval);
                    }
                }
            }
        }
    }

    fn is_due(&self, status: &StatusMessage) -> bool {
        match status.since_last_progress() {
            Some(elapsed) => elapsed >= self.interval,
            None => true,
        }
    }
}

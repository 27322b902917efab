//! The single status message each job keeps up to date.

use std::sync::Arc;
use std::time::Duration;

use audiobot_core::progress::Progress;
use audiobot_core::types::MessageRef;
use tokio::time::Instant;

use crate::sink::{SinkError, StatusSink};

/// A job's status message: created lazily, then edited in place.
///
/// Edits that would not change the text are skipped. When the transport
/// reports a rate limit, the caller is held for the requested duration.
pub struct StatusMessage {
    sink: Arc<dyn StatusSink>,
    reply_to: MessageRef,
    current: Option<MessageRef>,
    last_text: Option<String>,
    params_summary: String,
    last_progress_at: Option<Instant>,
}

impl StatusMessage {
    pub fn new(
        sink: Arc<dyn StatusSink>,
        reply_to: MessageRef,
        current: Option<MessageRef>,
        params_summary: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            reply_to,
            current,
            last_text: None,
            params_summary: params_summary.into(),
            last_progress_at: None,
        }
    }

    /// The message currently showing the status, if one was created.
    pub fn message(&self) -> Option<MessageRef> {
        self.current
    }

    /// Show `text` as is.
    pub async fn set(&mut self, text: &str) {
        if let Err(e) = self.send(text).await {
            self.back_off(&e).await;
        }
    }

    /// Show `text` followed by the parameter summary.
    pub async fn set_with_params(&mut self, text: &str) {
        let text = self.with_params(text);
        self.set(&text).await;
    }

    /// Show a terminal status as is. A rate-limited attempt is retried once
    /// after the requested wait.
    pub async fn finalize(&mut self, text: &str) {
        if let Err(e) = self.send(text).await {
            if self.back_off(&e).await {
                if let Err(e) = self.send(text).await {
                    tracing::error!(error = %e, "Final status update lost");
                }
            }
        }
    }

    /// Deliver a progress update now.
    pub async fn progress(&mut self, progress: &Progress) {
        self.last_progress_at = Some(Instant::now());
        let text = progress.render(&self.params_summary);
        self.set(&text).await;
    }

    /// The message replies currently attach to.
    pub fn reply_target(&self) -> MessageRef {
        self.reply_to
    }

    /// Time since the last progress update, `None` before the first one.
    pub fn since_last_progress(&self) -> Option<Duration> {
        self.last_progress_at.map(|at| at.elapsed())
    }

    /// Attach further status replies to `reply_to` in a fresh message.
    pub fn retarget(&mut self, reply_to: MessageRef) {
        self.reply_to = reply_to;
        self.current = None;
        self.last_text = None;
    }

    /// `text` followed by the parameter summary on its own line.
    pub fn with_params(&self, text: &str) -> String {
        if self.params_summary.is_empty() {
            text.to_string()
        } else {
            format!("{text}\n{}", self.params_summary)
        }
    }

    async fn send(&mut self, text: &str) -> Result<(), SinkError> {
        if self.last_text.as_deref() == Some(text) {
            return Ok(());
        }
        let message = self
            .sink
            .send_or_edit(self.reply_to, self.current, text)
            .await?;
        self.current = Some(message);
        self.last_text = Some(text.to_string());
        Ok(())
    }

    /// Wait out a rate limit. Returns whether the error carried a hint.
    async fn back_off(&self, error: &SinkError) -> bool {
        match error.retry_after() {
            Some(wait) => {
                tracing::warn!(wait_secs = wait.as_secs(), "Status update rate limited");
                tokio::time::sleep(wait).await;
                true
            }
            None => {
                tracing::warn!(error = %error, "Status update failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    fn reply_to() -> MessageRef {
        MessageRef {
            chat_id: 1,
            message_id: 10,
        }
    }

    #[tokio::test]
    async fn first_send_creates_then_edits() {
        let sink = Arc::new(RecordingSink::default());
        let mut status = StatusMessage::new(sink.clone(), reply_to(), None, "");

        status.set("one").await;
        status.set("two").await;

        let calls = sink.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].existing, None);
        assert_eq!(calls[1].existing, status.message());
        assert_eq!(calls[1].text, "two");
    }

    #[tokio::test]
    async fn unchanged_text_is_not_resent() {
        let sink = Arc::new(RecordingSink::default());
        let mut status = StatusMessage::new(sink.clone(), reply_to(), None, "🗣️ vits");

        status.set_with_params("✅ Done").await;
        let done = status.with_params("✅ Done");
        status.finalize(&done).await;

        assert_eq!(sink.texts(), vec!["✅ Done\n🗣️ vits"]);
    }

    #[tokio::test(start_paused = true)]
    async fn finalize_retries_once_after_rate_limit() {
        let sink = Arc::new(RecordingSink::default());
        sink.rate_limit_next(Duration::from_secs(4));
        let mut status = StatusMessage::new(sink.clone(), reply_to(), None, "");

        let started = Instant::now();
        status.finalize("❌ Canceled").await;

        assert!(started.elapsed() >= Duration::from_secs(4));
        assert_eq!(sink.texts(), vec!["❌ Canceled"]);
    }

    #[tokio::test]
    async fn retarget_starts_a_new_message() {
        let sink = Arc::new(RecordingSink::default());
        let mut status = StatusMessage::new(sink.clone(), reply_to(), None, "");
        status.set("downloading").await;

        let input = MessageRef {
            chat_id: 1,
            message_id: 11,
        };
        status.retarget(input);
        status.set("processing").await;

        let calls = sink.calls();
        assert_eq!(calls[1].reply_to, input);
        assert_eq!(calls[1].existing, None);
    }
}

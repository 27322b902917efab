//! In-memory transport used by unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use audiobot_core::types::MessageRef;
use tokio::time::Instant;

use crate::sink::{SinkError, StatusSink};

#[derive(Debug, Clone)]
pub(crate) struct SentStatus {
    pub reply_to: MessageRef,
    pub existing: Option<MessageRef>,
    pub text: String,
    pub at: Instant,
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    calls: Mutex<Vec<SentStatus>>,
    rate_limit: Mutex<Option<Duration>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<SentStatus> {
        self.calls.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.text).collect()
    }

    /// Fail the next call with a rate limit asking for `wait`.
    pub fn rate_limit_next(&self, wait: Duration) {
        *self.rate_limit.lock().unwrap() = Some(wait);
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn send_or_edit(
        &self,
        reply_to: MessageRef,
        existing: Option<MessageRef>,
        text: &str,
    ) -> Result<MessageRef, SinkError> {
        if let Some(retry_after) = self.rate_limit.lock().unwrap().take() {
            return Err(SinkError::RateLimited { retry_after });
        }
        let mut calls = self.calls.lock().unwrap();
        let message = existing.unwrap_or(MessageRef {
            chat_id: reply_to.chat_id,
            message_id: 1000 + calls.len() as i64,
        });
        calls.push(SentStatus {
            reply_to,
            existing,
            text: text.to_string(),
            at: Instant::now(),
        });
        Ok(message)
    }
}

//! Transport boundary: where status texts and artifacts go.
//!
//! The queue only talks to a messaging transport through [`StatusSink`] and
//! [`ArtifactSink`]. A rate-limited transport reports
//! [`SinkError::RateLimited`]; other transports can embed a
//! `{"retry_after":N}` body in their error text instead.

use std::time::Duration;

use async_trait::async_trait;
use audiobot_core::convert::AudioFormat;
use audiobot_core::process::ProcessError;
use audiobot_core::retry::parse_retry_after;
use audiobot_core::types::MessageRef;
use tokio::io::AsyncRead;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("too many requests, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("conversion failed: {0}")]
    Conversion(#[from] ProcessError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("delivery canceled")]
    Canceled,
}

impl SinkError {
    /// How long the transport asked us to wait, if it did.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            Self::Conversion(_) | Self::Canceled => None,
            other => parse_retry_after(&other.to_string()),
        }
    }
}

/// One converted file being streamed to the recipient.
pub struct DeliveryFile<'a> {
    pub filename: &'a str,
    pub format: AudioFormat,
    pub reader: &'a mut (dyn AsyncRead + Send + Unpin),
}

/// Creates and edits the status message of a job.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Post `text` as a reply to `reply_to` when `existing` is `None`,
    /// otherwise replace the text of `existing`. Returns the message now
    /// showing `text`.
    async fn send_or_edit(
        &self,
        reply_to: MessageRef,
        existing: Option<MessageRef>,
        text: &str,
    ) -> Result<MessageRef, SinkError>;
}

/// Uploads finished artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Stream every file to the conversation of `reply_to`. A single file is
    /// sent as a voice message if it is Opus; several files go as one group.
    async fn deliver(
        &self,
        reply_to: MessageRef,
        files: &mut [DeliveryFile<'_>],
    ) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_variant_carries_hint() {
        let err = SinkError::RateLimited {
            retry_after: Duration::from_secs(3),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(err.to_string(), "too many requests, retry after 3s");
    }

    #[test]
    fn hint_parsed_from_transport_text() {
        let err = SinkError::Transport(r#"Bad Request {"retry_after":9}"#.to_string());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(9)));
        assert_eq!(SinkError::Transport("boom".to_string()).retry_after(), None);
    }
}

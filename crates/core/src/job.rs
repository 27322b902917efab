//! Job execution interface shared by the queue and the tool adapters.
//!
//! Defines [`JobExecutor`], the seam between the worker's queue and the
//! tool pipeline, along with the job description, input media, result
//! artifacts and the error taxonomy surfaced to users.

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::convert::AudioFormat;
use crate::params::JobParams;
use crate::process::ProcessError;
use crate::progress::ProgressReporter;
use crate::types::{MessageRef, TaskId};

/// What to run: the task identity, the free-text prompt and typed params.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub task_id: TaskId,
    pub prompt: String,
    pub params: JobParams,
}

/// Media supplied by the originator while the job waits for input.
#[derive(Debug, Clone)]
pub struct InputMedia {
    pub data: Vec<u8>,
    pub filename: String,
    /// Message carrying the media; later status replies attach to it.
    pub message: Option<MessageRef>,
}

/// A produced audio file to convert and deliver.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub path: PathBuf,
    /// File name shown to the recipient, including extension.
    pub filename: String,
    pub format: AudioFormat,
}

/// Result of a successful job.
#[derive(Debug)]
pub enum Artifact {
    /// Audio files, converted on the fly during delivery. The staging
    /// directory holding them is removed when the artifact is dropped.
    Media {
        files: Vec<MediaFile>,
        staging: Option<TempDir>,
    },
    /// Text delivered as the final status (transcripts).
    Text(String),
    /// The job had side effects only; the note is appended to the done status.
    Notice(String),
}

impl Artifact {
    pub fn media(files: Vec<MediaFile>, staging: TempDir) -> Self {
        Self::Media {
            files,
            staging: Some(staging),
        }
    }
}

/// Errors a job can end with. The queue renders them into the final status.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("timed out waiting for input")]
    InputTimeout,

    #[error("got no audio data")]
    EmptyInput,

    #[error("timed out after {}s", .0.as_secs())]
    DeadlineExceeded(Duration),

    #[error("canceled")]
    Canceled,

    #[error("{stage} error: {source}")]
    Tool {
        stage: &'static str,
        #[source]
        source: ProcessError,
    },

    #[error("output file not found: {0}")]
    MissingOutput(String),

    #[error("{0}")]
    Rejected(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("upload failed: {0}")]
    Delivery(String),
}

impl JobError {
    /// Wrap a supervisor error, mapping cancellation to [`JobError::Canceled`].
    pub fn tool(stage: &'static str, source: ProcessError) -> Self {
        if source.is_canceled() {
            Self::Canceled
        } else {
            Self::Tool { stage, source }
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Runs one job to completion.
///
/// Implementations must observe `scope`: once it is canceled they stop
/// their tools (the supervisor does this when given the same token) and
/// return [`JobError::Canceled`].
pub trait JobExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        scope: &CancellationToken,
        job: &JobSpec,
        input: Option<InputMedia>,
        progress: ProgressReporter,
    ) -> impl std::future::Future<Output = Result<Artifact, JobError>> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

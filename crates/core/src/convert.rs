//! Streamed audio conversion through ffmpeg.
//!
//! The converted bytes are never buffered in full: ffmpeg writes to its
//! stdout and the caller reads from a [`ConvertedStream`] while the
//! conversion is still running. The ffmpeg process is supervised like any
//! other tool, so canceling the job scope kills it.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::ChildStdout;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::process::{self, ProcessError, SupervisedChild, ToolCommand};

/// Target container and codec of a converted artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// MP3 at 320 kbit/s, for multi-file results.
    Mp3,
    /// Ogg/Opus at 256 kbit/s VBR, delivered as a voice message.
    Opus,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Opus => "ogg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Opus => "audio/ogg",
        }
    }

    fn codec_args(self) -> &'static [&'static str] {
        match self {
            Self::Mp3 => &["-f", "mp3", "-c:a", "mp3", "-b:a", "320k"],
            Self::Opus => &[
                "-f",
                "ogg",
                "-c:a",
                "libopus",
                "-b:a",
                "256k",
                "-vbr",
                "on",
                "-compression_level",
                "10",
            ],
        }
    }
}

/// Builds supervised ffmpeg conversions.
#[derive(Debug, Clone)]
pub struct Converter {
    ffmpeg: PathBuf,
}

impl Converter {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// The ffmpeg invocation converting `input` to `format` on stdout.
    pub fn command(&self, input: &Path, format: AudioFormat) -> ToolCommand {
        ToolCommand::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(input)
            .args(format.codec_args().iter().copied())
            .arg("pipe:1")
    }

    /// Start converting `input`; the result is read from the returned stream.
    pub fn convert(
        &self,
        scope: &CancellationToken,
        input: &Path,
        format: AudioFormat,
    ) -> Result<ConvertedStream, ProcessError> {
        let mut child = process::spawn(scope, &self.command(input, format))?;

        let stdout = child.take_stdout().ok_or_else(|| {
            ProcessError::Io(std::io::Error::other("ffmpeg stdout was not captured"))
        })?;
        let stderr = child.take_stderr();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = tokio::io::AsyncReadExt::read_to_end(&mut stderr, &mut buf).await;
            }
            buf
        });

        tracing::debug!(input = %input.display(), format = format.extension(), "Started conversion");

        Ok(ConvertedStream {
            child,
            stdout,
            stderr_task,
            scope: scope.clone(),
        })
    }
}

/// Converted audio, readable while ffmpeg is still running.
///
/// Read to the end, then call [`finish`](Self::finish) to reap ffmpeg and
/// learn whether the conversion succeeded.
#[derive(Debug)]
pub struct ConvertedStream {
    child: SupervisedChild,
    stdout: ChildStdout,
    stderr_task: JoinHandle<Vec<u8>>,
    scope: CancellationToken,
}

impl ConvertedStream {
    pub async fn finish(mut self) -> Result<(), ProcessError> {
        let status = self.child.wait().await?;
        let program = self.child.program().to_string();

        if self.scope.is_cancelled() && !status.success() {
            self.stderr_task.abort();
            return Err(ProcessError::Canceled { program });
        }
        if !status.success() {
            let stderr = (&mut self.stderr_task).await.unwrap_or_default();
            return Err(ProcessError::Failed {
                program,
                exit_code: status.code(),
                output: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }
        Ok(())
    }
}

impl AsyncRead for ConvertedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

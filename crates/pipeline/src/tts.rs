//! Text-to-speech: the prompt goes to the tool's stdin, a WAV comes back.

use std::path::Path;

use audiobot_core::convert::AudioFormat;
use audiobot_core::job::{Artifact, JobError, JobSpec, MediaFile};
use audiobot_core::params::TtsParams;
use audiobot_core::process::{self, ToolCommand};
use tokio_util::sync::CancellationToken;

use crate::staging::{require_output, Staging};

pub(crate) async fn synthesize(
    bin: &Path,
    scope: &CancellationToken,
    job: &JobSpec,
    params: &TtsParams,
) -> Result<Artifact, JobError> {
    let staging = Staging::new(job.task_id)?;
    let out = staging.file("tts.wav");

    let cmd = ToolCommand::new(bin)
        .args(["--model_name", params.model.as_str(), "--out_path"])
        .arg(&out)
        .stdin(job.prompt.as_bytes())
        .in_program_dir();
    process::run(scope, &cmd)
        .await
        .map_err(|e| JobError::tool("TTS", e))?;
    require_output(&out).await?;

    Ok(staging.into_artifact(vec![MediaFile {
        path: out,
        filename: format!("tts-{}.ogg", job.task_id),
        format: AudioFormat::Opus,
    }]))
}

/// The tool's own model listing.
pub(crate) async fn list_models(bin: &Path, scope: &CancellationToken) -> Result<String, JobError> {
    let cmd = ToolCommand::new(bin).arg("--list_models").in_program_dir();
    process::run(scope, &cmd)
        .await
        .map_err(|e| JobError::tool("TTS", e))
}

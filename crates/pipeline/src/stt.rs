//! Speech-to-text: the transcript is written next to the input file.

use std::path::Path;

use audiobot_core::job::{Artifact, InputMedia, JobError, JobSpec};
use audiobot_core::params::SttParams;
use audiobot_core::process::{self, ToolCommand};
use tokio_util::sync::CancellationToken;

use crate::staging::Staging;

const INPUT_FILE: &str = "stt.wav";
const TRANSCRIPT_FILE: &str = "stt.txt";

pub(crate) async fn transcribe(
    bin: &Path,
    scope: &CancellationToken,
    job: &JobSpec,
    params: &SttParams,
    input: InputMedia,
) -> Result<Artifact, JobError> {
    let staging = Staging::new(job.task_id)?;
    let input_path = staging.write(INPUT_FILE, &input.data).await?;

    let mut cmd = ToolCommand::new(bin);
    if let Some(language) = &params.language {
        cmd = cmd.args(["--language", language.as_str()]);
    }
    let cmd = cmd.arg(&input_path).in_program_dir();

    process::run(scope, &cmd)
        .await
        .map_err(|e| JobError::tool("STT", e))?;

    let transcript = tokio::fs::read_to_string(staging.file(TRANSCRIPT_FILE))
        .await
        .map_err(|e| JobError::io("can't read stt output file", e))?;
    let transcript = transcript.trim();

    if transcript.is_empty() {
        Ok(Artifact::Notice("no speech recognized".to_string()))
    } else {
        Ok(Artifact::Text(transcript.to_string()))
    }
}

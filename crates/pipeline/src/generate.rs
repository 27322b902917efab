//! Music and sound generation. Both generators write `0.wav` into the
//! output directory they are given.

use std::path::Path;

use audiobot_core::convert::AudioFormat;
use audiobot_core::job::{Artifact, InputMedia, JobError, JobSpec, MediaFile};
use audiobot_core::params::GenerateParams;
use audiobot_core::process::{self, ToolCommand};
use tokio_util::sync::CancellationToken;

use crate::staging::{require_output, Staging};

const OUTPUT_FILE: &str = "0.wav";

/// Generate music from a description, conditioned on the supplied melody.
pub(crate) async fn musicgen(
    bin: &Path,
    scope: &CancellationToken,
    job: &JobSpec,
    params: &GenerateParams,
    input: InputMedia,
) -> Result<Artifact, JobError> {
    let staging = Staging::new(job.task_id)?;
    let melody = staging.write("musicgen-in.wav", &input.data).await?;

    let cmd = ToolCommand::new(bin).arg("--input_file").arg(&melody);
    generate(cmd, "musicgen", scope, job, params, staging).await
}

/// Generate a sound effect from a description.
pub(crate) async fn audiogen(
    bin: &Path,
    scope: &CancellationToken,
    job: &JobSpec,
    params: &GenerateParams,
) -> Result<Artifact, JobError> {
    let staging = Staging::new(job.task_id)?;
    generate(ToolCommand::new(bin), "audiogen", scope, job, params, staging).await
}

async fn generate(
    cmd: ToolCommand,
    stage: &'static str,
    scope: &CancellationToken,
    job: &JobSpec,
    params: &GenerateParams,
    staging: Staging,
) -> Result<Artifact, JobError> {
    let mut cmd = cmd
        .args(["--description", job.prompt.as_str(), "--output_path"])
        .arg(staging.path());
    if let Some(secs) = params.length_secs {
        cmd = cmd.args(["--duration".to_string(), secs.to_string()]);
    }
    let cmd = cmd.in_program_dir();

    process::run(scope, &cmd)
        .await
        .map_err(|e| JobError::tool(stage, e))?;

    let out = staging.file(OUTPUT_FILE);
    require_output(&out).await?;

    Ok(staging.into_artifact(vec![MediaFile {
        path: out,
        filename: format!("{stage}-{}.ogg", job.task_id),
        format: AudioFormat::Opus,
    }]))
}

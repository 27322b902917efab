//! Source separation.
//!
//! The separator prints tqdm progress bars (`45%|████      |`) interleaved
//! with plain status lines. The last plain line becomes the progress
//! description; the percentage comes from the bar.

use std::path::Path;
use std::sync::LazyLock;

use audiobot_core::convert::AudioFormat;
use audiobot_core::job::{Artifact, InputMedia, JobError, JobSpec, MediaFile};
use audiobot_core::params::MdxParams;
use audiobot_core::process::{run_streaming, StreamOutcome, ToolCommand};
use audiobot_core::progress::{Progress, ProgressReporter};
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::staging::{file_stem, Staging};

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)%\|").expect("valid regex"));

const INPUT_FILE: &str = "mdx.wav";

/// Output stems in delivery order: file suffix and display label.
const STEMS: &[(&str, &str)] = &[
    ("instrum", "Instrumental"),
    ("instrum2", "Instrumental2"),
    ("vocals", "Vocals"),
    ("bass", "Bass"),
    ("drums", "Drums"),
    ("other", "Other"),
];

/// Turns separator output lines into progress events.
#[derive(Debug, Default)]
pub struct MdxProgress {
    description: Option<String>,
    percent: i32,
}

impl MdxProgress {
    pub fn observe(&mut self, line: &str) -> Option<Progress> {
        if let Some(percent) = PERCENT_RE
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
        {
            self.percent = percent;
        } else if !line.trim().is_empty() {
            self.description = Some(line.trim().to_string());
        } else {
            return None;
        }

        Some(Progress {
            description: self.description.clone(),
            percent: self.percent,
        })
    }
}

pub(crate) async fn separate(
    bin: &Path,
    scope: &CancellationToken,
    job: &JobSpec,
    params: &MdxParams,
    input: InputMedia,
    progress: &ProgressReporter,
) -> Result<Artifact, JobError> {
    let staging = Staging::new(job.task_id)?;
    let input_path = staging.write(INPUT_FILE, &input.data).await?;

    let mut cmd = ToolCommand::new(bin);
    if !params.full_output {
        cmd = cmd.args(["--vocals_only", "True"]);
    }
    let cmd = cmd
        .arg("--input_audio")
        .arg(&input_path)
        .arg("--output_folder")
        .arg(staging.path())
        .in_program_dir();

    let mut run = run_streaming(scope, &cmd).map_err(|e| JobError::tool("MDX", e))?;
    let mut parser = MdxProgress::default();
    while let Some(line) = run.next_line().await {
        if let Some(update) = parser.observe(&line) {
            progress.report(update).await;
        }
    }
    match run.finish().await.map_err(|e| JobError::tool("MDX", e))? {
        StreamOutcome::Completed => {}
        StreamOutcome::Canceled => return Err(JobError::Canceled),
    }

    let base = file_stem(&input.filename);
    let input_stem = file_stem(INPUT_FILE);
    let mut files = Vec::new();
    for (suffix, label) in STEMS {
        let path = staging.file(&format!("{input_stem}_{suffix}.wav"));
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            files.push(MediaFile {
                path,
                filename: format!("{base} ({label}).mp3"),
                format: AudioFormat::Mp3,
            });
        }
    }

    if files.is_empty() {
        return Err(JobError::MissingOutput(format!(
            "{}/{input_stem}_*.wav",
            staging.path().display()
        )));
    }
    Ok(staging.into_artifact(files))
}

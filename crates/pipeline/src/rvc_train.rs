//! Voice model training.
//!
//! The trainer reads `rvc-train-config.json` from its own directory and
//! writes checkpoints under `data/training/RVC/<model>/`. Training lines
//! look like `<epoch> <step> <loss>`; progress is the epoch share of the
//! requested epoch count. On success the final checkpoint and its index are
//! copied into the model directory.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use audiobot_core::job::{Artifact, InputMedia, JobError, JobSpec};
use audiobot_core::params::RvcTrainParams;
use audiobot_core::process::{run_streaming, StreamOutcome, ToolCommand};
use audiobot_core::progress::{Progress, ProgressReporter};
use audiobot_core::status::STATUS_PROCESSING;
use regex::Regex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::rvc::{delete_model, ModelPaths};
use crate::staging::Staging;

static EPOCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(\d+)\s+([\d.]+)").expect("valid regex"));

const CONFIG_FILE: &str = "rvc-train-config.json";

#[derive(Debug, Serialize)]
struct TrainConfig<'a> {
    model: &'a str,
    src_dir: &'a Path,
    alg: &'a str,
    batch_size: u32,
    epochs: u32,
}

/// Turns trainer output into progress events, only when the percentage rises.
#[derive(Debug)]
pub struct TrainProgress {
    epochs: u32,
    last_percent: i32,
}

impl TrainProgress {
    pub fn new(epochs: u32) -> Self {
        Self {
            epochs: epochs.max(1),
            last_percent: 0,
        }
    }

    pub fn observe(&mut self, line: &str) -> Option<Progress> {
        let caps = EPOCH_RE.captures(line)?;
        let epoch: u64 = caps.get(1)?.as_str().parse().ok()?;
        let percent = (epoch.saturating_mul(100) / u64::from(self.epochs)).min(100) as i32;
        if percent <= self.last_percent {
            return None;
        }
        self.last_percent = percent;

        let description = match caps.get(3).and_then(|m| m.as_str().parse::<f32>().ok()) {
            Some(loss) => format!("{STATUS_PROCESSING} (loss: {loss:.2})"),
            None => STATUS_PROCESSING.to_string(),
        };
        Some(Progress::new(description, percent))
    }
}

fn training_dir(tool_dir: &Path, model: &str) -> PathBuf {
    tool_dir.join("data").join("training").join("RVC").join(model)
}

pub(crate) async fn train(
    bin: &Path,
    model_dir: &Path,
    scope: &CancellationToken,
    job: &JobSpec,
    params: &RvcTrainParams,
    input: Option<InputMedia>,
    progress: &ProgressReporter,
) -> Result<Artifact, JobError> {
    if params.delete {
        delete_model(model_dir, &params.model).await?;
        tracing::info!(model = %params.model, "Deleted RVC model");
        return Ok(Artifact::Notice(format!("🗑️ Model {} deleted", params.model)));
    }

    if ModelPaths::resolve(model_dir, &params.model).await.is_ok() {
        return Err(JobError::Rejected(format!(
            "model {} already exists",
            params.model
        )));
    }
    let input = crate::staging::require_input(input)?;

    let tool_dir = bin
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let paths = ModelPaths::new(model_dir, &params.model);
    remove_training_data(tool_dir, &params.model).await;

    let run = TrainRun {
        bin,
        tool_dir,
        paths: &paths,
        scope,
        progress,
    };
    let result = run.execute(job, params, input).await;
    if result.is_err() {
        remove_training_data(tool_dir, &params.model).await;
        let _ = tokio::fs::remove_file(&paths.model).await;
        let _ = tokio::fs::remove_file(&paths.index).await;
    }
    result
}

/// Everything a single training run touches besides the request itself.
struct TrainRun<'a> {
    bin: &'a Path,
    tool_dir: &'a Path,
    paths: &'a ModelPaths,
    scope: &'a CancellationToken,
    progress: &'a ProgressReporter,
}

impl TrainRun<'_> {
    async fn execute(
        &self,
        job: &JobSpec,
        params: &RvcTrainParams,
        input: InputMedia,
    ) -> Result<Artifact, JobError> {
        let (tool_dir, paths, progress) = (self.tool_dir, self.paths, self.progress);
        let staging = Staging::new(job.task_id)?;
        let src_dir = staging.file("src");
        tokio::fs::create_dir(&src_dir)
            .await
            .map_err(|e| JobError::io("can't create directory for training data", e))?;
        tokio::fs::write(src_dir.join("in.wav"), &input.data)
            .await
            .map_err(|e| JobError::io("can't write rvc train input file", e))?;

        let config = TrainConfig {
            model: &params.model,
            src_dir: &src_dir,
            alg: &params.method,
            batch_size: params.batch_size,
            epochs: params.epochs,
        };
        let config = serde_json::to_vec(&config)
            .map_err(|e| JobError::io("can't encode rvc train config", e.into()))?;
        tokio::fs::write(tool_dir.join(CONFIG_FILE), config)
            .await
            .map_err(|e| JobError::io("can't write rvc train config file", e))?;

        let cmd = ToolCommand::new(self.bin).current_dir(tool_dir);
        let mut run = run_streaming(self.scope, &cmd).map_err(|e| JobError::tool("RVC train", e))?;
        let mut parser = TrainProgress::new(params.epochs);
        while let Some(line) = run.next_line().await {
            if let Some(update) = parser.observe(&line) {
                progress.report(update).await;
            }
        }
        match run
            .finish()
            .await
            .map_err(|e| JobError::tool("RVC train", e))?
        {
            StreamOutcome::Completed => {}
            StreamOutcome::Canceled => return Err(JobError::Canceled),
        }

        progress
            .report(Progress::new("Copying results...", -1))
            .await;

        let trained = training_dir(tool_dir, &params.model);
        let checkpoint = trained
            .join("models")
            .join(format!("e_{}", params.epochs.saturating_sub(1)))
            .join(&paths.filename);
        copy_result(&checkpoint, &paths.model).await?;
        copy_result(
            &trained.join(format!("{}_added.index", params.model)),
            &paths.index,
        )
        .await?;

        tracing::info!(model = %params.model, epochs = params.epochs, "Trained RVC model");
        Ok(Artifact::Notice(format!("🤡 Model {} trained", params.model)))
    }
}

async fn copy_result(src: &Path, dst: &Path) -> Result<(), JobError> {
    tokio::fs::copy(src, dst).await.map_err(|e| {
        JobError::io(
            format!("can't copy {} to {}", src.display(), dst.display()),
            e,
        )
    })?;
    Ok(())
}

async fn remove_training_data(tool_dir: &Path, model: &str) {
    let dir = training_dir(tool_dir, model);
    if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove training data");
        }
    }
}

//! Retrieval-based voice conversion and model management.
//!
//! A model is a `<name>.pth` file plus a `<name>_added.index` file, both in
//! the configured model directory.

use std::path::{Path, PathBuf};

use audiobot_core::convert::AudioFormat;
use audiobot_core::job::{Artifact, InputMedia, JobError, JobSpec, MediaFile};
use audiobot_core::params::RvcParams;
use audiobot_core::process::{self, ToolCommand};
use tokio_util::sync::CancellationToken;

use crate::staging::{file_stem, require_output, Staging};

const MODEL_EXTENSION: &str = "pth";

/// File locations belonging to one model name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    /// `<name>.pth`, as passed to the tool.
    pub filename: String,
    pub model: PathBuf,
    pub index: PathBuf,
}

impl ModelPaths {
    pub fn new(model_dir: &Path, name: &str) -> Self {
        let filename = if name.ends_with(".pth") {
            name.to_string()
        } else {
            format!("{name}.{MODEL_EXTENSION}")
        };
        let index = model_dir.join(format!("{}_added.index", file_stem(&filename)));
        Self {
            model: model_dir.join(&filename),
            filename,
            index,
        }
    }

    /// Paths of an existing model, or an error naming what is missing.
    pub async fn resolve(model_dir: &Path, name: &str) -> Result<Self, JobError> {
        let paths = Self::new(model_dir, name);
        if !exists(&paths.model).await {
            return Err(JobError::Rejected(format!("model {name} not found")));
        }
        if !exists(&paths.index).await {
            return Err(JobError::Rejected(format!(
                "index not found: {}",
                paths.index.display()
            )));
        }
        Ok(paths)
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Names of every model under `model_dir`, sorted.
pub fn list_models(model_dir: &Path) -> Result<Vec<String>, JobError> {
    let mut models = Vec::new();
    let mut pending = vec![model_dir.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| JobError::io(format!("can't list {}", dir.display()), e))?;
        for entry in entries {
            let path = entry
                .map_err(|e| JobError::io(format!("can't list {}", dir.display()), e))?
                .path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == MODEL_EXTENSION) {
                if let Some(stem) = path.file_stem() {
                    models.push(stem.to_string_lossy().into_owned());
                }
            }
        }
    }

    models.sort();
    Ok(models)
}

/// Remove both files of an existing model.
pub async fn delete_model(model_dir: &Path, name: &str) -> Result<(), JobError> {
    let paths = ModelPaths::resolve(model_dir, name).await?;
    tokio::fs::remove_file(&paths.model)
        .await
        .map_err(|e| JobError::io(format!("can't delete {}", paths.model.display()), e))?;
    tokio::fs::remove_file(&paths.index)
        .await
        .map_err(|e| JobError::io(format!("can't delete {}", paths.index.display()), e))?;
    Ok(())
}

pub(crate) async fn convert(
    bin: &Path,
    model_dir: &Path,
    scope: &CancellationToken,
    job: &JobSpec,
    params: &RvcParams,
    input: InputMedia,
) -> Result<Artifact, JobError> {
    let paths = ModelPaths::resolve(model_dir, &params.model).await?;

    let staging = Staging::new(job.task_id)?;
    let input_path = staging.write("rvc-in.wav", &input.data).await?;
    let out = staging.file("rvc-out.wav");

    let mut cmd = ToolCommand::new(bin)
        .arg("--input_path")
        .arg(&input_path)
        .args(["--model_name", paths.filename.as_str(), "--index_path"])
        .arg(&paths.index)
        .arg("--opt_path")
        .arg(&out)
        .args(["--f0method", params.method.as_str()]);
    if let Some(radius) = params.filter_radius {
        cmd = cmd.args(["--filter_radius".to_string(), radius.to_string()]);
    }
    if let Some(rate) = params.index_rate {
        cmd = cmd.args(["--index_rate".to_string(), format!("{rate:.6}")]);
    }
    if let Some(rate) = params.rms_mix_rate {
        cmd = cmd.args(["--rms_mix_rate".to_string(), format!("{rate:.6}")]);
    }
    if let Some(pitch) = params.pitch {
        cmd = cmd.args(["--f0up_key".to_string(), pitch.to_string()]);
    }
    let cmd = cmd.in_program_dir();

    process::run(scope, &cmd)
        .await
        .map_err(|e| JobError::tool("RVC", e))?;
    require_output(&out).await?;

    Ok(staging.into_artifact(vec![MediaFile {
        path: out,
        filename: format!("rvc-{}.ogg", job.task_id),
        format: AudioFormat::Opus,
    }]))
}

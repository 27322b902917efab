//! Per-job staging directories for tool input and output files.

use std::path::{Path, PathBuf};

use audiobot_core::job::{Artifact, InputMedia, JobError, MediaFile};
use audiobot_core::types::TaskId;
use tempfile::TempDir;

/// A private temporary directory owned by the active job. Removed on drop,
/// or when the artifact built from it is dropped.
#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
}

impl Staging {
    pub fn new(task_id: TaskId) -> Result<Self, JobError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("audiobot-{task_id}-"))
            .tempdir()
            .map_err(|e| JobError::io("can't create staging directory", e))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `data` to `name` inside the staging directory.
    pub async fn write(&self, name: &str, data: &[u8]) -> Result<PathBuf, JobError> {
        let path = self.file(name);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| JobError::io(format!("can't write {name}"), e))?;
        Ok(path)
    }

    pub fn into_artifact(self, files: Vec<MediaFile>) -> Artifact {
        Artifact::media(files, self.dir)
    }
}

/// Take the input media a job needs, rejecting missing or empty data.
pub fn require_input(input: Option<InputMedia>) -> Result<InputMedia, JobError> {
    match input {
        Some(media) if !media.data.is_empty() => Ok(media),
        _ => Err(JobError::EmptyInput),
    }
}

/// Fail unless `path` exists and is non-empty.
pub async fn require_output(path: &Path) -> Result<(), JobError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(JobError::MissingOutput(path.display().to_string())),
    }
}

/// `name` without its final extension.
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

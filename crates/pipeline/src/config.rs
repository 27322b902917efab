//! Where the external tools live.

use std::path::{Path, PathBuf};

use audiobot_core::job::JobError;
use audiobot_core::params::JobKind;

/// Locations of the external tools. A kind whose tool is unset is disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolPaths {
    pub tts: Option<PathBuf>,
    pub stt: Option<PathBuf>,
    pub mdx: Option<PathBuf>,
    pub rvc: Option<PathBuf>,
    pub rvc_train: Option<PathBuf>,
    pub musicgen: Option<PathBuf>,
    pub audiogen: Option<PathBuf>,
    /// Directory holding `<model>.pth` and `<model>_added.index` files.
    pub rvc_model_dir: Option<PathBuf>,
}

impl ToolPaths {
    pub fn binary(&self, kind: JobKind) -> Option<&Path> {
        let path = match kind {
            JobKind::Tts => &self.tts,
            JobKind::Stt => &self.stt,
            JobKind::Mdx => &self.mdx,
            JobKind::Rvc => &self.rvc,
            JobKind::RvcTrain => &self.rvc_train,
            JobKind::MusicGen => &self.musicgen,
            JobKind::AudioGen => &self.audiogen,
        };
        path.as_deref()
    }

    /// Whether jobs of `kind` can run with this configuration.
    pub fn supports(&self, kind: JobKind) -> bool {
        let needs_models = matches!(kind, JobKind::Rvc | JobKind::RvcTrain);
        self.binary(kind).is_some() && (!needs_models || self.rvc_model_dir.is_some())
    }

    pub(crate) fn require(&self, kind: JobKind) -> Result<&Path, JobError> {
        self.binary(kind)
            .ok_or_else(|| JobError::Rejected(format!("{kind} is not configured")))
    }

    pub(crate) fn require_model_dir(&self) -> Result<&Path, JobError> {
        self.rvc_model_dir
            .as_deref()
            .ok_or_else(|| JobError::Rejected("RVC model path is not configured".to_string()))
    }
}

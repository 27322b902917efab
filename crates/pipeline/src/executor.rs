//! Dispatch of queued jobs to their tool adapters.

use audiobot_core::job::{Artifact, InputMedia, JobError, JobExecutor, JobSpec};
use audiobot_core::params::{JobKind, JobParams};
use audiobot_core::progress::ProgressReporter;
use tokio_util::sync::CancellationToken;

use crate::config::ToolPaths;
use crate::staging::require_input;
use crate::{generate, mdx, rvc, rvc_train, stt, tts};

/// Runs jobs with the locally installed media tools.
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    tools: ToolPaths,
}

impl ToolExecutor {
    pub fn new(tools: ToolPaths) -> Self {
        Self { tools }
    }

    pub fn supports(&self, kind: JobKind) -> bool {
        self.tools.supports(kind)
    }

    /// Model listing printed by the TTS tool.
    pub async fn list_tts_models(&self, scope: &CancellationToken) -> Result<String, JobError> {
        let bin = self.tools.require(JobKind::Tts)?;
        tts::list_models(bin, scope).await
    }

    /// Voice conversion models available in the model directory.
    pub async fn list_rvc_models(&self) -> Result<Vec<String>, JobError> {
        let dir = self.tools.require_model_dir()?.to_path_buf();
        tokio::task::spawn_blocking(move || rvc::list_models(&dir))
            .await
            .map_err(|e| JobError::io("model listing task failed", std::io::Error::other(e)))?
    }
}

impl JobExecutor for ToolExecutor {
    async fn execute(
        &self,
        scope: &CancellationToken,
        job: &JobSpec,
        input: Option<InputMedia>,
        progress: ProgressReporter,
    ) -> Result<Artifact, JobError> {
        let kind = job.params.kind();
        let bin = self.tools.require(kind)?;
        tracing::info!(task_id = %job.task_id, kind = %kind, "Running tool");

        match &job.params {
            JobParams::Tts(params) => tts::synthesize(bin, scope, job, params).await,
            JobParams::Stt(params) => {
                stt::transcribe(bin, scope, job, params, require_input(input)?).await
            }
            JobParams::Mdx(params) => {
                mdx::separate(bin, scope, job, params, require_input(input)?, &progress).await
            }
            JobParams::Rvc(params) => {
                let model_dir = self.tools.require_model_dir()?;
                rvc::convert(bin, model_dir, scope, job, params, require_input(input)?).await
            }
            JobParams::RvcTrain(params) => {
                let model_dir = self.tools.require_model_dir()?;
                rvc_train::train(bin, model_dir, scope, job, params, input, &progress).await
            }
            JobParams::MusicGen(params) => {
                generate::musicgen(bin, scope, job, params, require_input(input)?).await
            }
            JobParams::AudioGen(params) => generate::audiogen(bin, scope, job, params).await,
        }
    }
}

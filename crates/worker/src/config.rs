//! Worker configuration from environment variables.
//!
//! Every setting has a default; blank values count as unset.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use audiobot_core::params::ParamDefaults;
use audiobot_pipeline::ToolPaths;

use crate::queue::QueueConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Worker configuration loaded from environment variables.
///
/// Tool paths are optional; a job kind whose tool is not configured is
/// rejected when requested.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub tools: ToolPaths,
    pub defaults: ParamDefaults,
    pub queue: QueueConfig,
    /// ffmpeg binary used for artifact conversion (default: `ffmpeg`).
    pub ffmpeg: PathBuf,
    /// Where the console transport writes artifacts (default: `./output`).
    pub output_dir: PathBuf,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default    |
    /// |--------------------------------|------------|
    /// | `TTS_BIN`                      | unset      |
    /// | `TTS_DEFAULT_MODEL`            | unset      |
    /// | `STT_BIN`                      | unset      |
    /// | `MDX_BIN`                      | unset      |
    /// | `RVC_BIN`                      | unset      |
    /// | `RVC_MODEL_PATH`               | unset      |
    /// | `RVC_DEFAULT_MODEL`            | unset      |
    /// | `RVC_TRAIN_BIN`                | unset      |
    /// | `RVC_TRAIN_DEFAULT_BATCH_SIZE` | `8`        |
    /// | `RVC_TRAIN_DEFAULT_EPOCHS`     | `100`      |
    /// | `MUSICGEN_BIN`                 | unset      |
    /// | `AUDIOGEN_BIN`                 | unset      |
    /// | `FFMPEG_BIN`                   | `ffmpeg`   |
    /// | `JOB_TIMEOUT_SECS`             | `300`      |
    /// | `INPUT_TIMEOUT_SECS`           | `180`      |
    /// | `PRIVATE_PROGRESS_INTERVAL_MS` | `500`      |
    /// | `GROUP_PROGRESS_INTERVAL_MS`   | `3000`     |
    /// | `OUTPUT_DIR`                   | `./output` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let path = |name: &str| var(name).map(PathBuf::from);

        let tools = ToolPaths {
            tts: path("TTS_BIN"),
            stt: path("STT_BIN"),
            mdx: path("MDX_BIN"),
            rvc: path("RVC_BIN"),
            rvc_train: path("RVC_TRAIN_BIN"),
            musicgen: path("MUSICGEN_BIN"),
            audiogen: path("AUDIOGEN_BIN"),
            rvc_model_dir: path("RVC_MODEL_PATH"),
        };

        let defaults = ParamDefaults {
            tts_model: var("TTS_DEFAULT_MODEL"),
            rvc_model: var("RVC_DEFAULT_MODEL"),
            rvc_train_batch_size: parse(&var, "RVC_TRAIN_DEFAULT_BATCH_SIZE", 8)?,
            rvc_train_epochs: parse(&var, "RVC_TRAIN_DEFAULT_EPOCHS", 100)?,
        };

        let queue = QueueConfig {
            job_timeout: Duration::from_secs(parse(&var, "JOB_TIMEOUT_SECS", 300)?),
            input_timeout: Duration::from_secs(parse(&var, "INPUT_TIMEOUT_SECS", 180)?),
            private_interval: Duration::from_millis(parse(&var, "PRIVATE_PROGRESS_INTERVAL_MS", 500)?),
            group_interval: Duration::from_millis(parse(&var, "GROUP_PROGRESS_INTERVAL_MS", 3000)?),
        };

        Ok(Self {
            tools,
            defaults,
            queue,
            ffmpeg: path("FFMPEG_BIN").unwrap_or_else(|| PathBuf::from("ffmpeg")),
            output_dir: path("OUTPUT_DIR").unwrap_or_else(|| PathBuf::from("./output")),
        })
    }
}

/// Parse variable `name`, falling back to `default` when it is unset.
fn parse<T: FromStr>(
    var: impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    let Some(value) = var(name) else {
        return Ok(default);
    };
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        expected: std::any::type_name::<T>(),
        value,
    })
}

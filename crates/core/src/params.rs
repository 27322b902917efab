//! Job kinds and their request parameters.
//!
//! A request is `[-flag [value]]... [free text]`, tokenized shell-style. Flag
//! parsing stops at the first token that does not start with `-`; that token
//! and everything after it form the free text (the prompt). Every kind parses
//! into its own parameter type, so a flag accepted by one kind never leaks
//! into another.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Default pitch extraction method for voice conversion and training.
pub const DEFAULT_RVC_METHOD: &str = "harvest";

/// Closed set of job kinds the worker can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Tts,
    Stt,
    Mdx,
    Rvc,
    RvcTrain,
    MusicGen,
    AudioGen,
}

impl JobKind {
    /// Whether the job waits for input media from its originator before
    /// processing.
    pub fn requires_input(self) -> bool {
        matches!(
            self,
            Self::Stt | Self::Mdx | Self::Rvc | Self::RvcTrain | Self::MusicGen
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tts => "tts",
            Self::Stt => "stt",
            Self::Mdx => "mdx",
            Self::Rvc => "rvc",
            Self::RvcTrain => "rvc-train",
            Self::MusicGen => "musicgen",
            Self::AudioGen => "audiogen",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Parameter types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TtsParams {
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SttParams {
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MdxParams {
    /// Emit every separated stem instead of vocals and instrumental only.
    pub full_output: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RvcParams {
    pub model: String,
    pub method: String,
    pub pitch: Option<i32>,
    pub filter_radius: Option<u32>,
    pub index_rate: Option<f32>,
    pub rms_mix_rate: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RvcTrainParams {
    pub model: String,
    pub method: String,
    pub batch_size: u32,
    pub epochs: u32,
    /// Remove the model instead of training it.
    pub delete: bool,
}

/// Parameters shared in shape (not in state) by the two generator kinds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerateParams {
    pub length_secs: Option<u32>,
}

/// Typed parameter bag, one variant per [`JobKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum JobParams {
    Tts(TtsParams),
    Stt(SttParams),
    Mdx(MdxParams),
    Rvc(RvcParams),
    RvcTrain(RvcTrainParams),
    MusicGen(GenerateParams),
    AudioGen(GenerateParams),
}

impl JobParams {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Tts(_) => JobKind::Tts,
            Self::Stt(_) => JobKind::Stt,
            Self::Mdx(_) => JobKind::Mdx,
            Self::Rvc(_) => JobKind::Rvc,
            Self::RvcTrain(_) => JobKind::RvcTrain,
            Self::MusicGen(_) => JobKind::MusicGen,
            Self::AudioGen(_) => JobKind::AudioGen,
        }
    }

    /// Training requests with `-delete` complete without any input media.
    pub fn requires_input(&self) -> bool {
        match self {
            Self::RvcTrain(p) if p.delete => false,
            other => other.kind().requires_input(),
        }
    }
}

/// Short human-readable summary appended under every status update.
impl fmt::Display for JobParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tts(p) => write!(f, "🗣️ {}", p.model),
            Self::Stt(p) => write!(f, "🏳️‍🌈 {}", p.language.as_deref().unwrap_or("auto")),
            Self::Mdx(p) if p.full_output => f.write_str("👑 Full output"),
            Self::Mdx(_) => Ok(()),
            Self::Rvc(p) => {
                write!(f, "🤡 {} 🎹 Method: {}", p.model, p.method)?;
                if let Some(pitch) = p.pitch {
                    write!(f, " Pitch: {pitch}")?;
                }
                if let Some(radius) = p.filter_radius {
                    write!(f, " Filter radius: {radius}")?;
                }
                if let Some(rate) = p.index_rate {
                    write!(f, " Index rate: {rate}")?;
                }
                if let Some(rate) = p.rms_mix_rate {
                    write!(f, " RMS mix rate: {rate}")?;
                }
                Ok(())
            }
            Self::RvcTrain(p) if p.delete => write!(f, "🗑️ {}", p.model),
            Self::RvcTrain(p) => write!(
                f,
                "🤡 {} 🎹 Method: {} Batch size: {} Epochs: {}",
                p.model, p.method, p.batch_size, p.epochs
            ),
            Self::MusicGen(p) | Self::AudioGen(p) => match p.length_secs {
                Some(secs) => write!(f, "🎹 Length: {secs}s"),
                None => Ok(()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Values used when a request leaves a parameter unset.
#[derive(Debug, Clone, Default)]
pub struct ParamDefaults {
    pub tts_model: Option<String>,
    pub rvc_model: Option<String>,
    pub rvc_train_batch_size: u32,
    pub rvc_train_epochs: u32,
}

/// A validated request: free text plus typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRequest {
    pub prompt: String,
    pub params: JobParams,
}

/// Flag values collected before they are checked against the kind.
#[derive(Default)]
struct RawFlags {
    model: Option<String>,
    language: Option<String>,
    full_output: bool,
    pitch: Option<i32>,
    method: Option<String>,
    filter_radius: Option<u32>,
    index_rate: Option<f32>,
    rms_mix_rate: Option<f32>,
    batch_size: Option<u32>,
    epochs: Option<u32>,
    delete: bool,
    length_secs: Option<u32>,
}

/// Parse the text following a command into typed parameters for `kind`.
pub fn parse_request(
    kind: JobKind,
    text: &str,
    defaults: &ParamDefaults,
) -> Result<ParsedRequest, CoreError> {
    let tokens = shlex::split(text).ok_or_else(|| invalid("unbalanced quotes"))?;

    let mut flags = RawFlags::default();
    let mut prompt = String::new();
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        if !token.starts_with('-') {
            prompt = tokens[i..].join(" ");
            break;
        }
        i += 1;

        let name = token[1..].to_lowercase();
        match (kind, name.as_str()) {
            (JobKind::Tts | JobKind::Rvc | JobKind::RvcTrain, "m" | "model") => {
                flags.model = Some(take_value(&tokens, &mut i, token)?.to_string());
            }
            (JobKind::Stt, "lang") => {
                flags.language = Some(take_value(&tokens, &mut i, token)?.to_string());
            }
            (JobKind::Mdx, "f" | "full") => flags.full_output = true,
            (JobKind::Rvc, "p" | "pitch") => {
                flags.pitch = Some(number(take_value(&tokens, &mut i, token)?, "pitch")?);
            }
            (JobKind::Rvc | JobKind::RvcTrain, "method") => {
                flags.method = Some(take_value(&tokens, &mut i, token)?.to_string());
            }
            (JobKind::Rvc, "filter-radius") => {
                flags.filter_radius = Some(number(
                    take_value(&tokens, &mut i, token)?,
                    "filter radius",
                )?);
            }
            (JobKind::Rvc, "index-rate") => {
                flags.index_rate =
                    Some(number(take_value(&tokens, &mut i, token)?, "index rate")?);
            }
            (JobKind::Rvc, "rms-mix-rate") => {
                flags.rms_mix_rate = Some(number(
                    take_value(&tokens, &mut i, token)?,
                    "rms mix rate",
                )?);
            }
            (JobKind::RvcTrain, "batch-size") => {
                flags.batch_size =
                    Some(number(take_value(&tokens, &mut i, token)?, "batch size")?);
            }
            (JobKind::RvcTrain, "epochs") => {
                flags.epochs = Some(number(take_value(&tokens, &mut i, token)?, "epochs")?);
            }
            (JobKind::RvcTrain, "delete") => flags.delete = true,
            (JobKind::MusicGen | JobKind::AudioGen, "l" | "length") => {
                flags.length_secs =
                    Some(number(take_value(&tokens, &mut i, token)?, "length")?);
            }
            _ => return Err(invalid(format!("unknown param {token}"))),
        }
    }

    let params = build_params(kind, flags, &prompt, defaults)?;
    Ok(ParsedRequest { prompt, params })
}

fn build_params(
    kind: JobKind,
    flags: RawFlags,
    prompt: &str,
    defaults: &ParamDefaults,
) -> Result<JobParams, CoreError> {
    let require_prompt = || {
        if prompt.is_empty() {
            Err(invalid("empty prompt"))
        } else {
            Ok(())
        }
    };

    let params = match kind {
        JobKind::Tts => {
            require_prompt()?;
            let model = flags
                .model
                .or_else(|| defaults.tts_model.clone())
                .ok_or_else(|| invalid("no model given"))?;
            JobParams::Tts(TtsParams { model })
        }
        JobKind::Stt => JobParams::Stt(SttParams {
            language: flags.language,
        }),
        JobKind::Mdx => JobParams::Mdx(MdxParams {
            full_output: flags.full_output,
        }),
        JobKind::Rvc => {
            let model = flags
                .model
                .or_else(|| non_empty(prompt))
                .or_else(|| defaults.rvc_model.clone())
                .ok_or_else(|| invalid("no model given"))?;
            JobParams::Rvc(RvcParams {
                model,
                method: flags.method.unwrap_or_else(|| DEFAULT_RVC_METHOD.to_string()),
                pitch: flags.pitch,
                filter_radius: flags.filter_radius,
                index_rate: flags.index_rate,
                rms_mix_rate: flags.rms_mix_rate,
            })
        }
        JobKind::RvcTrain => {
            let model = flags
                .model
                .or_else(|| non_empty(prompt))
                .ok_or_else(|| invalid("no model given"))?;
            let batch_size = flags.batch_size.unwrap_or(defaults.rvc_train_batch_size);
            let epochs = flags.epochs.unwrap_or(defaults.rvc_train_epochs);
            if !flags.delete && (batch_size == 0 || epochs == 0) {
                return Err(invalid("batch size and epochs must be positive"));
            }
            JobParams::RvcTrain(RvcTrainParams {
                model,
                method: flags.method.unwrap_or_else(|| DEFAULT_RVC_METHOD.to_string()),
                batch_size,
                epochs,
                delete: flags.delete,
            })
        }
        JobKind::MusicGen => {
            require_prompt()?;
            JobParams::MusicGen(GenerateParams {
                length_secs: flags.length_secs,
            })
        }
        JobKind::AudioGen => {
            require_prompt()?;
            JobParams::AudioGen(GenerateParams {
                length_secs: flags.length_secs,
            })
        }
    };
    Ok(params)
}

fn take_value<'a>(tokens: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, CoreError> {
    let value = tokens
        .get(*i)
        .ok_or_else(|| invalid(format!("{flag} is missing value")))?;
    *i += 1;
    Ok(value.as_str())
}

fn number<T: FromStr>(raw: &str, what: &str) -> Result<T, CoreError> {
    raw.parse()
        .map_err(|_| invalid(format!("invalid {what} value")))
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn invalid(msg: impl Into<String>) -> CoreError {
    CoreError::Validation(msg.into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

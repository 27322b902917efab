//! External media tool adapters.
//!
//! One module per job kind builds the tool's command line, runs it through
//! the core supervisor inside a per-job staging directory and turns its
//! output files into an [`Artifact`](audiobot_core::job::Artifact).
//! [`ToolExecutor`] dispatches a job to its adapter by parameter variant.

pub mod config;
pub mod executor;
pub mod generate;
pub mod mdx;
pub mod rvc;
pub mod rvc_train;
pub mod staging;
pub mod stt;
pub mod tts;

pub use config::ToolPaths;
pub use executor::ToolExecutor;

//! Supervised execution of external tools.
//!
//! Every tool runs as the leader of a fresh process group. A watcher task
//! bound to the job's cancellation token sends `SIGKILL` to the whole group,
//! so helpers forked by the tool die with it.
//!
//! - [`run`] collects the combined output of a short-lived command.
//! - [`run_streaming`] hands out decoded output lines while the tool runs.

mod command;
mod error;
mod streaming;
mod supervisor;

pub use command::ToolCommand;
pub use error::ProcessError;
pub use streaming::{run_streaming, StreamOutcome, StreamingRun};
pub use supervisor::{run, spawn, SupervisedChild};

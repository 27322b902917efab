//! Job orchestration for the audio bot: the serial queue, progress
//! throttling, artifact upload and the bundled console transport.

mod announcer;
pub mod commands;
pub mod config;
pub mod console;
pub mod queue;
pub mod sink;
pub mod status;
pub mod throttle;
pub mod upload;

#[cfg(test)]
mod testing;

pub use queue::{JobQueue, QueueConfig, QueueError, QueuePhase, QueueSnapshot};
pub use sink::{ArtifactSink, DeliveryFile, SinkError, StatusSink};

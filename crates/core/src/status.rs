//! User-visible status texts for the lifecycle of a queued job.
//!
//! Every job ends with exactly one of [`STATUS_DONE`], [`STATUS_ERROR`] or
//! [`STATUS_CANCELED`] (or a delivered text result for transcription jobs).

/// Sent when a job that needs input media becomes active.
pub const STATUS_INPUT_REQUEST: &str = "🎙️ Please post the audio file to process.";

/// Default progress description.
pub const STATUS_PROCESSING: &str = "🔨 Processing";

/// Input media received from the originator.
pub const STATUS_DOWNLOADED: &str = "⬇️ Done downloading";

/// Artifact conversion and delivery in progress.
pub const STATUS_UPLOADING: &str = "☁️ Uploading...";

/// The job finished successfully.
pub const STATUS_DONE: &str = "✅ Done";

/// Prefix of the failure status; the error text follows after `": "`.
pub const STATUS_ERROR: &str = "❌ Error";

/// The job was canceled on request.
pub const STATUS_CANCELED: &str = "❌ Canceled";

/// Marker appended to indeterminate progress descriptions.
pub const ELLIPSIS: &str = "...";

/// Queue position announcement for a waiting entry.
pub fn queue_position(position: usize) -> String {
    format!("👨‍👦‍👦 Request queued at position #{position}")
}

/// Failure status with the error text appended.
pub fn error_status(error: &dyn std::fmt::Display) -> String {
    format!("{STATUS_ERROR}: {error}")
}

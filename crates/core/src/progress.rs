//! Progress events emitted by job handlers and their textual rendering.
//!
//! Handlers report through a [`ProgressReporter`], a thin wrapper over a
//! bounded channel. The receiving side (the worker's throttle) decides when
//! an event actually reaches the user.

use tokio::sync::mpsc;

use crate::status::{ELLIPSIS, STATUS_PROCESSING};

/// Number of cells in the rendered progress bar.
pub const PROGRESS_BAR_LENGTH: u32 = 20;

/// Capacity of the handler-to-throttle channel.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 16;

const FILLED_CELL: char = '▰';
const EMPTY_CELL: char = '▱';

/// A single progress observation.
///
/// A `percent` of zero or below means the progress is indeterminate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub description: Option<String>,
    pub percent: i32,
}

impl Progress {
    pub fn new(description: impl Into<String>, percent: i32) -> Self {
        Self {
            description: Some(description.into()),
            percent,
        }
    }

    /// Progress with the default description.
    pub fn percent(percent: i32) -> Self {
        Self {
            description: None,
            percent,
        }
    }

    pub fn indeterminate() -> Self {
        Self::percent(-1)
    }

    /// Render the status text: description, then either a progress bar or an
    /// ellipsis, then the parameter summary on its own line.
    pub fn render(&self, params_summary: &str) -> String {
        let description = match self.description.as_deref() {
            Some(d) if !d.is_empty() => d,
            _ => STATUS_PROCESSING,
        };

        let mut text = description.to_string();
        if self.percent > 0 {
            text.push(' ');
            text.push_str(&progress_bar(self.percent));
        } else if !text.ends_with(ELLIPSIS) && !text.ends_with('…') {
            text.push_str(ELLIPSIS);
        }

        if !params_summary.is_empty() {
            text.push('\n');
            text.push_str(params_summary);
        }
        text
    }
}

/// Render a [`PROGRESS_BAR_LENGTH`]-cell bar followed by the percentage.
pub fn progress_bar(percent: i32) -> String {
    let percent = percent.clamp(0, 100) as u32;
    let filled = percent / (100 / PROGRESS_BAR_LENGTH);

    let mut bar = String::new();
    for i in 0..PROGRESS_BAR_LENGTH {
        bar.push(if i < filled { FILLED_CELL } else { EMPTY_CELL });
    }
    bar.push_str(&format!(" {percent}%"));
    bar
}

/// Create a connected reporter/receiver pair.
pub fn channel() -> (ProgressReporter, mpsc::Receiver<Progress>) {
    let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
    (ProgressReporter { tx }, rx)
}

/// Sending half handed to job handlers.
///
/// Reports never fail: once the receiving side is gone (job canceled or
/// finished) they are silently dropped.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::Sender<Progress>,
}

impl ProgressReporter {
    pub async fn report(&self, progress: Progress) {
        let _ = self.tx.send(progress).await;
    }

    /// A reporter whose events go nowhere.
    pub fn disconnected() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self { tx }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

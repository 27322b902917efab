//! Extraction of a retry-after hint from transport error text.
//!
//! Rate-limited messaging APIs answer with a body like
//! `{"ok":false,"parameters":{"retry_after":7}}`. The hint is recovered from
//! the error's text so that any transport error type can take part.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

static RETRY_AFTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""retry_after"\s*:\s*(\d+)"#).expect("valid retry_after regex")
});

/// Parse the number of seconds to wait from an error message, if present.
pub fn parse_retry_after(text: &str) -> Option<Duration> {
    let caps = RETRY_AFTER_RE.captures(text)?;
    let secs: u64 = caps.get(1)?.as_str().parse().ok()?;
    Some(Duration::from_secs(secs))
}

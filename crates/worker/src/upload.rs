//! Artifact delivery with a single rate-limit retry.

use std::future::Future;

use crate::sink::SinkError;

/// Run `attempt`, and run it once more if it failed with a retry-after hint,
/// after waiting exactly that long. Errors without a hint and a failed retry
/// are returned as is.
///
/// Every call of `attempt` must produce a fresh upload; readers consumed by a
/// failed attempt cannot be reused.
pub async fn deliver_with_retry<F, Fut>(mut attempt: F) -> Result<(), SinkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), SinkError>>,
{
    let err = match attempt().await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    let Some(wait) = err.retry_after() else {
        return Err(err);
    };

    tracing::warn!(
        wait_secs = wait.as_secs(),
        error = %err,
        "Upload rate limited, retrying"
    );
    tokio::time::sleep(wait).await;

    attempt().await.inspect_err(|e| {
        tracing::error!(error = %e, "Upload failed after retry");
    })
}

/// Errors raised while interpreting a request, before anything is queued.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed request text or parameters; the message is shown to the user.
    #[error("{0}")]
    Validation(String),
}

/// Errors from launching or supervising an external tool.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed (exit code {exit_code:?}): {output}")]
    Failed {
        program: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("{program} was canceled")]
    Canceled { program: String },

    #[error("reading output of {program} failed: {source}")]
    Read {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_failed() {
        let err = ProcessError::Failed {
            program: "mdx".to_string(),
            exit_code: Some(2),
            output: "no such file".to_string(),
        };
        assert_eq!(err.to_string(), "mdx failed (exit code Some(2)): no such file");
    }

    #[test]
    fn spawn_error_has_source() {
        let err = ProcessError::Spawn {
            program: "tts".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_canceled());
    }
}

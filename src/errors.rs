//! Error types for the pair sampling pipeline.

/// Top-level error enum for the pairwalk library.
///
/// Configuration and corpus-load errors are fatal for the worker that raised
/// them. Index errors are caller bugs. Sampling errors are local to a single
/// request and may be retried by the calling layer with a fresh anchor.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Corpus load error: {0}")]
    CorpusLoad(String),

    #[error("Index error: flat index {index} out of range [0, {total})")]
    Index { index: u64, total: u64 },

    #[error("Sampling error: {0}")]
    Sampling(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SamplerError {
    /// Whether the error makes the whole worker unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SamplerError::Configuration(_) | SamplerError::CorpusLoad(_) | SamplerError::Yaml(_)
        )
    }

    /// Whether the calling layer may retry the request with a fresh anchor.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SamplerError::Sampling(_))
    }
}

pub type SamplerResult<T> = Result<T, SamplerError>;

#[cfg(test)]
mod test_errors {
    use super::*;

    #[test]
    fn test_fatal_and_retryable_classes() {
        assert!(SamplerError::Configuration("x".into()).is_fatal());
        assert!(SamplerError::CorpusLoad("x".into()).is_fatal());
        assert!(!SamplerError::Sampling("x".into()).is_fatal());
        assert!(SamplerError::Sampling("x".into()).is_retryable());
        assert!(!SamplerError::Index { index: 3, total: 2 }.is_retryable());
    }

    #[test]
    fn test_index_error_message() {
        let err = SamplerError::Index { index: 10, total: 4 };
        assert_eq!(err.to_string(), "Index error: flat index 10 out of range [0, 4)");
    }
}

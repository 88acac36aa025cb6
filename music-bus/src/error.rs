use crate::variant::Variant;

/// Failure of a single transcode job. Recorded per job, never propagated to
/// sibling jobs.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("{variant}: encoder failed: {message}")]
    Encode { variant: Variant, message: String },

    #[error("{variant}: io error: {source}")]
    Io {
        variant: Variant,
        #[source]
        source: std::io::Error,
    },

    #[error("{variant}: job aborted: {message}")]
    Aborted { variant: Variant, message: String },
}

impl TranscodeError {
    pub fn variant(&self) -> Variant {
        match self {
            TranscodeError::Encode { variant, .. }
            | TranscodeError::Io { variant, .. }
            | TranscodeError::Aborted { variant, .. } => *variant,
        }
    }
}

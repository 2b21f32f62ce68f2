//! Validation errors for core types.

use thiserror::Error;

/// Errors raised while validating caller-supplied primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A prompt had neither text nor attachments.
    #[error("prompt must contain text or at least one attachment")]
    EmptyPrompt,

    /// An attachment was missing its payload.
    #[error("attachment {0:?} has no data")]
    EmptyAttachment(Option<String>),

    /// An ID string did not match the expected shape.
    #[error("malformed id: {0}")]
    MalformedId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = CoreError::EmptyAttachment(Some("r.pdf".into()));
        assert!(err.to_string().contains("r.pdf"));
        assert!(
            CoreError::EmptyPrompt
                .to_string()
                .contains("text or at least one attachment")
        );
    }
}

//! Extraction error types and cancellation classification.

use std::time::Duration;

use thiserror::Error;

/// Phrases that mark an error as a consequence of user cancellation.
const CANCELLATION_VOCABULARY: &[&str] = &[
    "aborted",
    "aborterror",
    "cancelled",
    "canceled",
    "operation was cancelled",
];

/// Errors raised by an [`ExtractionClient`](super::ExtractionClient).
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Extraction was cancelled")]
    Cancelled,

    #[error("Extraction timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),
}

impl ExtractionError {
    /// Whether this error is the expected result of a cancellation rather
    /// than a fault worth surfacing to the user.
    pub fn is_cancellation(&self) -> bool {
        match self {
            ExtractionError::Cancelled => true,
            ExtractionError::Timeout(_) => false,
            other => is_cancellation_message(&other.to_string()),
        }
    }
}

/// Case-insensitive match of `text` against the cancellation vocabulary.
pub fn is_cancellation_message(text: &str) -> bool {
    let lower = text.to_lowercase();
    CANCELLATION_VOCABULARY
        .iter()
        .any(|term| lower.contains(term))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_variant_is_cancellation() {
        assert!(ExtractionError::Cancelled.is_cancellation());
    }

    #[test]
    fn test_timeout_is_failure() {
        assert!(!ExtractionError::Timeout(Duration::from_secs(30)).is_cancellation());
    }

    #[test]
    fn test_messages_are_classified_by_vocabulary() {
        assert!(ExtractionError::Other("The operation was aborted.".into()).is_cancellation());
        assert!(ExtractionError::Other("Request CANCELED by client".into()).is_cancellation());
        assert!(ExtractionError::Api {
            status: 499,
            message: "client cancelled request".into()
        }
        .is_cancellation());
        assert!(!ExtractionError::Other("connection reset by peer".into()).is_cancellation());
        assert!(!ExtractionError::Api {
            status: 500,
            message: "internal error".into()
        }
        .is_cancellation());
    }

    #[test]
    fn test_vocabulary_matcher() {
        assert!(is_cancellation_message("AbortError: signal is aborted"));
        assert!(is_cancellation_message("Operation was cancelled"));
        assert!(!is_cancellation_message("quota exceeded"));
        assert!(!is_cancellation_message(""));
    }
}

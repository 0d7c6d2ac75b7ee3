//! Generation error taxonomy with retry classification.
//!
//! Every failure in the generation pipeline is represented here. Callers can
//! query `is_retriable()` without string matching.
//!
//! | Variant            | Retriable | Handling                                |
//! |--------------------|-----------|-----------------------------------------|
//! | Provider           | yes       | 3 attempts with fixed back-off (chapters) |
//! | Template           | no        | fatal — modifier/argument mismatch      |
//! | EmptyCompletion    | no        | fatal — provider stopped with no text   |
//! | ContinuationLimit  | no        | fatal — truncation recovery exhausted   |
//! | Storage            | no        | fatal — persistence collaborator failed |
//! | Configuration      | no        | fatal — bad runtime configuration       |

use thiserror::Error;

/// Unified error type for the generation pipeline.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// A modifier fragment's placeholder count did not match the supplied
    /// arguments, or a template could not be assembled.
    #[error("template construction failed: {0}")]
    Template(String),

    /// The completion or image provider returned a transport or API error.
    #[error("provider failure: {0}")]
    Provider(String),

    /// The provider reported a non-stop finish reason and returned no text.
    #[error("generation interrupted, finish reason: {finish_reason}")]
    EmptyCompletion { finish_reason: String },

    /// Truncated output could not be recovered within the continuation cap.
    #[error("generation interrupted: continuation limit of {0} exceeded")]
    ContinuationLimit(u32),

    /// The persistence collaborator failed.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Runtime configuration is invalid or missing required fields.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GenerationError {
    /// Returns `true` if the caller may retry the failed call.
    ///
    /// Only provider-level failures are transient; everything else is a
    /// property of the request itself and retrying cannot help.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Provider(_))
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        Self::Provider(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_failure_is_retriable() {
        assert!(GenerationError::provider("timeout").is_retriable());
    }

    #[test]
    fn template_mismatch_is_terminal() {
        let err = GenerationError::Template("expected 2 placeholders, got 1 argument".into());
        assert!(!err.is_retriable());
    }

    #[test]
    fn continuation_limit_is_terminal() {
        assert!(!GenerationError::ContinuationLimit(3).is_retriable());
    }
}

//! Error types for ragloop.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! provider and storage failures, plus the failure kinds of the adaptive
//! retrieval loop itself.

use std::fmt;
use thiserror::Error;

/// Unified error type for ragloop.
///
/// All fallible functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Knowledge base errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Web search errors
    #[error("Search error: {0}")]
    Search(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Rejected input (blank question, empty query)
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A classifier answered with a label outside the task's label set.
    #[error("Classifier returned unrecognized label '{label}' for task {task}")]
    ClassificationAmbiguous { task: String, label: String },

    /// A port call failed after transport retries or timed out.
    #[error("Upstream '{port}' unavailable: {reason}")]
    UpstreamUnavailable { port: String, reason: String },

    /// The rewrite -> retrieve cycle kept producing no relevant evidence.
    #[error("No relevant evidence after {attempts} query rewrites")]
    EmptyEvidenceExhausted { attempts: u32 },

    /// The generate -> grade cycle kept producing ungrounded answers.
    #[error("Answer still ungrounded after {attempts} regenerations")]
    UngroundedRegenerationExhausted { attempts: u32 },

    /// The rewrite budget was spent on grounded answers judged not useful.
    #[error("Answer still not useful after {attempts} query rewrites")]
    UnhelpfulAnswerExhausted { attempts: u32 },

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Stable, machine-readable error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Io,
    Llm,
    Knowledge,
    Search,
    Prompt,
    Serialization,
    Validation,
    ClassificationAmbiguous,
    UpstreamUnavailable,
    EmptyEvidenceExhausted,
    UngroundedRegenerationExhausted,
    UnhelpfulAnswerExhausted,
    Other,
}

impl ErrorKind {
    /// Snake-case name used in logs and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Io => "io",
            Self::Llm => "llm",
            Self::Knowledge => "knowledge",
            Self::Search => "search",
            Self::Prompt => "prompt",
            Self::Serialization => "serialization",
            Self::Validation => "validation",
            Self::ClassificationAmbiguous => "classification_ambiguous",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::EmptyEvidenceExhausted => "empty_evidence_exhausted",
            Self::UngroundedRegenerationExhausted => "ungrounded_regeneration_exhausted",
            Self::UnhelpfulAnswerExhausted => "unhelpful_answer_exhausted",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AppError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::Llm(_) => ErrorKind::Llm,
            Self::Knowledge(_) => ErrorKind::Knowledge,
            Self::Search(_) => ErrorKind::Search,
            Self::Prompt(_) => ErrorKind::Prompt,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Validation(_) => ErrorKind::Validation,
            Self::ClassificationAmbiguous { .. } => ErrorKind::ClassificationAmbiguous,
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::EmptyEvidenceExhausted { .. } => ErrorKind::EmptyEvidenceExhausted,
            Self::UngroundedRegenerationExhausted { .. } => {
                ErrorKind::UngroundedRegenerationExhausted
            }
            Self::UnhelpfulAnswerExhausted { .. } => ErrorKind::UnhelpfulAnswerExhausted,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether a transport-level retry may succeed.
    ///
    /// Only provider/network failures qualify. Classification and loop
    /// exhaustion errors are structural and never retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Llm(_) | Self::Search(_) | Self::UpstreamUnavailable { .. }
        )
    }

    /// Wrap any error as an upstream failure of the named port.
    pub fn upstream(port: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::UpstreamUnavailable {
            port: port.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_error_kinds() {
        let err = AppError::ClassificationAmbiguous {
            task: "route".to_string(),
            label: "maybe".to_string(),
        };
        assert_eq!(err.kind().as_str(), "classification_ambiguous");
        assert!(!err.is_transient());

        let err = AppError::EmptyEvidenceExhausted { attempts: 3 };
        assert_eq!(err.kind(), ErrorKind::EmptyEvidenceExhausted);
        assert!(err.to_string().contains("3"));

        let err = AppError::UngroundedRegenerationExhausted { attempts: 2 };
        assert_eq!(err.kind().to_string(), "ungrounded_regeneration_exhausted");
    }

    #[test]
    fn test_transient_errors() {
        assert!(AppError::Llm("connection reset".to_string()).is_transient());
        assert!(AppError::Search("502".to_string()).is_transient());
        assert!(AppError::upstream("generator", "timed out").is_transient());
        assert!(!AppError::Config("bad".to_string()).is_transient());
        assert!(!AppError::Validation("empty".to_string()).is_transient());
        assert_eq!(
            AppError::Validation("empty".to_string()).kind().to_string(),
            "validation"
        );
        assert!(!AppError::Prompt("bad".to_string()).is_transient());
    }

    #[test]
    fn test_upstream_message() {
        let err = AppError::upstream("web_searcher", "timed out after 60s");
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert_eq!(
            err.to_string(),
            "Upstream 'web_searcher' unavailable: timed out after 60s"
        );
    }

    #[test]
    fn test_from_serde_json() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }
}

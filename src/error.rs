//! Error types for the market brief orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Request / Pipeline Errors
    // =============================

    /// Malformed or unintelligible request. User-facing, never retried.
    #[error("Input error: {0}")]
    InputError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Market data or retrieval dependency is down.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Analysis requested without any usable input.
    #[error("Insufficient input: {0}")]
    InsufficientInput(String),

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailure(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid pipeline transition: {0}")]
    InvalidTransition(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Whether an adapter call failing with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestrationError::UpstreamUnavailable(_) | OrchestrationError::HttpError(_)
        )
    }

    /// Short, stable label used in logs and the audit trail.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestrationError::InputError(_) => "input_error",
            OrchestrationError::NotFound(_) => "not_found",
            OrchestrationError::UpstreamUnavailable(_) => "upstream_unavailable",
            OrchestrationError::InsufficientInput(_) => "insufficient_input",
            OrchestrationError::SynthesisFailure(_) => "synthesis_failure",
            OrchestrationError::LlmError(_) => "llm_error",
            OrchestrationError::ConfigError(_) => "config_error",
            OrchestrationError::InvalidTransition(_) => "invalid_transition",
            OrchestrationError::SerializationError(_) => "serialization_error",
            OrchestrationError::HttpError(_) => "http_error",
            OrchestrationError::IoError(_) => "io_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(OrchestrationError::UpstreamUnavailable("down".into()).is_retryable());
        assert!(!OrchestrationError::NotFound("ZZZZ".into()).is_retryable());
        assert!(!OrchestrationError::InputError("empty".into()).is_retryable());
        assert!(!OrchestrationError::InsufficientInput("none".into()).is_retryable());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(
            OrchestrationError::SynthesisFailure("x".into()).kind(),
            "synthesis_failure"
        );
        assert_eq!(OrchestrationError::InputError("x".into()).kind(), "input_error");
    }
}

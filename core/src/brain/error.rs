//! Structured error taxonomy for the brain pipeline.
//!
//! `GatingQuarantine` and `ResourceExhaustion` are deliberately absent: both
//! are expected outcomes, not failures, and are surfaced as ordinary report
//! fields instead.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Missing credentials or malformed configuration; fatal at startup.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Empty query, invalid mode, malformed payload; recoverable per-cycle.
    #[error("invalid input: {message}")]
    Input { message: String },

    /// Classifier JSON parse failure.
    #[error("classification failed: {message}")]
    Classification { message: String },

    /// Any failure inside a reasoner.
    #[error("reasoner {agent} failed: {message}")]
    Reasoner { agent: String, message: String },

    /// Structured critic JSON failure (non-fatal, falls back to unstructured parsing).
    #[error("critique failed for {agent}: {message}")]
    Critique { agent: String, message: String },

    /// Coherence detection/resolution failure.
    #[error("coherence analysis failed: {message}")]
    Coherence { message: String },

    /// Memory retrieval/write failure.
    #[error("memory error: {message}")]
    Memory { message: String },

    /// LLM gateway failure. `transient` governs retry eligibility.
    #[error("llm error ({kind}): {message}")]
    Llm {
        kind: LlmErrorKind,
        message: String,
        transient: bool,
    },

    /// Embedding provider failure.
    #[error("embedding error: {message}")]
    Embedding { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    RateLimit,
    Timeout,
    Connection,
    Validation,
    Other,
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LlmErrorKind::RateLimit => "rate-limit",
            LlmErrorKind::Timeout => "timeout",
            LlmErrorKind::Connection => "connection",
            LlmErrorKind::Validation => "validation",
            LlmErrorKind::Other => "other",
        };
        write!(f, "{}", s)
    }
}

impl CoreError {
    pub fn config(message: impl Into<String>) -> Self {
        CoreError::Config { message: message.into() }
    }

    pub fn input(message: impl Into<String>) -> Self {
        CoreError::Input { message: message.into() }
    }

    pub fn llm(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        let transient = matches!(
            kind,
            LlmErrorKind::RateLimit | LlmErrorKind::Timeout | LlmErrorKind::Connection
        );
        CoreError::Llm { kind, message: message.into(), transient }
    }

    /// Transient LLM conditions retry with exponential backoff; validation/parse
    /// failures are handled via fallback logic, never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Llm { transient: true, .. })
    }

    pub fn retry_delay(&self, attempt: u32) -> Option<Duration> {
        if !self.is_retryable() {
            return None;
        }
        let base_ms = 250u64 * 2u64.pow(attempt.min(6));
        Some(Duration::from_millis(base_ms))
    }

    pub fn user_message(&self) -> String {
        match self {
            CoreError::Config { .. } => "Configuration error. Please check credentials.".to_string(),
            CoreError::Input { message } => format!("Invalid input: {message}"),
            CoreError::Llm { .. } => "The reasoning backend is temporarily unavailable.".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

//! Error taxonomy
//!
//! Only [`FatalError`] ends a file's pipeline. Everything else is converted
//! into degraded evidence by the stage that observes it.

use thiserror::Error;

/// Profile lookup failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Unsupported file type: '{extension}'")]
    NotSupported { extension: String },

    #[error("Profile not found: '{name}'")]
    ProfileNotFound { name: String },
}

/// Failures surfaced by a reasoning backend for a single attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReasoningError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("server error ({status})")]
    Server { status: u16 },

    #[error("rate limited")]
    RateLimited,

    #[error("empty content in model response")]
    EmptyResponse,

    #[error("authentication rejected ({status})")]
    Auth { status: u16 },

    #[error("request rejected ({status}): {body}")]
    BadRequest { status: u16, body: String },

    #[error("unreadable response envelope: {0}")]
    Malformed(String),
}

impl ReasoningError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ReasoningError::Timeout
                | ReasoningError::Connect(_)
                | ReasoningError::Server { .. }
                | ReasoningError::RateLimited
                | ReasoningError::EmptyResponse
        )
    }
}

/// Terminal per-file failure.
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("Cannot read file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("File is empty.")]
    Empty,

    #[error("Reasoning backend error ({stage}): {source}")]
    Reasoning {
        stage: &'static str,
        #[source]
        source: ReasoningError,
    },

    #[error("Evaluation aborted: {0}")]
    Panicked(String),
}

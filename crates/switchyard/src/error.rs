//! Error types for switchyard operations.
//!
//! Errors fall into the categories callers need to react to differently:
//!
//! - **Not available**: a backend, grammar library or registration cannot be
//!   provided. Always surfaced when the caller asked for it explicitly.
//! - **Configuration**: invalid names, unsafe paths or symbols, malformed
//!   registrations. Fails fast at registration or load time.
//! - **Capability gap**: an optional backend feature is missing. Most
//!   operations degrade instead of raising; the ones that cannot (such as
//!   [`Tree::edit`](crate::Tree::edit)) return [`Error::NotSupported`].
//! - **Backend mismatch**: a language handle loaded for one backend was assigned
//!   to a parser bound to another and could not be reloaded.
//!
//! Discovery never produces an error: a missing grammar library is `None`.

use thiserror::Error;

use crate::types::BackendKind;

/// Result type for switchyard operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for switchyard operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Requested backend or grammar cannot be provided
    #[error("not available: {0}")]
    NotAvailable(String),

    /// Invalid name, unsafe path or malformed registration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Optional backend feature is missing and no fallback exists
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Language handle belongs to a different backend and cannot be reloaded
    #[error(
        "backend mismatch: language `{language}` was loaded for `{loaded_for}` \
         but the parser is bound to `{active}` and the grammar has no library to reload"
    )]
    BackendMismatch {
        /// Language name of the handle
        language: String,
        /// Backend the handle was loaded for
        loaded_for: BackendKind,
        /// Backend the parser is bound to
        active: BackendKind,
    },

    /// The backend failed to produce a tree
    #[error("parse error: {0}")]
    Parse(String),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be decoded
    #[error("invalid configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Backend or grammar cannot be provided.
    NotAvailable,
    /// Caller supplied invalid input.
    Configuration,
    /// Optional feature absent.
    CapabilityGap,
    /// Handle and parser disagree on the backend.
    BackendMismatch,
    /// Failure inside a backend or the host environment.
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAvailable => write!(f, "not available"),
            Self::Configuration => write!(f, "configuration"),
            Self::CapabilityGap => write!(f, "capability gap"),
            Self::BackendMismatch => write!(f, "backend mismatch"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl Error {
    /// Shorthand for [`Error::NotAvailable`].
    pub fn not_available(message: impl Into<String>) -> Self {
        Self::NotAvailable(message.into())
    }

    /// Shorthand for [`Error::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for [`Error::NotSupported`].
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }

    /// Category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotAvailable(_) => ErrorCategory::NotAvailable,
            Self::Configuration(_) | Self::Yaml(_) => ErrorCategory::Configuration,
            Self::NotSupported(_) => ErrorCategory::CapabilityGap,
            Self::BackendMismatch { .. } => ErrorCategory::BackendMismatch,
            Self::Parse(_) | Self::Io(_) => ErrorCategory::Internal,
        }
    }

    /// Returns `true` if the caller could fix this error by changing its input.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Configuration | ErrorCategory::BackendMismatch
        )
    }
}

/// Error reported by an in-process grammar engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{grammar}: {message} at byte {offset}")]
pub struct GrammarError {
    /// Name of the grammar that failed
    pub grammar: String,
    /// Human-readable description
    pub message: String,
    /// Byte offset where parsing stopped
    pub offset: usize,
}

impl GrammarError {
    /// Create a new grammar error.
    #[must_use]
    pub fn new(grammar: impl Into<String>, message: impl Into<String>, offset: usize) -> Self {
        Self {
            grammar: grammar.into(),
            message: message.into(),
            offset,
        }
    }
}

impl From<GrammarError> for Error {
    fn from(error: GrammarError) -> Self {
        Self::Parse(error.to_string())
    }
}

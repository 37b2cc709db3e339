//! Unified error handling for the enumeration engine.
//!
//! A `thiserror`-based model with:
//!   * Typed variants for the failure domains seen during an enumeration
//!   * A categorization layer (`ErrorCategory`) for logging & reporting
//!   * Helper constructors
//!
//! Only configuration errors and cancellation ever escape
//! `Enumeration::start`; everything else is logged where it happens and the
//! enumeration moves on to the next name.

use std::io;

use thiserror::Error;

/// Coarse classification for structured log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Network,
    Store,
    Cancelled,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Input => "input",
            ErrorCategory::Network => "network",
            ErrorCategory::Store => "store",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Primary error type for the enumeration engine.
#[derive(Error, Debug)]
pub enum EnumError {
    // ------------------------ Input / Validation ----------------------------
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid {kind} request: {subject}")]
    InvalidRequest { kind: String, subject: String },

    // ----------------------------- Network ----------------------------------
    #[error("Data source '{source_name}' failed: {reason}")]
    Source { source_name: String, reason: String },

    #[error("Resolver query for '{name}' failed: {reason}")]
    Resolver { name: String, reason: String },

    #[error("Query for '{name}' timed out after {seconds}s")]
    QueryTimeout { name: String, seconds: u64 },

    // ------------------------------ Store -----------------------------------
    #[error("Graph store operation '{operation}' failed for '{subject}': {reason}")]
    Store {
        operation: String,
        subject: String,
        reason: String,
    },

    // ---------------------------- Lifecycle ---------------------------------
    #[error("Enumeration cancelled")]
    Cancelled,

    // ---------------------------- Internal ----------------------------------
    #[error("I/O error during {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EnumError {
    /// Categorize the error for structured logging.
    pub fn category(&self) -> ErrorCategory {
        use EnumError::*;
        match self {
            Configuration { .. } | InvalidRequest { .. } => ErrorCategory::Input,
            Source { .. } | Resolver { .. } | QueryTimeout { .. } => ErrorCategory::Network,
            Store { .. } => ErrorCategory::Store,
            Cancelled => ErrorCategory::Cancelled,
            Io { .. } | Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// True when the error should abort the whole enumeration.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Input | ErrorCategory::Cancelled
        )
    }

    // ---------------------------- Constructors -----------------------------

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn invalid_request(kind: impl Into<String>, subject: impl Into<String>) -> Self {
        Self::InvalidRequest {
            kind: kind.into(),
            subject: subject.into(),
        }
    }

    pub fn source(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Source {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn resolver(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolver {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn query_timeout(name: impl Into<String>, seconds: u64) -> Self {
        Self::QueryTimeout {
            name: name.into(),
            seconds,
        }
    }

    pub fn store(
        operation: impl Into<String>,
        subject: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Store {
            operation: operation.into(),
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Public result alias.
pub type Result<T> = std::result::Result<T, EnumError>;

impl From<io::Error> for EnumError {
    fn from(e: io::Error) -> Self {
        EnumError::Io {
            operation: "unspecified".into(),
            source: e,
        }
    }
}

impl From<tokio::time::error::Elapsed> for EnumError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        // Name is not available at this conversion point; callers wrap via
        // `query_timeout` where context is known.
        EnumError::QueryTimeout {
            name: "<unknown>".into(),
            seconds: 0,
        }
    }
}

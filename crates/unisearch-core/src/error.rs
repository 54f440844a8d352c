//! Error types for unisearch-core.
//!
//! Every engine surfaces failures through this one taxonomy:
//!
//! - [`Error::Validation`]: malformed criteria or documents, rejected before
//!   any backend call is attempted.
//! - [`Error::EngineUnavailable`]: the backend could not be reached. Carries
//!   the transport error as its source.
//! - [`Error::BackendQuery`]: the backend answered but rejected the request.
//!   The backend's own message is preserved.
//!
//! Errors raised inside an engine are stamped with the operation and index
//! name via [`Error::in_operation`], so a caller can diagnose a failure
//! without a backend stack trace.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for unisearch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine operation during which an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Adding or replacing a document.
    Index,
    /// Removing a document.
    Remove,
    /// Executing a search.
    Search,
    /// Bootstrapping the backend index.
    CreateIndex,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index => write!(f, "index"),
            Self::Remove => write!(f, "remove"),
            Self::Search => write!(f, "search"),
            Self::CreateIndex => write!(f, "create_index"),
        }
    }
}

/// Operation and index name attached to an error, when known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Operation in progress.
    pub operation: Option<Operation>,
    /// Index the operation targeted.
    pub index: Option<String>,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.operation, &self.index) {
            (Some(op), Some(index)) => write!(f, " [{op} on '{index}']"),
            (Some(op), None) => write!(f, " [{op}]"),
            (None, Some(index)) => write!(f, " [index '{index}']"),
            (None, None) => Ok(()),
        }
    }
}

/// Errors that can occur in unisearch.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Malformed criteria or document.
    #[error("Validation error{context}{}: {message}", field_suffix(.field))]
    Validation {
        /// Where the error was raised.
        context: ErrorContext,
        /// Offending field path, if any.
        field: Option<String>,
        /// What went wrong.
        message: String,
    },

    /// Transport or connectivity failure reaching the backend.
    #[error("Engine unavailable{context}: {message}")]
    EngineUnavailable {
        /// Where the error was raised.
        context: ErrorContext,
        /// Human-readable error message.
        message: String,
        /// Underlying transport error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backend rejected the request.
    #[error("Backend query error{context}{}: {message}", status_suffix(.status))]
    BackendQuery {
        /// Where the error was raised.
        context: ErrorContext,
        /// HTTP status reported by the backend.
        status: Option<u16>,
        /// Backend-provided message.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic.
        message: String,
    },

    /// I/O error with the path involved.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn field_suffix(field: &Option<String>) -> String {
    field
        .as_ref()
        .map(|f| format!(" (field '{f}')"))
        .unwrap_or_default()
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl Error {
    /// Creates a new validation error.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Error::Validation {
            context: ErrorContext::default(),
            field: None,
            message: message.into(),
        }
    }

    /// Creates a new validation error naming the offending field path.
    pub fn validation_field<F, M>(field: F, message: M) -> Self
    where
        F: Into<String>,
        M: Into<String>,
    {
        Error::Validation {
            context: ErrorContext::default(),
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Creates a new unavailable error without a source.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Error::EngineUnavailable {
            context: ErrorContext::default(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new unavailable error with the transport error attached.
    pub fn unavailable_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::EngineUnavailable {
            context: ErrorContext::default(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new backend query error.
    pub fn backend_query<S: Into<String>>(status: Option<u16>, message: S) -> Self {
        Error::BackendQuery {
            context: ErrorContext::default(),
            status,
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Creates an I/O error for the given path.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Stamp the operation and index name onto this error.
    ///
    /// Context already present is kept; errors without a context slot
    /// are returned unchanged.
    pub fn in_operation(mut self, operation: Operation, index: &str) -> Self {
        if let Some(context) = self.context_mut() {
            context.operation.get_or_insert(operation);
            if context.index.is_none() {
                context.index = Some(index.to_string());
            }
        }
        self
    }

    /// Context attached to this error, if the variant carries one.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Validation { context, .. }
            | Error::EngineUnavailable { context, .. }
            | Error::BackendQuery { context, .. } => Some(context),
            _ => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            Error::Validation { context, .. }
            | Error::EngineUnavailable { context, .. }
            | Error::BackendQuery { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Returns whether a caller may reasonably retry.
    ///
    /// Only transport failures qualify. The engines themselves never retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::EngineUnavailable { .. })
    }
}

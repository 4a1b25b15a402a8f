//! Tether error handling.
//!
//! Every fallible operation outside of a running test returns [`TetherError`].
//! Failures *inside* a test (a hook or body returning `Err`, or panicking) are
//! not errors of the service: they are recorded as [`Failure`](crate::Failure)s
//! on the test's outcome and travel back to the caller inside a report.
//!
//! Variants carry `miette` diagnostic codes so the CLI can render them with
//! help text, and map onto a small [`ErrorCategory`] used as the machine
//! readable code on the wire.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Coarse classification of a [`TetherError`], stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A source could not be read or is not a test module
    Load,
    /// An identifier is not registered
    NotFound,
    /// A request could not be understood
    Protocol,
    /// Socket level failure
    Transport,
}

impl ErrorCategory {
    /// Returns the code used in transport error responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Load => "load_error",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Transport => "transport",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for loading, lookup and transport.
#[derive(Debug, Error, Diagnostic)]
pub enum TetherError {
    #[error("failed to read '{}'", .path.display())]
    #[diagnostic(code(tether::load::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk directory '{}'", .path.display())]
    #[diagnostic(code(tether::load::walk))]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("'{}' is not a test module: {reason}", .path.display())]
    #[diagnostic(
        code(tether::load::not_a_module),
        help("a test module is a YAML or JSON mapping of test names to catalog functions or nested groups")
    )]
    NotAModule { path: PathBuf, reason: String },

    #[error("'{}': '{test}' refers to unknown function '{function}'", .path.display())]
    #[diagnostic(code(tether::load::unknown_function))]
    UnknownFunction {
        path: PathBuf,
        test: String,
        function: String,
        #[help]
        help: Option<String>,
    },

    #[error("failed to run test \"{identifier}\": not on service")]
    #[diagnostic(
        code(tether::registry::not_found),
        help("identifiers come from the `enumerate` listing of this service")
    )]
    NotFound { identifier: String },

    #[error("malformed request: {message}")]
    #[diagnostic(code(tether::service::protocol))]
    Protocol {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("transport failure on {context}")]
    #[diagnostic(code(tether::service::transport))]
    Transport {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl TetherError {
    /// Returns the category used to classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            TetherError::Io { .. }
            | TetherError::Walk { .. }
            | TetherError::NotAModule { .. }
            | TetherError::UnknownFunction { .. } => ErrorCategory::Load,
            TetherError::NotFound { .. } => ErrorCategory::NotFound,
            TetherError::Protocol { .. } => ErrorCategory::Protocol,
            TetherError::Transport { .. } => ErrorCategory::Transport,
        }
    }

    pub(crate) fn not_a_module(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TetherError::NotAModule {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn transport(context: impl Into<String>, source: std::io::Error) -> Self {
        TetherError::Transport {
            context: context.into(),
            source,
        }
    }
}

/// Renders an error with its full diagnostic chain on stderr.
pub fn print_error(error: TetherError) {
    let report = miette::Report::new(error);
    eprintln!("{report:?}");
}

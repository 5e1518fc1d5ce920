//! Error types and error handling
//!
//! Each pipeline stage owns its error enum. [`EmaileriaError`] gathers the
//! ones that abort a run before any message leaves the system, and
//! [`ErrorKind`] is the stable classification shared with per-row failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::contacts::LoadError;
use crate::dispatch::DispatchError;
use crate::email::EmailError;
use crate::preview::PreviewError;
use crate::template::TemplateError;

/// Classification of a failure, fatal or per-row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad contact file, sheet, or missing required columns
    Load,
    /// Malformed template syntax
    TemplateSyntax,
    /// Placeholder referenced by a template but absent from row and globals
    MissingPlaceholder,
    /// Syntactically invalid e-mail address
    Address,
    /// Transport session could not be authenticated
    Auth,
    /// Transport rejected or failed to deliver a message
    Transport,
    /// Invalid run configuration
    Config,
    /// Pre-flight validation did not pass
    Validation,
    /// Anything else, including a panicking transport
    Unexpected,
}

impl ErrorKind {
    /// Short label used in reports and audit logs
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Load => "LoadError",
            Self::TemplateSyntax => "TemplateSyntaxError",
            Self::MissingPlaceholder => "MissingPlaceholderError",
            Self::Address => "AddressError",
            Self::Auth => "AuthError",
            Self::Transport => "TransportError",
            Self::Config => "ConfigError",
            Self::Validation => "ValidationError",
            Self::Unexpected => "UnexpectedError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Fatal run error
///
/// A run that returns one of these has sent nothing.
#[derive(Debug, Error)]
pub enum EmaileriaError {
    /// Contact table could not be loaded
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Template could not be read, compiled, or validated
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Configuration was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transport session or run-wide address failure
    #[error(transparent)]
    Email(#[from] EmailError),

    /// Dispatcher refused to start
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Preview gallery could not be produced
    #[error(transparent)]
    Preview(#[from] PreviewError),
}

impl EmaileriaError {
    /// Classify the failure
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Load(_) => ErrorKind::Load,
            Self::Template(err) => err.kind(),
            Self::Config(_) => ErrorKind::Config,
            Self::Email(err) => err.kind(),
            Self::Dispatch(err) => err.kind(),
            Self::Preview(err) => err.kind(),
        }
    }
}

/// Result alias for fatal pipeline operations
pub type Result<T> = std::result::Result<T, EmaileriaError>;

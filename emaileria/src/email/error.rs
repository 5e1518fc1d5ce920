//! Email error types

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur when building or delivering emails
#[derive(Debug, Error)]
pub enum EmailError {
    /// Email has no recipients
    #[error("email must have at least one recipient")]
    NoRecipients,

    /// Email has no sender
    #[error("email must have a from address")]
    NoSender,

    /// Email has no subject
    #[error("email must have a subject")]
    NoSubject,

    /// Email has no body content
    #[error("email must have an HTML body")]
    NoContent,

    /// Invalid email address format
    #[error("invalid email address: {0:?}")]
    InvalidAddress(String),

    /// Message could not be assembled by the transport library
    #[error("failed to build message: {0}")]
    BuildError(String),

    /// Transport session could not be opened or authenticated
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport failed to deliver a message
    #[error("transport error: {detail}")]
    Transport {
        /// Provider-supplied detail
        detail: String,
        /// Whether retrying the same message may succeed
        temporary: bool,
    },

    /// Email configuration error
    #[error("email configuration error: {0}")]
    ConfigError(String),
}

impl EmailError {
    /// Create a permanent transport error from a string message
    #[must_use]
    pub fn transport<T: Into<String>>(msg: T) -> Self {
        Self::Transport {
            detail: msg.into(),
            temporary: false,
        }
    }

    /// Create a temporary (retryable) transport error from a string message
    #[must_use]
    pub fn temporary<T: Into<String>>(msg: T) -> Self {
        Self::Transport {
            detail: msg.into(),
            temporary: true,
        }
    }

    /// Create a configuration error from a string message
    #[must_use]
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the failure is worth retrying
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Transport { temporary: true, .. })
    }

    /// Classify the failure
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress(_) => ErrorKind::Address,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Transport { .. } | Self::BuildError(_) => ErrorKind::Transport,
            Self::ConfigError(_) => ErrorKind::Config,
            Self::NoRecipients | Self::NoSender | Self::NoSubject | Self::NoContent => {
                ErrorKind::Unexpected
            }
        }
    }
}

//! Email sender trait abstraction
//!
//! This module defines the transport contract every backend implements. A
//! sender is an already-open session: opening (and authenticating) happens in
//! the backend's constructor, so an `EmailSender` in hand is ready to send.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EmailError, TransportMessage};

/// Acknowledgement returned by a transport for one accepted message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Provider reply, e.g. `250 2.0.0 OK`
    pub detail: String,
}

impl SendReceipt {
    /// Create a receipt with the given provider detail
    #[must_use]
    pub fn new<T: Into<String>>(detail: T) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Trait for sending emails
///
/// Implemented by all email backends (SMTP, console, test recorders).
///
/// # Examples
///
/// ```rust
/// use emaileria::email::{ConsoleBackend, Email, EmailSender};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let sender = ConsoleBackend::new();
///
/// let message = Email::new()
///     .to("user@example.com")
///     .from("noreply@example.com")
///     .subject("Hello!")
///     .html("<p>Hello, World!</p>")
///     .build()?;
///
/// sender.send(&message).await?;
/// sender.close().await?;
/// # Ok(())
/// # }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send one message
    ///
    /// # Errors
    ///
    /// Returns [`EmailError::Transport`] when the provider rejects or fails to
    /// deliver the message; `temporary` marks failures worth retrying.
    async fn send(&self, message: &TransportMessage) -> Result<SendReceipt, EmailError>;

    /// Release the session
    ///
    /// Default implementation does nothing.
    ///
    /// # Errors
    ///
    /// Returns `EmailError` if the backend fails to shut down cleanly
    async fn close(&self) -> Result<(), EmailError> {
        Ok(())
    }
}

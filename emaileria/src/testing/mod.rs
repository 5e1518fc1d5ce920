//! Testing utilities for emaileria pipelines
//!
//! [`RecordingSender`] is an in-memory transport that records every attempt
//! with its start instant and can be scripted to fail, panic, or request
//! cancellation. Front-ends can use it to exercise the dispatcher without a
//! mail server.
//!
//! # Example
//!
//! ```rust
//! use emaileria::email::{Email, EmailSender};
//! use emaileria::testing::RecordingSender;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sender = RecordingSender::new().fail_permanently("bounce@example.com");
//!
//! let message = Email::new()
//!     .to("user@example.com")
//!     .from("noreply@example.com")
//!     .subject("Test")
//!     .html("<p>Hello</p>")
//!     .build()?;
//! sender.send(&message).await?;
//!
//! assert_eq!(sender.sent_count(), 1);
//! assert!(sender.was_sent_to("user@example.com"));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::dispatch::CancellationToken;
use crate::email::{EmailError, EmailSender, SendReceipt, TransportMessage};

/// One call to [`EmailSender::send`]
#[derive(Debug, Clone)]
pub struct Attempt {
    /// Primary recipient of the message
    pub recipient: String,
    /// When the call started
    pub at: Instant,
}

#[derive(Debug, Clone)]
enum Script {
    Permanent,
    Temporary { remaining: u32 },
    Panic,
}

#[derive(Debug, Default)]
struct Recording {
    sent: Vec<TransportMessage>,
    attempts: Vec<Attempt>,
    scripts: HashMap<String, Script>,
    cancel_after: Option<(usize, CancellationToken)>,
    closed: usize,
}

/// In-memory transport recording every attempt
///
/// Clones share the same recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingSender {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingSender {
    /// Sender that accepts everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, recipient: &str, script: Script) -> Self {
        self.inner
            .lock()
            .scripts
            .insert(recipient.to_lowercase(), script);
        self
    }

    /// Reject every message to `recipient` with a permanent error
    #[must_use]
    pub fn fail_permanently(self, recipient: &str) -> Self {
        self.script(recipient, Script::Permanent)
    }

    /// Fail the first `times` attempts to `recipient` with a temporary error
    #[must_use]
    pub fn fail_temporarily(self, recipient: &str, times: u32) -> Self {
        self.script(recipient, Script::Temporary { remaining: times })
    }

    /// Panic inside `send` for `recipient`
    #[must_use]
    pub fn panic_on(self, recipient: &str) -> Self {
        self.script(recipient, Script::Panic)
    }

    /// Cancel `token` once `sends` attempts have been made
    #[must_use]
    pub fn cancel_after(self, sends: usize, token: CancellationToken) -> Self {
        self.inner.lock().cancel_after = Some((sends, token));
        self
    }

    /// Number of accepted messages
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.inner.lock().sent.len()
    }

    /// Accepted messages, in order
    #[must_use]
    pub fn sent(&self) -> Vec<TransportMessage> {
        self.inner.lock().sent.clone()
    }

    /// Every attempt, accepted or not, in order
    #[must_use]
    pub fn attempts(&self) -> Vec<Attempt> {
        self.inner.lock().attempts.clone()
    }

    /// Recipients of every attempt, in order
    #[must_use]
    pub fn attempted_recipients(&self) -> Vec<String> {
        self.inner
            .lock()
            .attempts
            .iter()
            .map(|attempt| attempt.recipient.clone())
            .collect()
    }

    /// Whether a message to `address` was accepted
    #[must_use]
    pub fn was_sent_to(&self, address: &str) -> bool {
        self.inner
            .lock()
            .sent
            .iter()
            .any(|message| message.email().to.iter().any(|to| to == address))
    }

    /// Whether a message with `subject` was accepted
    #[must_use]
    pub fn was_sent_with_subject(&self, subject: &str) -> bool {
        self.inner
            .lock()
            .sent
            .iter()
            .any(|message| message.subject() == subject)
    }

    /// Times the session was closed
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.inner.lock().closed
    }
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send(&self, message: &TransportMessage) -> Result<SendReceipt, EmailError> {
        let recipient = message.recipient().to_string();
        let (script, cancel) = {
            let mut recording = self.inner.lock();
            recording.attempts.push(Attempt {
                recipient: recipient.clone(),
                at: Instant::now(),
            });
            let attempts = recording.attempts.len();
            let cancel = recording
                .cancel_after
                .as_ref()
                .filter(|(after, _)| attempts >= *after)
                .map(|(_, token)| token.clone());

            let script = match recording.scripts.get_mut(&recipient.to_lowercase()) {
                Some(Script::Temporary { remaining }) if *remaining == 0 => None,
                Some(Script::Temporary { remaining }) => {
                    *remaining -= 1;
                    Some(Script::Temporary {
                        remaining: *remaining,
                    })
                }
                other => other.cloned(),
            };
            (script, cancel)
        };

        if let Some(token) = cancel {
            token.cancel();
        }

        match script {
            Some(Script::Permanent) => Err(EmailError::transport(format!(
                "550 5.1.1 mailbox unavailable: {recipient}"
            ))),
            Some(Script::Temporary { .. }) => Err(EmailError::temporary(
                "421 4.7.0 try again later",
            )),
            Some(Script::Panic) => panic!("scripted transport panic for {recipient}"),
            None => {
                self.inner.lock().sent.push(message.clone());
                Ok(SendReceipt::new("250 2.0.0 OK"))
            }
        }
    }

    async fn close(&self) -> Result<(), EmailError> {
        self.inner.lock().closed += 1;
        Ok(())
    }
}

//! Message building and delivery
//!
//! This module provides:
//! - A fluent [`Email`] builder producing immutable [`TransportMessage`]s
//! - The [`EmailSender`] transport contract with SMTP and console backends
//! - Address list parsing for the run-wide CC/BCC/Reply-To fields
//!
//! # Examples
//!
//! ```rust
//! use emaileria::email::{build_message, Addressing};
//! use emaileria::template::RenderedMessage;
//!
//! let addressing = Addressing::new("Equipe <noreply@example.com>")
//!     .with_cc("chefe@example.com; ; chefe@example.com")
//!     .with_reply_to("suporte@example.com");
//! addressing.validate()?;
//!
//! let rendered = RenderedMessage {
//!     subject: "Olá Ana".to_string(),
//!     body: "<p>Olá Ana</p>".to_string(),
//! };
//! let message = build_message(&addressing, "ana@example.com", &rendered)?;
//!
//! assert_eq!(message.email().cc, vec!["chefe@example.com"]);
//! # Ok::<(), emaileria::email::EmailError>(())
//! ```

mod backend;
mod builder;
mod error;
mod sender;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub use backend::{
    console::ConsoleBackend,
    smtp::{SmtpBackend, SmtpCredentials},
};
pub use builder::{parse_mailbox, Email, TransportMessage};
pub use error::EmailError;
#[cfg(test)]
pub use sender::MockEmailSender;
pub use sender::{EmailSender, SendReceipt};

use crate::template::RenderedMessage;

/// Split free-form address text into distinct addresses
///
/// Entries may be separated by commas, semicolons or line breaks; separators
/// inside a quoted display name (`"Silva, Ana" <ana@x.com>`) are kept. Entries
/// are trimmed, empty ones are dropped, and repeats (compared
/// case-insensitively) keep their first occurrence.
///
/// ```rust
/// use emaileria::email::parse_address_list;
///
/// assert_eq!(
///     parse_address_list(" a@x.com,, b@x.com;\nA@X.COM "),
///     vec!["a@x.com", "b@x.com"],
/// );
/// ```
#[must_use]
pub fn parse_address_list(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    split_outside_quotes(raw)
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter(|entry| seen.insert(entry.to_lowercase()))
        .map(str::to_string)
        .collect()
}

fn split_outside_quotes(raw: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (index, ch) in raw.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ',' | ';' | '\n' | '\r' if !quoted => {
                entries.push(&raw[start..index]);
                start = index + ch.len_utf8();
            }
            _ => {}
        }
    }
    entries.push(&raw[start..]);
    entries
}

/// Addressing shared by every message of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addressing {
    /// From address, optionally with a display name
    pub sender: String,

    /// CC recipients
    pub cc: Vec<String>,

    /// BCC recipients
    pub bcc: Vec<String>,

    /// Reply-To addresses
    pub reply_to: Vec<String>,
}

impl Addressing {
    /// Addressing with a sender and no copies
    #[must_use]
    pub fn new<S: Into<String>>(sender: S) -> Self {
        Self {
            sender: sender.into(),
            ..Self::default()
        }
    }

    /// Set CC from free-form text
    #[must_use]
    pub fn with_cc(mut self, raw: &str) -> Self {
        self.cc = parse_address_list(raw);
        self
    }

    /// Set BCC from free-form text
    #[must_use]
    pub fn with_bcc(mut self, raw: &str) -> Self {
        self.bcc = parse_address_list(raw);
        self
    }

    /// Set Reply-To from free-form text
    #[must_use]
    pub fn with_reply_to(mut self, raw: &str) -> Self {
        self.reply_to = parse_address_list(raw);
        self
    }

    /// Check the syntax of every run-wide address
    ///
    /// # Errors
    ///
    /// Returns [`EmailError::InvalidAddress`] for the first invalid entry.
    pub fn validate(&self) -> Result<(), EmailError> {
        parse_mailbox(&self.sender)?;
        for address in self.cc.iter().chain(&self.bcc).chain(&self.reply_to) {
            parse_mailbox(address)?;
        }
        Ok(())
    }

    /// Bare address of the sender, without display name
    ///
    /// # Errors
    ///
    /// Returns [`EmailError::InvalidAddress`] if the sender does not parse.
    pub fn sender_address(&self) -> Result<String, EmailError> {
        Ok(parse_mailbox(&self.sender)?.email.to_string())
    }
}

/// Build the transport message for one recipient
///
/// # Errors
///
/// Returns [`EmailError::InvalidAddress`] if the recipient or any run-wide
/// address is malformed.
pub fn build_message(
    addressing: &Addressing,
    recipient: &str,
    rendered: &RenderedMessage,
) -> Result<TransportMessage, EmailError> {
    Email::new()
        .from(&addressing.sender)
        .to(recipient.trim())
        .cc_all(&addressing.cc)
        .bcc_all(&addressing.bcc)
        .reply_to_all(&addressing.reply_to)
        .subject(&rendered.subject)
        .html(&rendered.body)
        .build()
}

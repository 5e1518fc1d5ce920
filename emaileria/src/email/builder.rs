//! Email builder with fluent API
//!
//! [`Email`] collects addressing and content as plain strings. Nothing is
//! parsed until [`Email::build`], which validates every address and produces
//! an immutable [`TransportMessage`].

use lettre::message::{header::ContentType, Mailbox};
use lettre::Message;
use serde::{Deserialize, Serialize};

use super::EmailError;

/// An email message under construction
///
/// ```rust
/// use emaileria::email::Email;
///
/// let message = Email::new()
///     .to("user@example.com")
///     .from("Equipe <noreply@example.com>")
///     .cc("manager@example.com")
///     .subject("Olá")
///     .html("<p>Olá!</p>")
///     .build()?;
///
/// assert_eq!(message.recipient(), "user@example.com");
/// # Ok::<(), emaileria::email::EmailError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    /// Email recipients (To)
    pub to: Vec<String>,

    /// Email sender (From)
    pub from: Option<String>,

    /// Reply-To addresses
    pub reply_to: Vec<String>,

    /// CC recipients
    pub cc: Vec<String>,

    /// BCC recipients, envelope only
    pub bcc: Vec<String>,

    /// Email subject
    pub subject: Option<String>,

    /// HTML body
    pub html: Option<String>,
}

impl Email {
    /// Create a new empty email
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recipient (To)
    #[must_use]
    pub fn to(mut self, address: &str) -> Self {
        self.to.push(address.to_string());
        self
    }

    /// Set the sender (From)
    #[must_use]
    pub fn from(mut self, address: &str) -> Self {
        self.from = Some(address.to_string());
        self
    }

    /// Add a Reply-To address
    #[must_use]
    pub fn reply_to(mut self, address: &str) -> Self {
        self.reply_to.push(address.to_string());
        self
    }

    /// Add a CC recipient
    #[must_use]
    pub fn cc(mut self, address: &str) -> Self {
        self.cc.push(address.to_string());
        self
    }

    /// Add a BCC recipient
    #[must_use]
    pub fn bcc(mut self, address: &str) -> Self {
        self.bcc.push(address.to_string());
        self
    }

    /// Add several CC recipients
    #[must_use]
    pub fn cc_all<S: AsRef<str>>(mut self, addresses: &[S]) -> Self {
        self.cc
            .extend(addresses.iter().map(|address| address.as_ref().to_string()));
        self
    }

    /// Add several BCC recipients
    #[must_use]
    pub fn bcc_all<S: AsRef<str>>(mut self, addresses: &[S]) -> Self {
        self.bcc
            .extend(addresses.iter().map(|address| address.as_ref().to_string()));
        self
    }

    /// Add several Reply-To addresses
    #[must_use]
    pub fn reply_to_all<S: AsRef<str>>(mut self, addresses: &[S]) -> Self {
        self.reply_to
            .extend(addresses.iter().map(|address| address.as_ref().to_string()));
        self
    }

    /// Set the email subject
    #[must_use]
    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    /// Set the HTML body
    #[must_use]
    pub fn html(mut self, body: &str) -> Self {
        self.html = Some(body.to_string());
        self
    }

    /// Validate the email
    ///
    /// Checks that all required fields are present. Address syntax is checked
    /// by [`Email::build`].
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// - No To recipient
    /// - No sender
    /// - No subject
    /// - No HTML body
    pub fn validate(&self) -> Result<(), EmailError> {
        if self.to.is_empty() {
            return Err(EmailError::NoRecipients);
        }

        if self.from.is_none() {
            return Err(EmailError::NoSender);
        }

        if self.subject.is_none() {
            return Err(EmailError::NoSubject);
        }

        if self.html.is_none() {
            return Err(EmailError::NoContent);
        }

        Ok(())
    }

    /// Assemble a transport-ready message
    ///
    /// Sets `Date` and `Message-ID`. BCC addresses go into the envelope and
    /// are left out of the written headers.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError::InvalidAddress`] naming the first address that
    /// does not parse, or a completeness error from [`Email::validate`].
    pub fn build(&self) -> Result<TransportMessage, EmailError> {
        self.validate()?;

        let from = self.from.as_deref().ok_or(EmailError::NoSender)?;
        let mut builder = Message::builder()
            .from(parse_mailbox(from)?)
            .date_now()
            .message_id(None);

        for address in &self.to {
            builder = builder.to(parse_mailbox(address)?);
        }
        for address in &self.cc {
            builder = builder.cc(parse_mailbox(address)?);
        }
        for address in &self.bcc {
            builder = builder.bcc(parse_mailbox(address)?);
        }
        for address in &self.reply_to {
            builder = builder.reply_to(parse_mailbox(address)?);
        }

        let subject = self.subject.as_deref().ok_or(EmailError::NoSubject)?;
        let html = self.html.clone().ok_or(EmailError::NoContent)?;
        let message = builder
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .map_err(|e| EmailError::BuildError(e.to_string()))?;

        Ok(TransportMessage {
            email: self.clone(),
            message,
        })
    }
}

/// Parse one address, with or without a display name
///
/// # Errors
///
/// Returns [`EmailError::InvalidAddress`] carrying the trimmed input.
pub fn parse_mailbox(raw: &str) -> Result<Mailbox, EmailError> {
    let trimmed = raw.trim();
    trimmed
        .parse::<Mailbox>()
        .map_err(|_| EmailError::InvalidAddress(trimmed.to_string()))
}

/// An immutable message ready for a transport
#[derive(Debug, Clone)]
pub struct TransportMessage {
    email: Email,
    message: Message,
}

impl TransportMessage {
    /// The validated source fields
    #[must_use]
    pub const fn email(&self) -> &Email {
        &self.email
    }

    /// The assembled message
    #[must_use]
    pub const fn message(&self) -> &Message {
        &self.message
    }

    /// Primary recipient
    #[must_use]
    pub fn recipient(&self) -> &str {
        self.email.to.first().map_or("", String::as_str)
    }

    /// Subject line
    #[must_use]
    pub fn subject(&self) -> &str {
        self.email.subject.as_deref().unwrap_or_default()
    }

    /// Number of envelope recipients, BCC included
    #[must_use]
    pub fn envelope_size(&self) -> usize {
        self.message.envelope().to().len()
    }

    /// RFC 5322 wire form
    #[must_use]
    pub fn formatted(&self) -> Vec<u8> {
        self.message.formatted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> Email {
        Email::new()
            .to("user@example.com")
            .from("Equipe <noreply@example.com>")
            .subject("Boletim")
            .html("<p>Olá</p>")
    }

    #[test]
    fn test_email_builder() {
        let email = complete().cc("manager@example.com").reply_to("help@example.com");

        assert_eq!(email.to, vec!["user@example.com"]);
        assert_eq!(email.from.as_deref(), Some("Equipe <noreply@example.com>"));
        assert_eq!(email.cc, vec!["manager@example.com"]);
        assert_eq!(email.reply_to, vec!["help@example.com"]);
    }

    #[test]
    fn test_email_validation_errors() {
        assert!(matches!(
            Email::new().from("a@x.com").subject("s").html("b").validate(),
            Err(EmailError::NoRecipients)
        ));
        assert!(matches!(
            Email::new().to("a@x.com").subject("s").html("b").validate(),
            Err(EmailError::NoSender)
        ));
        assert!(matches!(
            Email::new().to("a@x.com").from("b@x.com").html("b").validate(),
            Err(EmailError::NoSubject)
        ));
        assert!(matches!(
            Email::new().to("a@x.com").from("b@x.com").subject("s").validate(),
            Err(EmailError::NoContent)
        ));
    }

    #[test]
    fn test_build_sets_standard_headers() {
        let message = complete()
            .cc("manager@example.com")
            .reply_to("help@example.com")
            .build()
            .unwrap();

        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Date: "));
        assert!(formatted.contains("Message-ID: "));
        assert!(formatted.contains("Subject: Boletim"));
        assert!(formatted.contains("Cc: manager@example.com"));
        assert!(formatted.contains("Reply-To: help@example.com"));
        assert!(formatted.contains("text/html"));
    }

    #[test]
    fn test_bcc_is_envelope_only() {
        let message = complete()
            .bcc("audit@example.com")
            .cc("manager@example.com")
            .build()
            .unwrap();

        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(!formatted.contains("audit@example.com"));
        assert_eq!(message.envelope_size(), 3);
    }

    #[test]
    fn test_invalid_recipient_is_named() {
        let err = Email::new()
            .to(" bad ")
            .from("noreply@example.com")
            .subject("s")
            .html("b")
            .build()
            .unwrap_err();

        assert!(matches!(&err, EmailError::InvalidAddress(address) if address == "bad"));
        assert_eq!(err.kind(), crate::error::ErrorKind::Address);
    }

    #[test]
    fn test_invalid_cc_fails_build() {
        let result = complete().cc("not an address").build();
        assert!(matches!(result, Err(EmailError::InvalidAddress(_))));
    }

    #[test]
    fn test_recipient_and_subject_accessors() {
        let message = complete().build().unwrap();
        assert_eq!(message.recipient(), "user@example.com");
        assert_eq!(message.subject(), "Boletim");
    }
}

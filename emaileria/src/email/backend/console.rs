//! Console backend for rehearsals
//!
//! Prints messages to standard output instead of delivering them. Useful for
//! exercising the throttle and the builder without a mail server.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::email::{EmailError, EmailSender, SendReceipt, TransportMessage};
use crate::preview::snippet;

const WIDTH: usize = 51;

/// Console email backend
///
/// # Examples
///
/// ```rust
/// use emaileria::email::{ConsoleBackend, Email, EmailSender};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = ConsoleBackend::new();
///
/// let message = Email::new()
///     .to("user@example.com")
///     .from("noreply@example.com")
///     .subject("Hello!")
///     .html("<p>Hello, World!</p>")
///     .build()?;
///
/// backend.send(&message).await?; // Prints to console
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConsoleBackend {
    /// Whether to print the full body instead of a snippet
    verbose: bool,
}

impl ConsoleBackend {
    /// Create a new console backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a console backend that prints full message bodies
    #[must_use]
    pub const fn verbose() -> Self {
        Self { verbose: true }
    }

    fn render(&self, message: &TransportMessage) -> String {
        let email = message.email();
        let mut lines = vec![
            format!("╭{}╮", "─".repeat(WIDTH + 2)),
            boxed(&format!("From:     {}", email.from.as_deref().unwrap_or_default())),
            boxed(&format!("To:       {}", email.to.join(", "))),
        ];
        if !email.cc.is_empty() {
            lines.push(boxed(&format!("Cc:       {}", email.cc.join(", "))));
        }
        if !email.bcc.is_empty() {
            lines.push(boxed(&format!("Bcc:      {}", email.bcc.join(", "))));
        }
        if !email.reply_to.is_empty() {
            lines.push(boxed(&format!("Reply-To: {}", email.reply_to.join(", "))));
        }
        lines.push(boxed(&format!("Subject:  {}", message.subject())));
        lines.push(format!("├{}┤", "─".repeat(WIDTH + 2)));

        let html = email.html.as_deref().unwrap_or_default();
        if self.verbose {
            lines.extend(html.lines().map(boxed));
        } else {
            lines.push(boxed(&snippet(html, 200)));
        }
        lines.push(format!("╰{}╯", "─".repeat(WIDTH + 2)));
        lines.join("\n")
    }
}

fn boxed(line: &str) -> String {
    let mut text: String = line.chars().take(WIDTH).collect();
    if line.chars().count() > WIDTH {
        text = line.chars().take(WIDTH - 3).collect::<String>() + "...";
    }
    format!("│ {text:<WIDTH$} │")
}

#[async_trait]
impl EmailSender for ConsoleBackend {
    async fn send(&self, message: &TransportMessage) -> Result<SendReceipt, EmailError> {
        info!(
            recipient = %message.recipient(),
            envelope = message.envelope_size(),
            "Console email sent"
        );
        debug!(bytes = message.formatted().len(), "Console message size");

        println!("\n{}\n", self.render(message));

        Ok(SendReceipt::new("console: printed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::Email;

    fn message() -> TransportMessage {
        Email::new()
            .to("user@example.com")
            .cc("cc@example.com")
            .bcc("bcc@example.com")
            .from("noreply@example.com")
            .subject("Test Email")
            .html("<h1>Olá</h1>\n<p>Conteúdo</p>")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_console_backend_send() {
        let backend = ConsoleBackend::new();
        let receipt = backend.send(&message()).await.unwrap();
        assert!(receipt.detail.starts_with("console"));
    }

    #[test]
    fn test_render_shows_addressing_and_snippet() {
        let rendered = ConsoleBackend::new().render(&message());
        assert!(rendered.contains("user@example.com"));
        assert!(rendered.contains("Bcc:      bcc@example.com"));
        assert!(rendered.contains("Subject:  Test Email"));
        assert!(rendered.contains("Olá Conteúdo"));
        assert!(!rendered.contains("<h1>"));
    }

    #[test]
    fn test_verbose_render_shows_markup() {
        let rendered = ConsoleBackend::verbose().render(&message());
        assert!(rendered.contains("<h1>Olá</h1>"));
    }

    #[test]
    fn test_long_lines_are_truncated_on_char_boundaries() {
        let line = "é".repeat(80);
        let boxed = boxed(&line);
        assert!(boxed.ends_with("... │"));
        assert_eq!(boxed.chars().count(), WIDTH + 4);
    }
}

//! SMTP backend for sending emails
//!
//! Uses the `lettre` crate. The session is opened and authenticated once in
//! [`SmtpBackend::connect`]; the pooled transport is then reused for every
//! message of the run and released by [`EmailSender::close`].

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::response::Response;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::config::{SmtpSecurity, SmtpSettings};
use crate::email::{EmailError, EmailSender, SendReceipt, TransportMessage};

/// SMTP login identity
///
/// The password is held as a [`SecretString`] so it never shows up in
/// `Debug` output.
#[derive(Debug, Clone)]
pub struct SmtpCredentials {
    /// Authentication user, usually the sender address
    pub username: String,

    /// Authentication secret (app password)
    pub password: SecretString,
}

impl SmtpCredentials {
    /// Create credentials from a user name and secret
    #[must_use]
    pub fn new<U: Into<String>>(username: U, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

/// SMTP email backend
///
/// # Examples
///
/// ```rust,no_run
/// use emaileria::config::SmtpSettings;
/// use emaileria::email::{Email, EmailSender, SmtpBackend, SmtpCredentials};
/// use secrecy::SecretString;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let credentials = SmtpCredentials::new(
///     "me@gmail.com",
///     SecretString::from("app-password".to_string()),
/// );
/// let backend = SmtpBackend::connect(&SmtpSettings::default(), credentials).await?;
///
/// let message = Email::new()
///     .to("user@example.com")
///     .from("me@gmail.com")
///     .subject("Hello!")
///     .html("<p>Hello, World!</p>")
///     .build()?;
///
/// backend.send(&message).await?;
/// backend.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct SmtpBackend {
    transport: Mutex<Option<AsyncSmtpTransport<Tokio1Executor>>>,
    host: String,
}

impl std::fmt::Debug for SmtpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpBackend")
            .field("host", &self.host)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl SmtpBackend {
    /// Open and authenticate an SMTP session
    ///
    /// # Errors
    ///
    /// Returns [`EmailError::ConfigError`] for an unusable host and
    /// [`EmailError::Auth`] when the server cannot be reached or rejects
    /// the credentials.
    pub async fn connect(
        settings: &SmtpSettings,
        credentials: SmtpCredentials,
    ) -> Result<Self, EmailError> {
        let transport = Self::create_transport(settings, &credentials)?;

        info!(
            host = %settings.host,
            port = settings.port,
            security = ?settings.security,
            user = %credentials.username,
            "Opening SMTP session"
        );

        match transport.test_connection().await {
            Ok(true) => {
                debug!(host = %settings.host, "SMTP session ready");
                Ok(Self::with_transport(transport, &settings.host))
            }
            Ok(false) => Err(EmailError::Auth(format!(
                "{} did not accept the session",
                settings.host
            ))),
            Err(e) => Err(EmailError::Auth(e.to_string())),
        }
    }

    fn with_transport(transport: AsyncSmtpTransport<Tokio1Executor>, host: &str) -> Self {
        Self {
            transport: Mutex::new(Some(transport)),
            host: host.to_string(),
        }
    }

    /// Whether [`EmailSender::close`] has released the session
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.transport.lock().is_none()
    }

    fn create_transport(
        settings: &SmtpSettings,
        credentials: &SmtpCredentials,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        let login = Credentials::new(
            credentials.username.clone(),
            credentials.password.expose_secret().to_owned(),
        );

        let builder = match settings.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                .map_err(|e| EmailError::config(format!("invalid SMTP host: {e}")))?,
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                    .map_err(|e| EmailError::config(format!("invalid SMTP host: {e}")))?
            }
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            }
        };

        Ok(builder
            .port(settings.port)
            .timeout(Some(settings.timeout()))
            .credentials(login)
            .build())
    }
}

/// Whether an SMTP failure is worth another attempt
///
/// 4xx replies, timeouts and dropped connections are; 5xx replies, TLS
/// setup failures and client-side errors are not.
fn is_retryable(err: &lettre::transport::smtp::Error) -> bool {
    if err.is_transient() || err.is_timeout() {
        return true;
    }
    !(err.is_permanent() || err.is_client() || err.is_tls())
}

fn describe(response: &Response) -> String {
    let lines: Vec<&str> = response.message().collect();
    format!("{} {}", response.code(), lines.join(" "))
}

#[async_trait]
impl EmailSender for SmtpBackend {
    async fn send(&self, message: &TransportMessage) -> Result<SendReceipt, EmailError> {
        let transport = self
            .transport
            .lock()
            .clone()
            .ok_or_else(|| EmailError::transport(format!("SMTP session to {} is closed", self.host)))?;
        match transport.send(message.message().clone()).await {
            Ok(response) => Ok(SendReceipt::new(describe(&response))),
            Err(e) => {
                let temporary = is_retryable(&e);
                Err(EmailError::Transport {
                    detail: e.to_string(),
                    temporary,
                })
            }
        }
    }

    async fn close(&self) -> Result<(), EmailError> {
        // Dropping the last handle shuts the connection pool down.
        if self.transport.lock().take().is_some() {
            debug!(host = %self.host, "SMTP session closed");
        }
        Ok(())
    }
}

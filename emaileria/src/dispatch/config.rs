//! Immutable run-wide dispatch settings

use std::time::Duration;

use crate::config::{validate_interval, ConfigError, DispatchSettings};
use crate::email::{parse_address_list, Addressing};

use super::RetryPolicy;

/// Settings fixed for the duration of one run
///
/// Built with [`DispatchConfig::builder`]:
///
/// ```rust
/// use emaileria::dispatch::DispatchConfig;
/// use std::time::Duration;
///
/// let config = DispatchConfig::builder("Equipe <me@example.com>")
///     .cc("chefe@example.com")
///     .interval_seconds(1.0)
///     .dry_run(true)
///     .build()?;
///
/// assert_eq!(config.smtp_user(), "me@example.com");
/// assert_eq!(config.interval(), Duration::from_secs(1));
/// # Ok::<(), emaileria::config::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    addressing: Addressing,
    smtp_user: String,
    interval: Duration,
    dry_run: bool,
    retry: RetryPolicy,
    validation_sample: usize,
}

impl DispatchConfig {
    /// Start a builder with the given sender and default settings
    #[must_use]
    pub fn builder<S: Into<String>>(sender: S) -> DispatchConfigBuilder {
        DispatchConfigBuilder::new(sender.into(), &DispatchSettings::default())
    }

    /// Start a builder from loaded settings
    #[must_use]
    pub fn from_settings<S: Into<String>>(
        sender: S,
        settings: &DispatchSettings,
    ) -> DispatchConfigBuilder {
        DispatchConfigBuilder::new(sender.into(), settings)
    }

    /// From, CC, BCC and Reply-To
    #[must_use]
    pub const fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    /// SMTP login identity
    #[must_use]
    pub fn smtp_user(&self) -> &str {
        &self.smtp_user
    }

    /// Minimum interval between send attempts
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether sends are suppressed
    #[must_use]
    pub const fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Retry policy for temporary failures
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Rows checked by the pre-flight validation
    #[must_use]
    pub const fn validation_sample(&self) -> usize {
        self.validation_sample
    }
}

/// Builder for [`DispatchConfig`]
#[derive(Debug, Clone)]
pub struct DispatchConfigBuilder {
    sender: String,
    smtp_user: Option<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    reply_to: Vec<String>,
    interval_seconds: f64,
    dry_run: bool,
    retry: RetryPolicy,
    validation_sample: usize,
}

impl DispatchConfigBuilder {
    fn new(sender: String, settings: &DispatchSettings) -> Self {
        Self {
            sender,
            smtp_user: None,
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            interval_seconds: settings.interval_seconds,
            dry_run: false,
            retry: RetryPolicy::from_settings(settings),
            validation_sample: settings.validation_sample,
        }
    }

    /// Authentication identity; defaults to the sender's address
    #[must_use]
    pub fn smtp_user<S: Into<String>>(mut self, user: Option<S>) -> Self {
        self.smtp_user = user.map(Into::into);
        self
    }

    /// CC recipients from free-form text
    #[must_use]
    pub fn cc(mut self, raw: &str) -> Self {
        self.cc = parse_address_list(raw);
        self
    }

    /// BCC recipients from free-form text
    #[must_use]
    pub fn bcc(mut self, raw: &str) -> Self {
        self.bcc = parse_address_list(raw);
        self
    }

    /// Reply-To addresses from free-form text
    #[must_use]
    pub fn reply_to(mut self, raw: &str) -> Self {
        self.reply_to = parse_address_list(raw);
        self
    }

    /// Minimum seconds between send attempts, within `[0, 2]`
    #[must_use]
    pub fn interval_seconds(mut self, seconds: f64) -> Self {
        self.interval_seconds = seconds;
        self
    }

    /// Suppress sends and emit previews instead
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Retry policy for temporary failures
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Rows checked by the pre-flight validation
    #[must_use]
    pub fn validation_sample(mut self, rows: usize) -> Self {
        self.validation_sample = rows;
        self
    }

    /// Finish the configuration
    ///
    /// Address syntax is checked later, when the dispatcher validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] without a sender and
    /// [`ConfigError::IntervalOutOfRange`] for an interval outside `[0, 2]`.
    pub fn build(self) -> Result<DispatchConfig, ConfigError> {
        let sender = self.sender.trim().to_string();
        if sender.is_empty() {
            return Err(ConfigError::Missing("sender"));
        }
        let interval = validate_interval(self.interval_seconds)?;

        let addressing = Addressing {
            sender,
            cc: self.cc,
            bcc: self.bcc,
            reply_to: self.reply_to,
        };
        let smtp_user = self
            .smtp_user
            .map(|user| user.trim().to_string())
            .filter(|user| !user.is_empty())
            .unwrap_or_else(|| {
                addressing
                    .sender_address()
                    .unwrap_or_else(|_| addressing.sender.clone())
            });

        Ok(DispatchConfig {
            addressing,
            smtp_user,
            interval,
            dry_run: self.dry_run,
            retry: self.retry,
            validation_sample: self.validation_sample,
        })
    }
}

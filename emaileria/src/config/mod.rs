//! Configuration management for emaileria
//!
//! Settings are layered with figment, lowest to highest priority:
//!
//! 1. Hardcoded defaults
//! 2. `/etc/emaileria/config.toml` (system config)
//! 3. `~/.config/emaileria/config.toml` (user config, XDG)
//! 4. `./emaileria.toml` (working directory)
//! 5. An explicit file passed with `--config`
//! 6. Environment variables (`EMAILERIA_` prefix, `__` for nesting)
//!
//! Command-line flags are applied on top by the caller.
//!
//! # Example Configuration
//!
//! ```toml
//! [smtp]
//! host = "smtp.office365.com"
//! port = 587
//! security = "starttls"
//! timeout_secs = 30
//!
//! [dispatch]
//! interval_seconds = 1.0
//! max_attempts = 3
//! backoff_seconds = [1.0, 2.0, 4.0]
//! validation_sample = 10
//!
//! [preview]
//! limit = 5
//! output_dir = "previews"
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use emaileria::config::EmaileriaConfig;
//!
//! # fn example() -> Result<(), emaileria::config::ConfigError> {
//! let config = EmaileriaConfig::load(None)?;
//! let interval = config.dispatch.interval();
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest accepted interval between send attempts, in seconds
pub const MIN_INTERVAL_SECONDS: f64 = 0.0;

/// Longest accepted interval between send attempts, in seconds
pub const MAX_INTERVAL_SECONDS: f64 = 2.0;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "EMAILERIA_";

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration source could not be read or parsed
    #[error("failed to load configuration: {0}")]
    Figment(#[from] figment::Error),

    /// An explicitly requested configuration file does not exist
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The send interval is outside the accepted range
    #[error("interval must be between 0 and 2 seconds, got {0}")]
    IntervalOutOfRange(f64),

    /// A setting has an unusable value
    #[error("invalid setting `{key}`: {detail}")]
    Invalid {
        /// Dotted setting name
        key: &'static str,
        /// What is wrong with it
        detail: String,
    },

    /// A required value was not supplied
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
}

/// Transport security for the SMTP session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Implicit TLS from the first byte (port 465)
    Tls,
    /// Plain connection upgraded with STARTTLS (port 587)
    StartTls,
    /// No encryption; local relays and test servers only
    None,
}

/// SMTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    /// Server hostname
    pub host: String,

    /// Server port
    pub port: u16,

    /// Connection security
    pub security: SmtpSecurity,

    /// Network timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 465,
            security: SmtpSecurity::Tls,
            timeout_secs: 30,
        }
    }
}

impl SmtpSettings {
    /// Network timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Dispatch loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Minimum seconds between send attempts
    pub interval_seconds: f64,

    /// Attempts per message for temporary failures (1 disables retry)
    pub max_attempts: u32,

    /// Back-off before each retry, in seconds; the last value repeats
    pub backoff_seconds: Vec<f64>,

    /// Rows checked by the pre-flight validation
    pub validation_sample: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 0.75,
            max_attempts: 3,
            backoff_seconds: vec![1.0, 2.0, 4.0],
            validation_sample: 10,
        }
    }
}

impl DispatchSettings {
    /// Minimum interval between send attempts
    ///
    /// Only meaningful after [`EmaileriaConfig::validate`]; out-of-range
    /// values are clamped.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(
            self.interval_seconds
                .clamp(MIN_INTERVAL_SECONDS, MAX_INTERVAL_SECONDS),
        )
    }
}

/// Preview gallery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    /// Rows rendered into the gallery
    pub limit: usize,

    /// Parent directory for gallery runs
    pub output_dir: PathBuf,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            limit: 5,
            output_dir: PathBuf::from("previews"),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human oriented
    Pretty,
    /// Single-line, human oriented
    #[default]
    Compact,
    /// One JSON object per line
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Complete emaileria configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmaileriaConfig {
    /// SMTP server
    pub smtp: SmtpSettings,

    /// Dispatch loop
    pub dispatch: DispatchSettings,

    /// Preview gallery
    pub preview: PreviewSettings,

    /// Logging
    pub logging: LoggingSettings,
}

impl EmaileriaConfig {
    /// Load and validate configuration from every layer
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if `explicit` does not exist,
    /// [`ConfigError::Figment`] if a source does not parse, or a validation
    /// error from [`EmaileriaConfig::validate`].
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
        }

        let config: Self = Self::figment(explicit).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The layered figment, before extraction
    #[must_use]
    pub fn figment(explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let system_config = PathBuf::from("/etc/emaileria/config.toml");
        if system_config.exists() {
            figment = figment.merge(Toml::file(&system_config));
        }

        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                figment = figment.merge(Toml::file(&user_config));
            }
        }

        let local_config = PathBuf::from("emaileria.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        if let Some(path) = explicit {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// XDG user configuration file
    ///
    /// `$XDG_CONFIG_HOME/emaileria/config.toml`, usually
    /// `~/.config/emaileria/config.toml`.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("emaileria").join("config.toml"))
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IntervalOutOfRange`] or
    /// [`ConfigError::Invalid`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_interval(self.dispatch.interval_seconds)?;

        if self.dispatch.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "dispatch.max_attempts",
                detail: "must be at least 1".to_string(),
            });
        }
        if self
            .dispatch
            .backoff_seconds
            .iter()
            .any(|seconds| !seconds.is_finite() || *seconds < 0.0)
        {
            return Err(ConfigError::Invalid {
                key: "dispatch.backoff_seconds",
                detail: "values must be non-negative".to_string(),
            });
        }
        if self.preview.limit == 0 {
            return Err(ConfigError::Invalid {
                key: "preview.limit",
                detail: "must be greater than zero".to_string(),
            });
        }
        if self.smtp.host.trim().is_empty() {
            return Err(ConfigError::Missing("smtp.host"));
        }
        if self.smtp.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "smtp.timeout_secs",
                detail: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Check a send interval against the accepted range
///
/// # Errors
///
/// Returns [`ConfigError::IntervalOutOfRange`] for values outside `[0, 2]`
/// and for non-finite values.
pub fn validate_interval(seconds: f64) -> Result<Duration, ConfigError> {
    if !(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&seconds) {
        return Err(ConfigError::IntervalOutOfRange(seconds));
    }
    Ok(Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = EmaileriaConfig::default();
        assert_eq!(config.smtp.host, "smtp.gmail.com");
        assert_eq!(config.smtp.port, 465);
        assert_eq!(config.smtp.security, SmtpSecurity::Tls);
        assert_eq!(config.dispatch.interval(), Duration::from_millis(750));
        assert_eq!(config.dispatch.max_attempts, 3);
        assert_eq!(config.preview.limit, 5);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_interval_bounds() {
        assert!(validate_interval(0.0).is_ok());
        assert!(validate_interval(2.0).is_ok());
        assert!(matches!(
            validate_interval(2.5),
            Err(ConfigError::IntervalOutOfRange(value)) if (value - 2.5).abs() < f64::EPSILON
        ));
        assert!(validate_interval(-0.1).is_err());
        assert!(validate_interval(f64::NAN).is_err());
    }

    #[test]
    fn test_local_file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.set_env("XDG_CONFIG_HOME", jail.directory().join("xdg").display());
            jail.create_file(
                "emaileria.toml",
                r#"
                [smtp]
                host = "smtp.office365.com"
                port = 587
                security = "starttls"

                [dispatch]
                interval_seconds = 1.0
                "#,
            )?;
            jail.set_env("EMAILERIA_DISPATCH__INTERVAL_SECONDS", "1.5");
            jail.set_env("EMAILERIA_LOGGING__FORMAT", "json");

            let config = EmaileriaConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.smtp.host, "smtp.office365.com");
            assert_eq!(config.smtp.port, 587);
            assert_eq!(config.smtp.security, SmtpSecurity::StartTls);
            assert_eq!(config.dispatch.interval(), Duration::from_millis(1500));
            assert_eq!(config.logging.format, LogFormat::Json);
            assert_eq!(config.dispatch.max_attempts, 3);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_overrides_local_file() {
        Jail::expect_with(|jail| {
            jail.set_env("XDG_CONFIG_HOME", jail.directory().join("xdg").display());
            jail.create_file("emaileria.toml", "[preview]\nlimit = 7\n")?;
            jail.create_file("campanha.toml", "[preview]\nlimit = 2\n")?;

            let config = EmaileriaConfig::load(Some(Path::new("campanha.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.preview.limit, 2);
            Ok(())
        });
    }

    #[test]
    fn test_user_config_layer() {
        Jail::expect_with(|jail| {
            let xdg = jail.directory().join("xdg");
            std::fs::create_dir_all(xdg.join("emaileria")).map_err(|e| e.to_string())?;
            std::fs::write(
                xdg.join("emaileria").join("config.toml"),
                "[smtp]\nport = 2525\n",
            )
            .map_err(|e| e.to_string())?;
            jail.set_env("XDG_CONFIG_HOME", xdg.display());

            let config = EmaileriaConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.smtp.port, 2525);
            Ok(())
        });
    }

    #[test]
    fn test_out_of_range_interval_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("XDG_CONFIG_HOME", jail.directory().join("xdg").display());
            jail.set_env("EMAILERIA_DISPATCH__INTERVAL_SECONDS", "3");

            let result = EmaileriaConfig::load(None);
            assert!(matches!(result, Err(ConfigError::IntervalOutOfRange(_))));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = EmaileriaConfig::load(Some(Path::new("/nonexistent/emaileria.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = EmaileriaConfig::default();
        config.dispatch.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "dispatch.max_attempts",
                ..
            })
        ));
    }
}

//! Command-line arguments

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use emaileria::config::LogFormat;
use emaileria::template::{TemplateError, TemplateSource, TemplateSpec};

/// Templated bulk e-mail from spreadsheet contact lists
#[derive(Debug, Parser)]
#[command(name = "emaileria")]
#[command(version)]
#[command(about = "Templated bulk e-mail from spreadsheet contact lists", long_about = None)]
pub struct Cli {
    /// Configuration file layered over the defaults
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset (e.g. `debug`)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Render every row and send it (or preview it with --dry-run)
    Send(SendArgs),
    /// Validate contacts and templates on a sample of rows, send nothing
    Check(CheckArgs),
    /// Write an HTML gallery of the first rendered messages
    Preview(PreviewArgs),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Multi-line, human oriented
    Pretty,
    /// Single-line, human oriented
    Compact,
    /// One JSON object per line
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Compact => Self::Compact,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// Where the contacts come from
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Contact list (.xlsx, .xls, .ods, .csv, .tsv)
    #[arg(short, long, value_name = "PATH")]
    pub file: PathBuf,

    /// Spreadsheet tab to read (default: first)
    #[arg(long)]
    pub sheet: Option<String>,

    /// Skip this many leading rows
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Process at most this many rows
    #[arg(long, value_parser = positive)]
    pub limit: Option<usize>,
}

/// Subject and body templates
#[derive(Debug, Clone, Args)]
pub struct TemplateArgs {
    /// Subject template text
    #[arg(long)]
    pub subject: Option<String>,

    /// Subject template file (wins over --subject)
    #[arg(long, value_name = "PATH")]
    pub subject_file: Option<PathBuf>,

    /// HTML body template text
    #[arg(long)]
    pub body: Option<String>,

    /// HTML body template file (wins over --body)
    #[arg(long, value_name = "PATH")]
    pub body_file: Option<PathBuf>,
}

impl TemplateArgs {
    /// Resolve both templates from their sources
    ///
    /// # Errors
    ///
    /// Returns an error if a template is missing or its file is unreadable.
    pub fn spec(&self) -> Result<TemplateSpec, TemplateError> {
        TemplateSpec::from_sources(
            TemplateSource::pick(self.subject.clone(), self.subject_file.clone()),
            TemplateSource::pick(self.body.clone(), self.body_file.clone()),
        )
    }
}

/// Run-wide addressing
#[derive(Debug, Clone, Args)]
pub struct AddressArgs {
    /// From address, optionally with a display name
    #[arg(long)]
    pub sender: String,

    /// CC addresses, separated by commas, semicolons or new lines
    #[arg(long, default_value = "")]
    pub cc: String,

    /// BCC addresses
    #[arg(long, default_value = "")]
    pub bcc: String,

    /// Reply-To addresses
    #[arg(long, default_value = "")]
    pub reply_to: String,
}

/// Message transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Authenticated SMTP session
    #[default]
    Smtp,
    /// Print messages to the terminal
    Console,
}

/// Arguments of `send`
#[derive(Debug, Clone, Args)]
pub struct SendArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub templates: TemplateArgs,

    #[command(flatten)]
    pub addressing: AddressArgs,

    /// SMTP login (default: the sender's address)
    #[arg(long)]
    pub smtp_user: Option<String>,

    /// SMTP password; prefer the SMTP_PASSWORD variable or the prompt
    #[arg(long)]
    pub smtp_password: Option<String>,

    /// SMTP server host
    #[arg(long)]
    pub smtp_host: Option<String>,

    /// SMTP server port
    #[arg(long)]
    pub smtp_port: Option<u16>,

    /// Minimum seconds between send attempts (0 to 2)
    #[arg(long, value_name = "SECONDS")]
    pub interval_seconds: Option<f64>,

    /// Render and preview without sending
    #[arg(long)]
    pub dry_run: bool,

    /// Start even if validation finds placeholders without values
    #[arg(long)]
    pub force: bool,

    /// Do not ask for confirmation before a live run
    #[arg(short, long)]
    pub yes: bool,

    /// Write the run summary as JSON
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Append one CSV line per row to this file
    #[arg(long, value_name = "PATH")]
    pub audit_log: Option<PathBuf>,

    /// How messages leave the machine
    #[arg(long, value_enum, default_value_t = TransportKind::Smtp)]
    pub transport: TransportKind,
}

/// Arguments of `check`
#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub templates: TemplateArgs,

    #[command(flatten)]
    pub addressing: AddressArgs,

    /// Rows to validate (default from configuration)
    #[arg(long, value_parser = positive)]
    pub sample: Option<usize>,
}

/// Arguments of `preview`
#[derive(Debug, Clone, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub templates: TemplateArgs,

    /// Number of messages in the gallery (default from configuration)
    #[arg(short = 'n', long, value_parser = positive)]
    pub count: Option<usize>,

    /// Parent directory for the gallery
    #[arg(long, value_name = "PATH")]
    pub output_dir: Option<PathBuf>,
}

fn positive(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("must be greater than zero".to_string()),
        Ok(value) => Ok(value),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from([
            "emaileria",
            "--log-level",
            "debug",
            "send",
            "--file",
            "contatos.xlsx",
            "--subject",
            "Olá {{ nome }}",
            "--body-file",
            "corpo.html",
            "--sender",
            "me@example.com",
            "--cc",
            "a@x.com;b@x.com",
            "--interval-seconds",
            "1.5",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Commands::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert!(args.dry_run);
        assert_eq!(args.interval_seconds, Some(1.5));
        assert_eq!(args.transport, TransportKind::Smtp);
        assert_eq!(args.source.offset, 0);
        assert_eq!(args.addressing.cc, "a@x.com;b@x.com");
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let result = Cli::try_parse_from([
            "emaileria",
            "preview",
            "--file",
            "c.csv",
            "--limit",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_file_template_wins() {
        let args = TemplateArgs {
            subject: Some("inline".into()),
            subject_file: Some(PathBuf::from("/definitely/missing.txt")),
            body: Some("<p>x</p>".into()),
            body_file: None,
        };
        assert!(matches!(args.spec(), Err(TemplateError::Read { .. })));
    }

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

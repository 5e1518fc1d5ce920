//! The send command: validate, confirm, dispatch, report

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Password};
use emaileria::config::EmaileriaConfig;
use emaileria::dispatch::{
    CancellationToken, CsvAuditLog, DispatchConfig, DispatchError, DispatchSummary, Dispatcher,
    Fanout, RunState, TracingSink,
};
use emaileria::email::{ConsoleBackend, EmailSender, SmtpBackend, SmtpCredentials};
use emaileria::template::RenderGlobals;
use secrecy::SecretString;
use tracing::{info, warn};

use super::{compile_templates, load_table, FatalExt};
use crate::args::{SendArgs, TransportKind};
use crate::output::{print_summary, print_validation, ProgressSink};

/// Environment variable holding the SMTP password
pub const PASSWORD_ENV: &str = "SMTP_PASSWORD";

/// Where the SMTP password came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordSource {
    /// `--smtp-password`
    Flag,
    /// The `SMTP_PASSWORD` variable
    Environment,
    /// Interactive prompt
    Prompt,
}

/// Pick the password: flag, then environment, then the prompt
///
/// Blank values are ignored.
///
/// # Errors
///
/// Returns the prompt's error if it has to be shown and fails.
pub fn resolve_password<P>(
    flag: Option<String>,
    env: Option<String>,
    prompt: P,
) -> Result<(SecretString, PasswordSource)>
where
    P: FnOnce() -> Result<String>,
{
    let present = |value: Option<String>| value.filter(|v| !v.is_empty());
    if let Some(password) = present(flag) {
        return Ok((SecretString::from(password), PasswordSource::Flag));
    }
    if let Some(password) = present(env) {
        return Ok((SecretString::from(password), PasswordSource::Environment));
    }
    Ok((SecretString::from(prompt()?), PasswordSource::Prompt))
}

/// Run the whole send flow
///
/// Returns `None` when the operator declines the confirmation.
///
/// # Errors
///
/// Returns an error for any failure that stops the run before sending.
pub async fn execute(args: &SendArgs, settings: &EmaileriaConfig) -> Result<Option<DispatchSummary>> {
    let table = load_table(&args.source)?;
    let templates = compile_templates(&args.templates)?;

    let config = DispatchConfig::from_settings(args.addressing.sender.clone(), &settings.dispatch)
        .smtp_user(args.smtp_user.clone())
        .cc(&args.addressing.cc)
        .bcc(&args.addressing.bcc)
        .reply_to(&args.addressing.reply_to)
        .interval_seconds(
            args.interval_seconds
                .unwrap_or(settings.dispatch.interval_seconds),
        )
        .dry_run(args.dry_run)
        .build()
        .fatal()?;

    let mut dispatcher = Dispatcher::new(config, templates, RenderGlobals::capture());
    match dispatcher.validate(&table, &TracingSink) {
        Ok(report) => print_validation(&report),
        Err(DispatchError::Validation(report)) => {
            print_validation(&report);
            if !args.force {
                return Err(DispatchError::Validation(report))
                    .fatal()
                    .context("use --force to send anyway; affected rows will fail");
            }
            println!(
                "{}",
                style("Continuing despite validation failures (--force)").yellow()
            );
            dispatcher.override_validation(&TracingSink).fatal()?;
        }
        Err(e) => return Err(e).fatal(),
    }

    let dry_run = dispatcher.config().dry_run();
    if !dry_run && !args.yes && !confirm(table.len(), &dispatcher.config().addressing().sender)? {
        println!("{}", style("Cancelled, nothing was sent").yellow());
        return Ok(None);
    }

    let transport = if dry_run {
        None
    } else {
        Some(open_transport(args, settings, dispatcher.config().smtp_user()).await?)
    };

    let mut sink = Fanout::new().with(ProgressSink::new(table.len())?);
    if let Some(path) = &args.audit_log {
        let audit = CsvAuditLog::open(path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;
        sink = sink.with(audit);
    }

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current message");
                cancel.cancel();
            }
        })
    };

    let summary = dispatcher
        .run(&table, transport.as_deref(), &sink, &cancel)
        .await
        .fatal();
    ctrl_c.abort();
    let summary = summary?;

    print_summary(&summary);
    if let Some(path) = &args.report {
        summary
            .write_json(path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        println!("Report written to {}", style(path.display()).cyan());
    }
    if summary.state == RunState::Cancelled {
        info!(not_processed = summary.not_processed(), "Run cancelled by operator");
    }

    Ok(Some(summary))
}

fn confirm(rows: usize, sender: &str) -> Result<bool> {
    Confirm::new()
        .with_prompt(format!("Send up to {rows} message(s) from {sender}?"))
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

async fn open_transport(
    args: &SendArgs,
    settings: &EmaileriaConfig,
    smtp_user: &str,
) -> Result<Box<dyn EmailSender>> {
    match args.transport {
        TransportKind::Console => Ok(Box::new(ConsoleBackend::new())),
        TransportKind::Smtp => {
            let (password, source) = resolve_password(
                args.smtp_password.clone(),
                std::env::var(PASSWORD_ENV).ok(),
                || {
                    Password::new()
                        .with_prompt(format!("SMTP password for {smtp_user}"))
                        .interact()
                        .context("Failed to read password")
                },
            )?;
            if source == PasswordSource::Flag {
                warn!("Password given on the command line may be visible to other users; prefer {PASSWORD_ENV}");
            }

            let mut smtp = settings.smtp.clone();
            if let Some(host) = &args.smtp_host {
                smtp.host.clone_from(host);
            }
            if let Some(port) = args.smtp_port {
                smtp.port = port;
            }

            let backend = SmtpBackend::connect(&smtp, SmtpCredentials::new(smtp_user, password))
                .await
                .fatal()?;
            Ok(Box::new(backend))
        }
    }
}

//! Rate-limited, cancellable dispatch of a contact table
//!
//! A [`Dispatcher`] owns one run. It moves through
//! `Idle -> Validating -> Ready -> Sending -> {Completed, Cancelled, Failed}`:
//!
//! - [`Dispatcher::validate`] checks run-wide addresses and renders a sample
//!   of rows. Unresolved placeholders keep the run in `Validating` until
//!   [`Dispatcher::override_validation`] is called.
//! - [`Dispatcher::run`] processes rows strictly in table order. Each row is
//!   rendered, built and sent (or previewed in dry-run); a failing row is
//!   recorded and the loop moves on.
//!
//! Send attempts are spaced by at least the configured interval, measured
//! from the start of the previous attempt. Cancellation is polled before each
//! row and interrupts waits, never a send in flight.
//!
//! # Examples
//!
//! ```rust
//! use emaileria::contacts::{CellValue, ContactTable};
//! use emaileria::dispatch::{CancellationToken, DispatchConfig, Dispatcher, RunState, TracingSink};
//! use emaileria::template::{RenderGlobals, TemplateSpec};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let table = ContactTable::from_records(
//!     vec!["email".into(), "tratamento".into(), "nome".into()],
//!     vec![vec![
//!         CellValue::from_text("ana@example.com"),
//!         CellValue::from_text("Sra."),
//!         CellValue::from_text("Ana"),
//!     ]],
//! )?;
//!
//! let config = DispatchConfig::builder("me@example.com").dry_run(true).build()?;
//! let templates = TemplateSpec::new("Olá {{ nome }}", "<p>Olá</p>").compile()?;
//! let mut dispatcher = Dispatcher::new(config, templates, RenderGlobals::capture());
//!
//! dispatcher.validate(&table, &TracingSink)?;
//! let summary = dispatcher
//!     .run(&table, None, &TracingSink, &CancellationToken::new())
//!     .await?;
//!
//! assert_eq!(summary.state, RunState::Completed);
//! assert_eq!(summary.succeeded, 1);
//! # Ok(())
//! # }
//! ```

mod audit;
mod cancellation;
mod config;
mod events;
mod summary;
mod throttle;
mod validation;

use std::fmt;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

pub use audit::CsvAuditLog;
pub use cancellation::CancellationToken;
pub use config::{DispatchConfig, DispatchConfigBuilder};
pub use events::{
    ChannelSink, DispatchEvent, EventSink, Fanout, LogLevel, LogRecord, NullSink, TracingSink,
};
pub use summary::{DispatchResult, DispatchStatus, DispatchSummary, Progress};
pub use throttle::{RetryPolicy, SendThrottle};
pub use validation::{PlaceholderIssue, RowIssue, ValidationReport};

use crate::config::ConfigError;
use crate::contacts::{ContactRow, ContactTable};
use crate::email::{build_message, parse_mailbox, EmailError, EmailSender, TransportMessage};
use crate::error::ErrorKind;
use crate::template::{MessageTemplates, RenderGlobals};

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, nothing checked yet
    Idle,
    /// Pre-flight validation running, or failed and awaiting an override
    Validating,
    /// Validated; the run may start
    Ready,
    /// Rows are being processed
    Sending,
    /// Every row was processed
    Completed,
    /// Stopped early on request
    Cancelled,
    /// Aborted before sending
    Failed,
}

impl RunState {
    /// Whether the run is over
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Lower-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Ready => "ready",
            Self::Sending => "sending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that stop a run before any row is sent
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Sampled rows reference placeholders without values
    #[error("{0}")]
    Validation(ValidationReport),

    /// Run configuration was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A sender, CC, BCC or Reply-To address is malformed
    #[error("invalid run-wide address: {0}")]
    Address(#[source] EmailError),

    /// The requested step is not allowed in the current state
    #[error("dispatcher cannot do that while {0}")]
    NotReady(RunState),

    /// A live run was started without a transport
    #[error("a transport is required unless running in dry-run mode")]
    TransportRequired,
}

impl DispatchError {
    /// Classify the failure
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::MissingPlaceholder,
            Self::Config(_) | Self::TransportRequired => ErrorKind::Config,
            Self::Address(_) => ErrorKind::Address,
            Self::NotReady(_) => ErrorKind::Validation,
        }
    }
}

/// Drives one run over a contact table
#[derive(Debug)]
pub struct Dispatcher {
    config: DispatchConfig,
    templates: MessageTemplates,
    globals: RenderGlobals,
    state: RunState,
    throttle: SendThrottle,
    run_id: Uuid,
}

impl Dispatcher {
    /// Dispatcher for one run; globals are fixed for its lifetime
    #[must_use]
    pub fn new(config: DispatchConfig, templates: MessageTemplates, globals: RenderGlobals) -> Self {
        let throttle = SendThrottle::new(config.interval());
        Self {
            config,
            templates,
            globals,
            state: RunState::Idle,
            throttle,
            run_id: Uuid::new_v4(),
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Run identifier
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Run configuration
    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Globals shared by every render of the run
    #[must_use]
    pub const fn globals(&self) -> &RenderGlobals {
        &self.globals
    }

    fn transition(&mut self, to: RunState, sink: &dyn EventSink) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        debug!(run_id = %self.run_id, %from, %to, "Run state changed");
        sink.emit(&DispatchEvent::StateChanged { from, to });
    }

    /// Pre-flight check over the first rows of the table
    ///
    /// Run-wide addresses are checked first; a malformed one fails the run.
    /// Then up to `validation_sample` rows are checked for placeholders
    /// without values (blocking) and for malformed recipients or blank
    /// required values (reported as warnings).
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Address`] for a malformed run-wide address; the run
    ///   moves to `Failed`.
    /// - [`DispatchError::Validation`] when placeholders are unresolved; the
    ///   run stays in `Validating`.
    /// - [`DispatchError::NotReady`] once sending has started or finished.
    pub fn validate(
        &mut self,
        table: &ContactTable,
        sink: &dyn EventSink,
    ) -> Result<ValidationReport, DispatchError> {
        if !matches!(
            self.state,
            RunState::Idle | RunState::Validating | RunState::Ready
        ) {
            return Err(DispatchError::NotReady(self.state));
        }
        self.transition(RunState::Validating, sink);

        if let Err(e) = self.config.addressing().validate() {
            warn!(run_id = %self.run_id, error = %e, "Run-wide address rejected");
            self.transition(RunState::Failed, sink);
            return Err(DispatchError::Address(e));
        }

        let mut report = ValidationReport {
            placeholders: self
                .templates
                .placeholders()
                .into_iter()
                .map(str::to_string)
                .collect(),
            ..ValidationReport::default()
        };

        for row in table.iter().take(self.config.validation_sample()) {
            report.rows_checked += 1;
            let recipient = row.email();

            let blank = row.missing_required();
            if !blank.is_empty() {
                report.incomplete_rows.push(RowIssue {
                    line: row.line(),
                    recipient,
                    detail: format!("blank required values: {}", blank.join(", ")),
                });
                continue;
            }

            for unresolved in self.templates.missing_placeholders(row, &self.globals) {
                report.missing.push(PlaceholderIssue {
                    line: row.line(),
                    recipient: recipient.clone(),
                    field: unresolved.field,
                    placeholder: unresolved.placeholder,
                });
            }

            if let Err(e) = parse_mailbox(&recipient) {
                report.invalid_recipients.push(RowIssue {
                    line: row.line(),
                    recipient,
                    detail: e.to_string(),
                });
            }
        }

        sink.emit(&DispatchEvent::Validated(report.clone()));

        if report.is_blocking() {
            warn!(
                run_id = %self.run_id,
                missing = ?report.missing_names(),
                "Validation found placeholders without values"
            );
            return Err(DispatchError::Validation(report));
        }

        info!(
            run_id = %self.run_id,
            rows_checked = report.rows_checked,
            warnings = report.invalid_recipients.len() + report.incomplete_rows.len(),
            "Validation passed"
        );
        self.transition(RunState::Ready, sink);
        Ok(report)
    }

    /// Accept a failed validation and allow the run to start
    ///
    /// Rows whose placeholders cannot be resolved will fail individually.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotReady`] unless the run is in `Validating`.
    pub fn override_validation(&mut self, sink: &dyn EventSink) -> Result<(), DispatchError> {
        if self.state != RunState::Validating {
            return Err(DispatchError::NotReady(self.state));
        }
        warn!(run_id = %self.run_id, "Validation overridden");
        self.transition(RunState::Ready, sink);
        Ok(())
    }

    /// Process every row of `table` in order
    ///
    /// In dry-run the transport is never called and may be `None`. Per-row
    /// failures are recorded in the summary and never abort the loop.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NotReady`] unless the run is `Ready`.
    /// - [`DispatchError::TransportRequired`] for a live run without a
    ///   transport.
    pub async fn run(
        &mut self,
        table: &ContactTable,
        transport: Option<&dyn EmailSender>,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<DispatchSummary, DispatchError> {
        if self.state != RunState::Ready {
            return Err(DispatchError::NotReady(self.state));
        }
        if !self.config.dry_run() && transport.is_none() {
            return Err(DispatchError::TransportRequired);
        }

        let span = tracing::info_span!("dispatch", run_id = %self.run_id);
        self.run_rows(table, transport, sink, cancel)
            .instrument(span)
            .await
    }

    async fn run_rows(
        &mut self,
        table: &ContactTable,
        transport: Option<&dyn EmailSender>,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<DispatchSummary, DispatchError> {
        let dry_run = self.config.dry_run();
        let mut summary = DispatchSummary::new(self.run_id, table.len(), dry_run);
        info!(
            total = table.len(),
            dry_run,
            interval_ms = self.config.interval().as_millis(),
            "Dispatch started"
        );
        self.transition(RunState::Sending, sink);

        let mut cancelled = false;
        for row in table {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let Some(result) = self.process_row(row, transport, sink, cancel).await else {
                cancelled = true;
                break;
            };

            summary.record(result.clone());
            sink.emit(&DispatchEvent::RowCompleted(result));
            sink.emit(&DispatchEvent::Progress(summary.progress()));
        }

        if let Some(transport) = transport.filter(|_| !dry_run) {
            if let Err(e) = transport.close().await {
                warn!(error = %e, "Failed to close transport session");
            }
        }

        let state = if cancelled {
            RunState::Cancelled
        } else {
            RunState::Completed
        };
        summary.finish(state);
        self.transition(state, sink);

        if cancelled {
            info!(
                attempted = summary.attempted,
                not_processed = summary.not_processed(),
                "Dispatch cancelled"
            );
        } else {
            info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                skipped = summary.skipped,
                "Dispatch completed"
            );
        }
        if dry_run {
            debug!(
                total = summary.total,
                succeeded = summary.succeeded,
                "dry-run summary"
            );
        }

        sink.emit(&DispatchEvent::Finished(summary.clone()));
        Ok(summary)
    }

    /// Handle one row; `None` when cancellation arrived before any attempt
    async fn process_row(
        &mut self,
        row: &ContactRow,
        transport: Option<&dyn EmailSender>,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Option<DispatchResult> {
        let line = row.line();
        let recipient = row.email();
        let mut result = DispatchResult {
            line,
            recipient: recipient.clone(),
            subject: None,
            attempts: 0,
            status: DispatchStatus::WouldSend,
        };

        let blank = row.missing_required();
        if !blank.is_empty() {
            warn!(line, recipient = %recipient, missing = ?blank, "Skipping row with blank required values");
            result.status = DispatchStatus::Skipped {
                reason: format!("blank required values: {}", blank.join(", ")),
            };
            return Some(result);
        }

        let rendered = match self.templates.render(row, &self.globals) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(line, recipient = %recipient, error = %e, "Row failed to render");
                result.status = failed(e.kind(), e.to_string());
                return Some(result);
            }
        };
        result.subject = Some(rendered.subject.clone());

        if self.config.dry_run() {
            info!(line, recipient = %recipient, "Would send");
            sink.emit(&DispatchEvent::Preview {
                line,
                recipient,
                subject: rendered.subject,
                body: rendered.body,
            });
            return Some(result);
        }

        let message = match build_message(self.config.addressing(), &recipient, &rendered) {
            Ok(message) => message,
            Err(e) => {
                warn!(line, recipient = %recipient, error = %e, "Row has an invalid address");
                result.status = failed(e.kind(), e.to_string());
                return Some(result);
            }
        };

        let Some(transport) = transport else {
            result.status = failed(ErrorKind::Unexpected, "no transport available".to_string());
            return Some(result);
        };

        self.deliver(&message, transport, sink, cancel, result).await
    }

    /// Send with throttling and retries
    async fn deliver(
        &mut self,
        message: &TransportMessage,
        transport: &dyn EmailSender,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
        mut result: DispatchResult,
    ) -> Option<DispatchResult> {
        let line = result.line;
        loop {
            if !self.throttle.wait(cancel).await {
                return (result.attempts > 0).then_some(result);
            }
            self.throttle.mark();
            result.attempts += 1;
            let attempt = result.attempts;

            let outcome = AssertUnwindSafe(async { transport.send(message).await })
                .catch_unwind()
                .await;

            let error = match outcome {
                Ok(Ok(receipt)) => {
                    info!(line, recipient = %result.recipient, attempt, "Sent");
                    result.status = DispatchStatus::Sent {
                        receipt: receipt.detail,
                    };
                    return Some(result);
                }
                Ok(Err(e)) => e,
                Err(panic) => {
                    let detail = panic_detail(panic.as_ref());
                    warn!(line, recipient = %result.recipient, attempt, detail = %detail, "Transport panicked");
                    result.status = failed(ErrorKind::Unexpected, format!("transport panicked: {detail}"));
                    return Some(result);
                }
            };

            result.status = failed(error.kind(), error.to_string());
            if !(error.is_temporary() && self.config.retry().allows_retry(attempt)) {
                warn!(line, recipient = %result.recipient, attempt, error = %error, "Send failed");
                return Some(result);
            }

            let delay = self.config.retry().delay_after(attempt);
            warn!(
                line,
                recipient = %result.recipient,
                attempt,
                delay_ms = delay.as_millis(),
                error = %error,
                "Temporary failure, retrying"
            );
            sink.emit(&DispatchEvent::Retrying {
                line,
                recipient: result.recipient.clone(),
                attempt,
                delay,
                detail: error.to_string(),
            });
            if !cancel.sleep(delay).await {
                return Some(result);
            }
        }
    }
}

const fn failed(kind: ErrorKind, detail: String) -> DispatchStatus {
    DispatchStatus::Failed { kind, detail }
}

fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

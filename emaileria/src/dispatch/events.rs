//! Events pushed by the dispatcher to its observers
//!
//! The dispatcher never reaches into a presentation layer. It pushes
//! [`DispatchEvent`]s through an [`EventSink`] supplied by the caller, and
//! every event can be flattened to a [`LogRecord`] of (level, message,
//! recipient) for display.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use super::{DispatchResult, DispatchStatus, DispatchSummary, Progress, RunState, ValidationReport};

/// Something the dispatcher wants observers to know
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    /// The run moved to another state
    StateChanged {
        /// Previous state
        from: RunState,
        /// New state
        to: RunState,
    },

    /// The pre-flight validation finished
    Validated(ValidationReport),

    /// Dry-run: a message would have been sent
    Preview {
        /// 1-based data row number
        line: usize,
        /// Recipient address
        recipient: String,
        /// Rendered subject
        subject: String,
        /// Rendered HTML body
        body: String,
    },

    /// A temporary failure will be retried
    Retrying {
        /// 1-based data row number
        line: usize,
        /// Recipient address
        recipient: String,
        /// Attempt that just failed
        attempt: u32,
        /// Back-off before the next attempt
        delay: Duration,
        /// Provider detail
        detail: String,
    },

    /// One row is done
    RowCompleted(DispatchResult),

    /// Counters after a row
    Progress(Progress),

    /// The run reached a terminal state
    Finished(DispatchSummary),
}

/// Severity of a [`LogRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Diagnostic detail
    Debug,
    /// Normal progress
    Info,
    /// Something needs attention, the run goes on
    Warn,
    /// A row failed
    Error,
}

/// Display-ready form of an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    /// Severity
    pub level: LogLevel,
    /// Human-readable message
    pub message: String,
    /// Recipient the record is about, if any
    pub recipient: Option<String>,
}

impl LogRecord {
    fn new(level: LogLevel, message: String, recipient: Option<&str>) -> Self {
        Self {
            level,
            message,
            recipient: recipient.map(str::to_string),
        }
    }
}

impl DispatchEvent {
    /// Flatten the event for a log view
    ///
    /// Progress ticks have no record.
    #[must_use]
    pub fn log_record(&self) -> Option<LogRecord> {
        let record = match self {
            Self::StateChanged { from, to } => {
                LogRecord::new(LogLevel::Debug, format!("state {from} -> {to}"), None)
            }
            Self::Validated(report) => {
                let level = if report.is_blocking() {
                    LogLevel::Error
                } else if report.has_warnings() {
                    LogLevel::Warn
                } else {
                    LogLevel::Info
                };
                LogRecord::new(level, report.to_string(), None)
            }
            Self::Preview {
                line, recipient, ..
            } => LogRecord::new(
                LogLevel::Info,
                format!("row {line}: would send"),
                Some(recipient),
            ),
            Self::Retrying {
                line,
                recipient,
                attempt,
                delay,
                detail,
            } => LogRecord::new(
                LogLevel::Warn,
                format!(
                    "row {line}: attempt {attempt} failed ({detail}); retrying in {:.1}s",
                    delay.as_secs_f64()
                ),
                Some(recipient),
            ),
            Self::RowCompleted(result) => {
                let (level, message) = match &result.status {
                    DispatchStatus::Sent { .. } => {
                        (LogLevel::Info, format!("row {}: sent", result.line))
                    }
                    DispatchStatus::WouldSend => {
                        (LogLevel::Debug, format!("row {}: previewed", result.line))
                    }
                    DispatchStatus::Failed { kind, detail } => (
                        LogLevel::Error,
                        format!("row {}: {kind}: {detail}", result.line),
                    ),
                    DispatchStatus::Skipped { reason } => (
                        LogLevel::Warn,
                        format!("row {}: skipped ({reason})", result.line),
                    ),
                };
                LogRecord::new(level, message, Some(&result.recipient))
            }
            Self::Progress(_) => return None,
            Self::Finished(summary) => LogRecord::new(
                LogLevel::Info,
                format!(
                    "{}: {} of {} succeeded, {} failed, {} skipped",
                    summary.state, summary.succeeded, summary.total, summary.failed, summary.skipped
                ),
                None,
            ),
        };
        Some(record)
    }
}

/// Receiver of dispatch events
///
/// Called synchronously from the dispatch loop; implementations should hand
/// work off rather than block.
pub trait EventSink: Send + Sync {
    /// Receive one event
    fn emit(&self, event: &DispatchEvent);
}

impl<F> EventSink for F
where
    F: Fn(&DispatchEvent) + Send + Sync,
{
    fn emit(&self, event: &DispatchEvent) {
        self(event);
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: &DispatchEvent) {
        (**self).emit(event);
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &DispatchEvent) {}
}

/// Sink that writes records through `tracing`
///
/// Subjects and bodies never reach the log; recipient and row number do.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &DispatchEvent) {
        let Some(record) = event.log_record() else {
            return;
        };
        let recipient = record.recipient.as_deref().unwrap_or_default();
        match record.level {
            LogLevel::Debug => tracing::debug!(recipient, "{}", record.message),
            LogLevel::Info => tracing::info!(recipient, "{}", record.message),
            LogLevel::Warn => tracing::warn!(recipient, "{}", record.message),
            LogLevel::Error => tracing::error!(recipient, "{}", record.message),
        }
    }
}

/// Sink forwarding every event over an unbounded channel
///
/// Lets a presentation layer consume events on its own task. Events sent
/// after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DispatchEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving half
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &DispatchEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Sink forwarding to several sinks in order
#[derive(Default)]
pub struct Fanout {
    sinks: Vec<Box<dyn EventSink>>,
}

impl Fanout {
    /// Empty fan-out
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    #[must_use]
    pub fn with<S: EventSink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Number of sinks
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sink was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for Fanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fanout")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventSink for Fanout {
    fn emit(&self, event: &DispatchEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

//! Per-row outcomes and the run summary

use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RunState;
use crate::error::ErrorKind;

/// Outcome of one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Accepted by the transport
    Sent {
        /// Provider acknowledgement
        receipt: String,
    },

    /// Dry-run: rendered and previewed, not sent
    WouldSend,

    /// Failed; the rest of the batch went on
    Failed {
        /// Failure classification
        kind: ErrorKind,
        /// Human-readable detail, provider text when available
        detail: String,
    },

    /// Not processed because required values are blank
    Skipped {
        /// Why the row was skipped
        reason: String,
    },
}

impl DispatchStatus {
    /// Short label used in logs and the audit file
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::WouldSend => "would_send",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// Outcome of one row, with audit context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// 1-based data row number
    pub line: usize,

    /// Recipient address as found in the row
    pub recipient: String,

    /// Rendered subject, when rendering succeeded
    pub subject: Option<String>,

    /// Transport attempts made (0 when nothing was sent)
    pub attempts: u32,

    /// What happened
    #[serde(flatten)]
    pub status: DispatchStatus,
}

impl DispatchResult {
    /// Whether the row counts as a success
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(
            self.status,
            DispatchStatus::Sent { .. } | DispatchStatus::WouldSend
        )
    }

    /// Whether the row failed
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.status, DispatchStatus::Failed { .. })
    }

    /// Failure classification, if the row failed
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match &self.status {
            DispatchStatus::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Error detail, if the row failed or was skipped
    #[must_use]
    pub fn error_detail(&self) -> Option<&str> {
        match &self.status {
            DispatchStatus::Failed { detail, .. } => Some(detail),
            DispatchStatus::Skipped { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Counters reported after each row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Rows in the run
    pub total: usize,
    /// Rows handled so far, skipped included
    pub processed: usize,
    /// Rows that reached rendering (successes plus failures)
    pub attempted: usize,
    /// Rows sent, or previewed in dry-run
    pub succeeded: usize,
    /// Rows that failed
    pub failed: usize,
    /// Rows skipped for blank required values
    pub skipped: usize,
}

/// Summary of a whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    /// Run identifier, also present on every log line of the run
    pub run_id: Uuid,

    /// Whether the run was a dry-run
    pub dry_run: bool,

    /// Terminal state
    pub state: RunState,

    /// Rows in the run
    pub total: usize,

    /// Rows that reached rendering
    pub attempted: usize,

    /// Rows sent, or previewed in dry-run
    pub succeeded: usize,

    /// Rows that failed
    pub failed: usize,

    /// Rows skipped for blank required values
    pub skipped: usize,

    /// Whether the run stopped on cancellation
    pub cancelled: bool,

    /// Run start
    pub started_at: DateTime<Local>,

    /// Run end
    pub finished_at: Option<DateTime<Local>>,

    /// Per-row outcomes in table order
    pub results: Vec<DispatchResult>,
}

impl DispatchSummary {
    /// Empty summary for a run over `total` rows
    #[must_use]
    pub fn new(run_id: Uuid, total: usize, dry_run: bool) -> Self {
        Self {
            run_id,
            dry_run,
            state: RunState::Sending,
            total,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            cancelled: false,
            started_at: Local::now(),
            finished_at: None,
            results: Vec::new(),
        }
    }

    /// Add one row's outcome
    pub fn record(&mut self, result: DispatchResult) {
        match result.status {
            DispatchStatus::Sent { .. } | DispatchStatus::WouldSend => {
                self.attempted += 1;
                self.succeeded += 1;
            }
            DispatchStatus::Failed { .. } => {
                self.attempted += 1;
                self.failed += 1;
            }
            DispatchStatus::Skipped { .. } => self.skipped += 1,
        }
        self.results.push(result);
    }

    /// Close the summary with its terminal state
    pub fn finish(&mut self, state: RunState) {
        self.state = state;
        self.cancelled = state == RunState::Cancelled;
        self.finished_at = Some(Local::now());
    }

    /// Current counters
    #[must_use]
    pub fn progress(&self) -> Progress {
        Progress {
            total: self.total,
            processed: self.results.len(),
            attempted: self.attempted,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
        }
    }

    /// Rows never reached because the run stopped early
    #[must_use]
    pub fn not_processed(&self) -> usize {
        self.total.saturating_sub(self.results.len())
    }

    /// Failed rows, for manual follow-up
    pub fn failures(&self) -> impl Iterator<Item = &DispatchResult> {
        self.results.iter().filter(|result| result.is_failure())
    }

    /// Serialize as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the JSON report to `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

//! Append-only CSV audit log of row outcomes

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;
use tracing::warn;

use super::{DispatchEvent, DispatchResult, EventSink};

const HEADER: [&str; 6] = ["timestamp", "email", "subject", "status", "attempts", "error"];

/// Event sink appending one CSV line per finished row
///
/// The header is written only when the file is new or empty. Each line is
/// flushed as soon as it is written, so a crash loses at most the row in
/// flight.
#[derive(Debug)]
pub struct CsvAuditLog {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl CsvAuditLog {
    /// Open (or create) an audit log for appending
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the header cannot be
    /// written.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_new = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(HEADER)?;
            writer.flush()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
        })
    }

    /// Location of the log
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row outcome
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be written or flushed.
    pub fn append(&self, result: &DispatchResult) -> std::io::Result<()> {
        let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%:z").to_string();
        let attempts = result.attempts.to_string();
        let mut writer = self.writer.lock();
        writer.write_record([
            timestamp.as_str(),
            result.recipient.as_str(),
            result.subject.as_deref().unwrap_or_default(),
            result.status.label(),
            attempts.as_str(),
            result.error_detail().unwrap_or_default(),
        ])?;
        writer.flush()
    }
}

impl EventSink for CsvAuditLog {
    fn emit(&self, event: &DispatchEvent) {
        if let DispatchEvent::RowCompleted(result) = event {
            if let Err(e) = self.append(result) {
                warn!(
                    path = %self.path.display(),
                    line = result.line,
                    error = %e,
                    "Failed to write audit log entry"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchStatus;
    use tempfile::TempDir;

    fn row(line: usize, status: DispatchStatus) -> DispatchResult {
        DispatchResult {
            line,
            recipient: format!("u{line}@example.com"),
            subject: Some("Olá, mundo".to_string()),
            attempts: 1,
            status,
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("audit.csv");

        {
            let log = CsvAuditLog::open(&path).unwrap();
            log.emit(&DispatchEvent::RowCompleted(row(
                1,
                DispatchStatus::Sent {
                    receipt: "250 OK".into(),
                },
            )));
        }
        {
            let log = CsvAuditLog::open(&path).unwrap();
            log.emit(&DispatchEvent::RowCompleted(row(
                2,
                DispatchStatus::Failed {
                    kind: crate::error::ErrorKind::Transport,
                    detail: "550 no such user".into(),
                },
            )));
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp,email,subject,status,attempts,error");
        assert!(lines[1].contains("u1@example.com,\"Olá, mundo\",sent,1,"));
        assert!(lines[2].ends_with("failed,1,550 no such user"));
    }

    #[test]
    fn test_other_events_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.csv");
        let log = CsvAuditLog::open(&path).unwrap();

        log.emit(&DispatchEvent::Progress(crate::dispatch::Progress::default()));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}

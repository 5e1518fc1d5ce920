//! Terminal presentation of dispatch events

use std::time::Duration;

use anyhow::{Context, Result};
use console::{style, Emoji};
use emaileria::dispatch::{
    DispatchEvent, DispatchSummary, EventSink, LogLevel, LogRecord, ValidationReport,
};
use emaileria::preview::{snippet, SNIPPET_CHARS};
use indicatif::{ProgressBar, ProgressStyle};

static SUCCESS: Emoji = Emoji("✓", "√");
static WARNING: Emoji = Emoji("⚠", "!");
static FAILURE: Emoji = Emoji("✗", "x");
static INFO: Emoji = Emoji("ℹ", "i");

/// Event sink drawing a progress bar and printing row outcomes above it
#[derive(Debug, Clone)]
pub struct ProgressSink {
    bar: ProgressBar,
}

impl ProgressSink {
    /// Progress bar for `total` rows
    ///
    /// # Errors
    ///
    /// Returns an error if the progress template is invalid.
    pub fn new(total: usize) -> Result<Self> {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .context("Failed to set progress style")?
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Ok(Self { bar })
    }

    /// Sink that only prints, for non-interactive use
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    fn print(&self, line: String) {
        if self.bar.is_hidden() {
            println!("{line}");
        } else {
            self.bar.println(line);
        }
    }
}

impl EventSink for ProgressSink {
    fn emit(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::Progress(progress) => {
                self.bar.set_length(progress.total as u64);
                self.bar.set_position(progress.processed as u64);
                self.bar.set_message(format!(
                    "{} ok, {} failed, {} skipped",
                    progress.succeeded, progress.failed, progress.skipped
                ));
            }
            DispatchEvent::Preview {
                line,
                recipient,
                subject,
                body,
            } => {
                self.print(format!(
                    "{} #{line} {} {}\n    {}",
                    INFO,
                    style(recipient).cyan(),
                    style(subject).bold(),
                    style(snippet(body, SNIPPET_CHARS)).dim()
                ));
            }
            DispatchEvent::Finished(_) => self.bar.finish_and_clear(),
            other => {
                if let Some(record) = other.log_record() {
                    if record.level > LogLevel::Debug {
                        self.print(format_record(&record));
                    }
                }
            }
        }
    }
}

/// One styled line for a log record
#[must_use]
pub fn format_record(record: &LogRecord) -> String {
    let marker = match record.level {
        LogLevel::Debug => style(INFO.to_string()).dim(),
        LogLevel::Info => style(SUCCESS.to_string()).green(),
        LogLevel::Warn => style(WARNING.to_string()).yellow(),
        LogLevel::Error => style(FAILURE.to_string()).red(),
    };
    match &record.recipient {
        Some(recipient) => format!("{marker} {} {}", style(recipient).cyan(), record.message),
        None => format!("{marker} {}", record.message),
    }
}

/// Print a validation report
pub fn print_validation(report: &ValidationReport) {
    let headline = report.to_string();
    if report.is_blocking() {
        println!("{} {}", style(FAILURE.to_string()).red(), style(headline).red().bold());
    } else if report.has_warnings() {
        println!("{} {}", style(WARNING.to_string()).yellow(), style(headline).yellow());
    } else {
        println!("{} {}", style(SUCCESS.to_string()).green(), style(headline).green());
    }

    if !report.placeholders.is_empty() {
        let names: Vec<&str> = report.placeholders.iter().map(String::as_str).collect();
        println!("  {} {}", style("Placeholders:").dim(), names.join(", "));
    }
    for issue in &report.missing {
        println!(
            "  {} row {} ({}): {{{{ {} }}}} in {} has no value",
            style(FAILURE.to_string()).red(),
            issue.line,
            issue.recipient,
            issue.placeholder,
            issue.field.as_str()
        );
    }
    for issue in report.invalid_recipients.iter().chain(&report.incomplete_rows) {
        println!(
            "  {} row {} ({}): {}",
            style(WARNING.to_string()).yellow(),
            issue.line,
            issue.recipient,
            issue.detail
        );
    }
}

/// Print the end-of-run summary with failed recipients for manual resend
pub fn print_summary(summary: &DispatchSummary) {
    println!();
    let title = if summary.dry_run {
        "Dry-run summary"
    } else {
        "Dispatch summary"
    };
    println!("{} ({})", style(title).bold(), summary.state);
    println!("{}", "─".repeat(40));
    println!("  {:<12} {}", "Total", summary.total);
    println!("  {:<12} {}", "Attempted", summary.attempted);
    println!(
        "  {:<12} {}",
        if summary.dry_run { "Previewed" } else { "Sent" },
        style(summary.succeeded).green()
    );
    println!("  {:<12} {}", "Failed", style(summary.failed).red());
    println!("  {:<12} {}", "Skipped", style(summary.skipped).yellow());
    if summary.cancelled {
        println!(
            "  {:<12} {}",
            "Not reached",
            style(summary.not_processed()).yellow()
        );
    }

    let failures: Vec<_> = summary.failures().collect();
    if !failures.is_empty() {
        println!();
        println!("{}", style("Needs manual follow-up:").red().bold());
        for result in failures {
            println!(
                "  row {:<5} {:<32} {}: {}",
                result.line,
                result.recipient,
                result.error_kind().map_or("", |kind| kind.label()),
                result.error_detail().unwrap_or_default()
            );
        }
    }
}

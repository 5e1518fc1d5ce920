//! Pre-flight validation report

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::template::TemplateField;

/// A placeholder with no value in a sampled row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceholderIssue {
    /// 1-based data row number
    pub line: usize,
    /// Row's e-mail address
    pub recipient: String,
    /// Template referencing the placeholder
    pub field: TemplateField,
    /// Placeholder name
    pub placeholder: String,
}

/// A non-blocking problem with a sampled row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    /// 1-based data row number
    pub line: usize,
    /// Row's e-mail address
    pub recipient: String,
    /// What is wrong
    pub detail: String,
}

/// Outcome of checking a sample of rows before sending
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Rows checked
    pub rows_checked: usize,

    /// Placeholders referenced by the templates
    pub placeholders: BTreeSet<String>,

    /// Unresolved placeholders; any entry blocks sending
    pub missing: Vec<PlaceholderIssue>,

    /// Malformed recipient addresses; those rows will fail on their own
    pub invalid_recipients: Vec<RowIssue>,

    /// Rows with blank required values; those rows will be skipped
    pub incomplete_rows: Vec<RowIssue>,
}

impl ValidationReport {
    /// Whether the run must not start without an override
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        !self.missing.is_empty()
    }

    /// Whether there are non-blocking findings
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.invalid_recipients.is_empty() || !self.incomplete_rows.is_empty()
    }

    /// Distinct unresolved placeholder names
    #[must_use]
    pub fn missing_names(&self) -> BTreeSet<&str> {
        self.missing
            .iter()
            .map(|issue| issue.placeholder.as_str())
            .collect()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_blocking() {
            let names: Vec<&str> = self.missing_names().into_iter().collect();
            write!(
                f,
                "validation failed on {} sampled rows: placeholders without values: {}",
                self.rows_checked,
                names.join(", ")
            )?;
        } else {
            write!(f, "validation passed on {} sampled rows", self.rows_checked)?;
        }
        if !self.invalid_recipients.is_empty() {
            write!(
                f,
                "; {} invalid recipient address(es)",
                self.invalid_recipients.len()
            )?;
        }
        if !self.incomplete_rows.is_empty() {
            write!(
                f,
                "; {} row(s) with blank required values",
                self.incomplete_rows.len()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_blocking() {
        let report = ValidationReport {
            rows_checked: 2,
            missing: vec![
                PlaceholderIssue {
                    line: 1,
                    recipient: "a@x.com".into(),
                    field: TemplateField::Body,
                    placeholder: "cidade".into(),
                },
                PlaceholderIssue {
                    line: 2,
                    recipient: "b@x.com".into(),
                    field: TemplateField::Body,
                    placeholder: "cidade".into(),
                },
            ],
            ..ValidationReport::default()
        };

        assert!(report.is_blocking());
        assert_eq!(
            report.to_string(),
            "validation failed on 2 sampled rows: placeholders without values: cidade"
        );
    }

    #[test]
    fn test_display_warnings() {
        let report = ValidationReport {
            rows_checked: 3,
            invalid_recipients: vec![RowIssue {
                line: 2,
                recipient: "bad".into(),
                detail: "invalid email address".into(),
            }],
            ..ValidationReport::default()
        };

        assert!(!report.is_blocking());
        assert!(report.has_warnings());
        assert_eq!(
            report.to_string(),
            "validation passed on 3 sampled rows; 1 invalid recipient address(es)"
        );
    }
}

//! Contact tables loaded from spreadsheets or delimited text
//!
//! A [`ContactTable`] is an ordered, immutable list of [`ContactRow`]s sharing
//! one normalized column set. Column keys are trimmed and lower-cased once at
//! load time; the header spelling found in the file stays available as a
//! template alias.
//!
//! Every table must carry the columns `email`, `tratamento` and `nome`
//! (matched case-insensitively). Cells may still be blank in individual rows;
//! that is reported per row by [`ContactRow::missing_required`], not as a
//! load failure.
//!
//! # Examples
//!
//! ```rust
//! use emaileria::contacts::{CellValue, ContactTable};
//!
//! let table = ContactTable::from_records(
//!     vec!["Email".into(), "Tratamento".into(), "NOME".into()],
//!     vec![vec![
//!         CellValue::from_text("ana@example.com"),
//!         CellValue::from_text("Sra."),
//!         CellValue::from_text("Ana"),
//!     ]],
//! )?;
//!
//! assert_eq!(table.len(), 1);
//! assert_eq!(table.rows()[0].email(), "ana@example.com");
//! # Ok::<(), emaileria::contacts::LoadError>(())
//! ```

mod loader;

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

pub use loader::{load_contacts, SourceFormat};

/// Columns every contact table must provide
pub const REQUIRED_COLUMNS: [&str; 3] = ["email", "tratamento", "nome"];

/// Errors raised while loading a contact table
#[derive(Debug, Error)]
pub enum LoadError {
    /// The contact file does not exist
    #[error("contact file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file extension is not a known tabular format
    #[error(
        "unsupported contact file format {0:?}: expected .csv, .tsv, .txt, .xlsx, .xlsm, .xls or .ods"
    )]
    UnsupportedFormat(String),

    /// The file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Delimited text was malformed
    #[error("invalid delimited text: {0}")]
    Csv(#[from] csv::Error),

    /// Spreadsheet could not be parsed
    #[error("failed to read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// The requested sheet does not exist
    #[error("sheet {sheet:?} not found; available sheets: {}", available.join(", "))]
    SheetNotFound {
        /// Requested sheet name
        sheet: String,
        /// Sheets present in the workbook
        available: Vec<String>,
    },

    /// The source has no header row
    #[error("the contact file has no header row")]
    NoHeader,

    /// One or more required columns are absent
    #[error(
        "missing required columns: {}. The sheet must include at least: email, tratamento, nome (case-insensitive)",
        .0.join(", ")
    )]
    MissingColumns(Vec<String>),

    /// Two headers collapse to the same key after normalization
    #[error("column {0:?} appears more than once (column names are case-insensitive)")]
    DuplicateColumn(String),
}

/// A single scalar cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Blank cell
    Empty,
    /// Text, already trimmed
    Text(String),
    /// Integral number
    Integer(i64),
    /// Non-integral number
    Number(f64),
    /// Boolean cell
    Bool(bool),
    /// Date or date-time cell
    Date(NaiveDateTime),
}

impl CellValue {
    /// Build a text cell; whitespace-only input becomes [`CellValue::Empty`]
    #[must_use]
    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::Empty
        } else {
            Self::Text(trimmed.to_string())
        }
    }

    /// Build a numeric cell, collapsing integral floats to integers
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    pub fn from_float(value: f64) -> Self {
        if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
            Self::Integer(value as i64)
        } else {
            Self::Number(value)
        }
    }

    /// Whether the cell carries no value
    #[must_use]
    pub const fn is_blank(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// String form used when merging into templates
    #[must_use]
    pub fn to_template_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Text(text) => f.write_str(text),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Date(value) if value.time() == NaiveTime::MIN => {
                write!(f, "{}", value.format("%Y-%m-%d"))
            }
            Self::Date(value) => write!(f, "{}", value.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

/// A normalized column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    /// Trimmed, lower-cased key used for lookups
    pub key: String,
    /// Header text as it appeared in the source (trimmed)
    pub header: String,
}

/// One contact record
#[derive(Debug, Clone)]
pub struct ContactRow {
    line: usize,
    values: IndexMap<String, CellValue>,
    columns: Arc<[Column]>,
}

impl ContactRow {
    /// 1-based data row number in the source file
    #[must_use]
    pub const fn line(&self) -> usize {
        self.line
    }

    /// Look up a cell by column name (case-insensitive)
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.values.get(column.trim().to_lowercase().as_str())
    }

    /// Cell as template text; absent and blank cells are empty strings
    #[must_use]
    pub fn text(&self, column: &str) -> String {
        self.get(column)
            .map(CellValue::to_template_string)
            .unwrap_or_default()
    }

    /// Recipient address
    #[must_use]
    pub fn email(&self) -> String {
        self.text("email")
    }

    /// Cells keyed by normalized column key, in column order
    #[must_use]
    pub const fn values(&self) -> &IndexMap<String, CellValue> {
        &self.values
    }

    /// Required columns whose cell is blank in this row
    #[must_use]
    pub fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_COLUMNS
            .into_iter()
            .filter(|column| self.get(column).is_none_or(CellValue::is_blank))
            .collect()
    }

    /// Names and merged text addressable from templates
    ///
    /// Yields every normalized key, plus the original header spelling when it
    /// differs from the key.
    pub fn template_values(&self) -> impl Iterator<Item = (&str, String)> + '_ {
        self.columns.iter().flat_map(move |column| {
            let text = self
                .values
                .get(&column.key)
                .map(CellValue::to_template_string)
                .unwrap_or_default();
            let alias = (column.header != column.key).then(|| (column.header.as_str(), text.clone()));
            std::iter::once((column.key.as_str(), text)).chain(alias)
        })
    }
}

/// Ordered, immutable contact list with a shared column set
#[derive(Debug, Clone)]
pub struct ContactTable {
    columns: Arc<[Column]>,
    rows: Vec<ContactRow>,
}

impl ContactTable {
    /// Build a table from a header row and raw records
    ///
    /// Headers are trimmed and lower-cased; blank headers drop their column.
    /// Short records are padded with blanks, completely blank records are
    /// dropped, and row numbers keep counting the dropped records.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::MissingColumns`] when a required column is absent
    /// and [`LoadError::DuplicateColumn`] when two headers normalize to the
    /// same key.
    pub fn from_records(
        headers: Vec<String>,
        records: Vec<Vec<CellValue>>,
    ) -> Result<Self, LoadError> {
        let mut seen = HashSet::new();
        let mut kept: Vec<(usize, Column)> = Vec::with_capacity(headers.len());
        for (index, raw) in headers.into_iter().enumerate() {
            let header = raw.trim().to_string();
            if header.is_empty() {
                tracing::debug!(column = index + 1, "Ignoring column with blank header");
                continue;
            }
            let key = header.to_lowercase();
            if !seen.insert(key.clone()) {
                return Err(LoadError::DuplicateColumn(header));
            }
            kept.push((index, Column { key, header }));
        }

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|required| !seen.contains(**required))
            .map(|required| (*required).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns(missing));
        }

        let columns: Arc<[Column]> = kept.iter().map(|(_, column)| column.clone()).collect();
        let rows = records
            .into_iter()
            .enumerate()
            .filter_map(|(index, mut record)| {
                let values: IndexMap<String, CellValue> = kept
                    .iter()
                    .map(|(position, column)| {
                        let cell = record
                            .get_mut(*position)
                            .map(|cell| std::mem::replace(cell, CellValue::Empty))
                            .unwrap_or(CellValue::Empty);
                        (column.key.clone(), cell)
                    })
                    .collect();
                if values.values().all(CellValue::is_blank) {
                    return None;
                }
                Some(ContactRow {
                    line: index + 1,
                    values,
                    columns: Arc::clone(&columns),
                })
            })
            .collect();

        Ok(Self { columns, rows })
    }

    /// Normalized columns in source order
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Rows in source order
    #[must_use]
    pub fn rows(&self) -> &[ContactRow] {
        &self.rows
    }

    /// Iterate rows in source order
    pub fn iter(&self) -> std::slice::Iter<'_, ContactRow> {
        self.rows.iter()
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sub-table skipping `offset` rows and keeping at most `limit`
    ///
    /// Row numbers are preserved.
    #[must_use]
    pub fn window(&self, offset: usize, limit: Option<usize>) -> Self {
        let rows = self
            .rows
            .iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Self {
            columns: Arc::clone(&self.columns),
            rows,
        }
    }
}

impl<'a> IntoIterator for &'a ContactTable {
    type Item = &'a ContactRow;
    type IntoIter = std::slice::Iter<'a, ContactRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

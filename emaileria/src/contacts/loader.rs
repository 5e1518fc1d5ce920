//! Readers for delimited text and spreadsheet contact files

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::{debug, info};

use super::{CellValue, ContactTable, LoadError};

const DELIMITER_CANDIDATES: [u8; 3] = [b',', b';', b'\t'];

/// Contact file family, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// `.csv`, `.tsv` or `.txt`
    Delimited,
    /// `.xlsx`, `.xlsm`, `.xlsb`, `.xls` or `.ods`
    Spreadsheet,
}

impl SourceFormat {
    /// Detect the format from a path's extension (case-insensitive)
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::UnsupportedFormat`] for any other extension.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "csv" | "tsv" | "txt" => Ok(Self::Delimited),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(Self::Spreadsheet),
            _ => Err(LoadError::UnsupportedFormat(extension)),
        }
    }
}

/// Load a contact table from disk
///
/// `sheet` selects a worksheet by name for spreadsheet files; the first
/// sheet is used when it is `None`. It is ignored for delimited text.
///
/// # Errors
///
/// Returns a [`LoadError`] when the file is missing, unreadable, of an
/// unsupported format, lacks the requested sheet, or lacks a required column.
pub fn load_contacts(path: &Path, sheet: Option<&str>) -> Result<ContactTable, LoadError> {
    if !path.is_file() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    let format = SourceFormat::from_path(path)?;
    info!(path = %path.display(), ?format, "Loading contacts");

    let (headers, records) = match format {
        SourceFormat::Delimited => read_delimited(path)?,
        SourceFormat::Spreadsheet => read_spreadsheet(path, sheet)?,
    };

    let table = ContactTable::from_records(headers, records)?;
    debug!(
        rows = table.len(),
        columns = table.columns().len(),
        "Contacts loaded"
    );
    Ok(table)
}

type RawTable = (Vec<String>, Vec<Vec<CellValue>>);

fn read_delimited(path: &Path) -> Result<RawTable, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let content = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
    let delimiter = sniff_delimiter(content);
    debug!(delimiter = %char::from(delimiter).escape_default(), "Detected delimiter");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(|header| header.trim().is_empty()) {
        return Err(LoadError::NoHeader);
    }

    let records = reader
        .records()
        .map(|record| {
            record.map(|record| record.iter().map(CellValue::from_text).collect::<Vec<_>>())
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((headers, records))
}

/// Pick the candidate delimiter occurring most often in the header line
///
/// Ties and headers without any candidate fall back to a comma.
fn sniff_delimiter(content: &[u8]) -> u8 {
    let header = content
        .split(|byte| *byte == b'\n')
        .next()
        .unwrap_or_default();
    let mut best = (b',', 0usize);
    for candidate in DELIMITER_CANDIDATES {
        let count = header.iter().filter(|byte| **byte == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

fn read_spreadsheet(path: &Path, sheet: Option<&str>) -> Result<RawTable, LoadError> {
    let mut workbook = open_workbook_auto(path)?;
    let available = workbook.sheet_names();

    let name = match sheet {
        Some(requested) => available
            .iter()
            .find(|name| name.as_str() == requested)
            .or_else(|| {
                available
                    .iter()
                    .find(|name| name.eq_ignore_ascii_case(requested))
            })
            .cloned()
            .ok_or_else(|| LoadError::SheetNotFound {
                sheet: requested.to_string(),
                available: available.clone(),
            })?,
        None => available.first().cloned().ok_or(LoadError::NoHeader)?,
    };
    debug!(sheet = %name, "Reading worksheet");

    let range = workbook.worksheet_range(&name)?;
    let mut rows = range.rows();
    let header = rows.next().ok_or(LoadError::NoHeader)?;
    let headers = header
        .iter()
        .map(|cell| cell_value(cell).to_template_string())
        .collect();
    let records = rows
        .map(|row| row.iter().map(cell_value).collect())
        .collect();

    Ok((headers, records))
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => {
            CellValue::from_text(text)
        }
        Data::Int(value) => CellValue::Integer(*value),
        Data::Float(value) => CellValue::from_float(*value),
        Data::Bool(value) => CellValue::Bool(*value),
        Data::DateTime(value) => value
            .as_datetime()
            .map_or_else(|| CellValue::from_float(value.as_f64()), CellValue::Date),
        Data::Error(err) => {
            debug!(error = %err, "Treating spreadsheet error cell as blank");
            CellValue::Empty
        }
    }
}

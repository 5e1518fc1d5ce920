//! Custom template filters

use std::fmt::Write;

use chrono::{NaiveDate, NaiveDateTime};
use minijinja::{Error, ErrorKind};

const DEFAULT_DATE_FORMAT: &str = "%d/%m/%Y";

const DATETIME_INPUTS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_INPUTS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

/// `{{ value | datefmt("%d de %B") }}`
///
/// Accepts ISO date-times, ISO dates and `dd/mm/yyyy`. Defaults to
/// `%d/%m/%Y` when no pattern is given.
pub fn datefmt(value: &str, format: Option<&str>) -> Result<String, Error> {
    let format = format.unwrap_or(DEFAULT_DATE_FORMAT);
    let value = value.trim();

    let mut out = String::new();
    let written = if let Some(datetime) = parse_datetime(value) {
        write!(out, "{}", datetime.format(format))
    } else if let Some(date) = parse_date(value) {
        write!(out, "{}", date.format(format))
    } else {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("datefmt: {value:?} is not a date"),
        ));
    };

    written.map_err(|_| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("datefmt: cannot apply {format:?} to {value:?}"),
        )
    })?;
    Ok(out)
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    DATETIME_INPUTS
        .iter()
        .find_map(|pattern| NaiveDateTime::parse_from_str(value, pattern).ok())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_INPUTS
        .iter()
        .find_map(|pattern| NaiveDate::parse_from_str(value, pattern).ok())
}

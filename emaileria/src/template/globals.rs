//! Run-wide template values

use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;

/// Values available to every render of a run
///
/// The timestamp is captured once; every message of the run sees the same
/// `now`, `data_envio`, `hora_envio` and `hoje`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderGlobals {
    captured_at: NaiveDateTime,
    values: BTreeMap<String, String>,
}

impl RenderGlobals {
    /// Capture the current local time
    #[must_use]
    pub fn capture() -> Self {
        Self::at(Local::now().naive_local())
    }

    /// Globals for a fixed instant
    #[must_use]
    pub fn at(now: NaiveDateTime) -> Self {
        let values = [
            ("now", now.format("%Y-%m-%dT%H:%M:%S").to_string()),
            ("data_envio", now.format("%Y-%m-%d").to_string()),
            ("hora_envio", now.format("%H:%M").to_string()),
            ("hoje", now.format("%d/%m/%Y").to_string()),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        Self {
            captured_at: now,
            values,
        }
    }

    /// Add or replace a global
    #[must_use]
    pub fn with<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Instant the globals were captured
    #[must_use]
    pub const fn captured_at(&self) -> NaiveDateTime {
        self.captured_at
    }

    /// Look up a global
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// All globals, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_fixed_instant_values() {
        let now = NaiveDate::from_ymd_opt(2025, 1, 31)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap();
        let globals = RenderGlobals::at(now);

        assert_eq!(globals.get("now"), Some("2025-01-31T09:05:07"));
        assert_eq!(globals.get("data_envio"), Some("2025-01-31"));
        assert_eq!(globals.get("hora_envio"), Some("09:05"));
        assert_eq!(globals.get("hoje"), Some("31/01/2025"));
        assert_eq!(globals.captured_at(), now);
    }

    #[test]
    fn test_with_adds_global() {
        let globals = RenderGlobals::capture().with("campanha", "Outono");
        assert_eq!(globals.get("campanha"), Some("Outono"));
        assert_eq!(globals.iter().count(), 5);
    }
}

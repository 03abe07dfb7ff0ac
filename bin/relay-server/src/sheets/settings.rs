//! The "Settings" sheet: operator-editable key/value pairs.
//!
//! Column A holds the key, column B the value.  Recognised keys are
//! `start_time`, `end_time` (`HH:MM`) and `follow_up_days`.  Anything else,
//! including a header row, is ignored.

use std::sync::Arc;

use tracing::warn;

use super::{cell, SheetBackend, SheetError};
use crate::relay::hours::WorkingHours;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelaySettings {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub follow_up_days: Option<i64>,
}

impl RelaySettings {
    pub fn from_rows(rows: &[Vec<String>]) -> Self {
        let mut settings = Self::default();
        for row in rows {
            let value = cell(row, 2).trim();
            if value.is_empty() {
                continue;
            }
            match cell(row, 1).trim() {
                "start_time" => settings.start_time = Some(value.to_owned()),
                "end_time" => settings.end_time = Some(value.to_owned()),
                "follow_up_days" => match value.parse() {
                    Ok(days) => settings.follow_up_days = Some(days),
                    Err(_) => warn!(raw = %value, "ignoring non-numeric follow_up_days"),
                },
                _ => {}
            }
        }
        settings
    }

    /// Sheet hours when both ends are present and valid, else `fallback`.
    pub fn working_hours(&self, fallback: Option<WorkingHours>) -> Option<WorkingHours> {
        let (Some(start), Some(end)) = (&self.start_time, &self.end_time) else {
            return fallback;
        };
        match WorkingHours::parse(start, end) {
            Ok(hours) => Some(hours),
            Err(e) => {
                warn!(%start, %end, error = %e, "invalid working hours in settings sheet");
                fallback
            }
        }
    }

    pub fn follow_up_days(&self, fallback: i64) -> i64 {
        self.follow_up_days.unwrap_or(fallback)
    }
}

#[derive(Clone)]
pub struct SettingsSheet {
    backend: Arc<dyn SheetBackend>,
    sheet: String,
}

impl SettingsSheet {
    pub fn new(backend: Arc<dyn SheetBackend>, sheet: impl Into<String>) -> Self {
        Self {
            backend,
            sheet: sheet.into(),
        }
    }

    pub async fn load(&self) -> Result<RelaySettings, SheetError> {
        let rows = self.backend.read_rows(&self.sheet).await?;
        Ok(RelaySettings::from_rows(&rows))
    }

    /// Like [`SettingsSheet::load`], but a missing or unreadable sheet yields
    /// empty settings so callers fall back to configuration.
    pub async fn load_or_default(&self) -> RelaySettings {
        match self.load().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(sheet = %self.sheet, error = %e, "settings sheet unavailable; using config values");
                RelaySettings::default()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::MemorySheet;
    use chrono::NaiveTime;

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    #[tokio::test]
    async fn reads_known_keys_and_ignores_the_rest() {
        let sheet = Arc::new(MemorySheet::new());
        sheet.seed(
            "Settings",
            &[
                &["key", "value"],
                &["start_time", "09:00"],
                &["end_time", " 18:00 "],
                &["follow_up_days", "3"],
                &["colour", "blue"],
            ],
        );
        let settings = SettingsSheet::new(sheet, "Settings").load().await.unwrap();
        assert_eq!(settings.start_time.as_deref(), Some("09:00"));
        assert_eq!(settings.end_time.as_deref(), Some("18:00"));
        assert_eq!(settings.follow_up_days(7), 3);

        let hours = settings.working_hours(None).unwrap();
        assert!(hours.contains(t("12:00")));
    }

    #[test]
    fn invalid_or_partial_hours_fall_back() {
        let fallback = WorkingHours::parse("22:00", "06:00").ok();
        let partial = RelaySettings {
            start_time: Some("09:00".into()),
            ..Default::default()
        };
        assert_eq!(partial.working_hours(fallback), fallback);

        let garbled = RelaySettings {
            start_time: Some("nine".into()),
            end_time: Some("18:00".into()),
            follow_up_days: None,
        };
        assert_eq!(garbled.working_hours(fallback), fallback);
        assert_eq!(garbled.follow_up_days(7), 7);
    }

    #[tokio::test]
    async fn missing_sheet_loads_defaults() {
        let sheet = Arc::new(MemorySheet::new());
        sheet.fail_reads(true);
        let settings = SettingsSheet::new(sheet, "Settings").load_or_default().await;
        assert_eq!(settings, RelaySettings::default());
    }
}

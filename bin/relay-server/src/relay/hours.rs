//! Working-hours gate.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;

const TIME_FORMAT: &str = "%H:%M";

/// An `HH:MM`–`HH:MM` window in local time.  `start > end` wraps past
/// midnight; `start == end` is open around the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingHours {
    pub fn parse(start: &str, end: &str) -> Result<Self, String> {
        let parse = |raw: &str| {
            NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT)
                .map_err(|e| format!("{raw:?} is not HH:MM: {e}"))
        };
        Ok(Self {
            start: parse(start)?,
            end: parse(end)?,
        })
    }

    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start == self.end {
            true
        } else if self.start < self.end {
            self.start <= now && now < self.end
        } else {
            now >= self.start || now < self.end
        }
    }

    /// Evaluate `instant` on the wall clock of `tz`.
    pub fn contains_instant(&self, instant: DateTime<Utc>, tz: Tz) -> bool {
        self.contains(instant.with_timezone(&tz).time())
    }
}

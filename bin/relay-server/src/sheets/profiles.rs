//! The "Client tag" sheet: one row per contact.
//!
//! ```text
//! A profile_name | B status | C last_contact (YYYY-MM-DD) | D user_id | E platform
//! ```
//!
//! Row 1 is a header.  "Today" is evaluated in the configured time zone.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use super::{cell, SheetBackend, SheetError};
use crate::channels::Platform;

const DATE_FORMAT: &str = "%Y-%m-%d";

const COL_NAME: usize = 1;
const COL_STATUS: usize = 2;
const COL_LAST_CONTACT: usize = 3;
const COL_USER_ID: usize = 4;
const COL_PLATFORM: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStatus {
    InProgress,
    Done,
}

impl ProfileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileStatus::InProgress => "in_progress",
            ProfileStatus::Done => "done",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "in_progress" => Some(ProfileStatus::InProgress),
            "done" => Some(ProfileStatus::Done),
            _ => None,
        }
    }
}

/// A parsed profile row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// 1-based sheet row.
    pub row: usize,
    pub name: String,
    pub status: ProfileStatus,
    pub last_contact: NaiveDate,
    pub user_id: String,
    /// Raw platform tag; see [`Platform::parse`].
    pub platform: String,
}

/// What [`ProfileDirectory::touch`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    Added,
    Refreshed,
    Unchanged,
}

#[derive(Clone)]
pub struct ProfileDirectory {
    backend: Arc<dyn SheetBackend>,
    sheet: String,
    tz: Tz,
}

impl std::fmt::Debug for ProfileDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileDirectory")
            .field("sheet", &self.sheet)
            .field("tz", &self.tz)
            .finish_non_exhaustive()
    }
}

impl ProfileDirectory {
    pub fn new(backend: Arc<dyn SheetBackend>, sheet: impl Into<String>, tz: Tz) -> Self {
        Self {
            backend,
            sheet: sheet.into(),
            tz,
        }
    }

    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    /// Case-sensitive exact match against the name column, header excluded.
    pub async fn has_profile(&self, name: &str) -> Result<bool, SheetError> {
        let names = self.backend.read_column(&self.sheet, COL_NAME).await?;
        Ok(names.iter().skip(1).any(|n| n == name))
    }

    pub async fn add_profile(
        &self,
        name: &str,
        user_id: &str,
        platform: Platform,
    ) -> Result<(), SheetError> {
        self.add_profile_on(name, user_id, platform, self.today()).await
    }

    pub(crate) async fn add_profile_on(
        &self,
        name: &str,
        user_id: &str,
        platform: Platform,
        today: NaiveDate,
    ) -> Result<(), SheetError> {
        let row = vec![
            name.to_owned(),
            ProfileStatus::InProgress.as_str().to_owned(),
            today.format(DATE_FORMAT).to_string(),
            user_id.to_owned(),
            platform.as_str().to_owned(),
        ];
        self.backend.append_row(&self.sheet, row).await?;
        info!(profile = %name, %platform, "added profile");
        Ok(())
    }

    /// Write today's date for `name`.  Returns `false` without writing when
    /// the row is missing, already dated today, or marked done.
    pub async fn update_timestamp(&self, name: &str) -> Result<bool, SheetError> {
        self.update_timestamp_on(name, self.today()).await
    }

    pub(crate) async fn update_timestamp_on(
        &self,
        name: &str,
        today: NaiveDate,
    ) -> Result<bool, SheetError> {
        let today = today.format(DATE_FORMAT).to_string();
        let rows = self.backend.read_rows(&self.sheet).await?;
        let Some((index, row)) = rows
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, row)| cell(row, COL_NAME) == name)
        else {
            return Ok(false);
        };

        if cell(row, COL_LAST_CONTACT).trim() == today {
            debug!(profile = %name, %today, "timestamp already current");
            return Ok(false);
        }
        if ProfileStatus::parse(cell(row, COL_STATUS)) == Some(ProfileStatus::Done) {
            debug!(profile = %name, "profile is done; timestamp left alone");
            return Ok(false);
        }

        self.backend
            .update_cell(&self.sheet, index + 1, COL_LAST_CONTACT, &today)
            .await?;
        Ok(true)
    }

    /// `in_progress` profiles last contacted at least `threshold_days` ago.
    pub async fn list_stale(&self, threshold_days: i64) -> Result<Vec<Profile>, SheetError> {
        self.list_stale_on(threshold_days, self.today()).await
    }

    pub(crate) async fn list_stale_on(
        &self,
        threshold_days: i64,
        today: NaiveDate,
    ) -> Result<Vec<Profile>, SheetError> {
        let rows = self.backend.read_rows(&self.sheet).await?;
        Ok(rows
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(index, row)| parse_row(index + 1, row))
            .filter(|p| p.status == ProfileStatus::InProgress)
            .filter(|p| (today - p.last_contact).num_days() >= threshold_days)
            .collect())
    }

    /// Add the profile if it is new, otherwise refresh its date.
    pub async fn touch(
        &self,
        name: &str,
        user_id: &str,
        platform: Platform,
    ) -> Result<TouchOutcome, SheetError> {
        if self.has_profile(name).await? {
            if self.update_timestamp(name).await? {
                Ok(TouchOutcome::Refreshed)
            } else {
                Ok(TouchOutcome::Unchanged)
            }
        } else {
            self.add_profile(name, user_id, platform).await?;
            Ok(TouchOutcome::Added)
        }
    }
}

fn parse_row(row_number: usize, row: &[String]) -> Option<Profile> {
    let name = cell(row, COL_NAME);
    let raw_date = cell(row, COL_LAST_CONTACT);
    let last_contact = match NaiveDate::parse_from_str(raw_date.trim(), DATE_FORMAT) {
        Ok(date) => date,
        Err(e) => {
            debug!(row = row_number, profile = %name, raw = %raw_date, error = %e, "skipping row with bad date");
            return None;
        }
    };
    Some(Profile {
        row: row_number,
        name: name.to_owned(),
        status: ProfileStatus::parse(cell(row, COL_STATUS))?,
        last_contact,
        user_id: cell(row, COL_USER_ID).to_owned(),
        platform: cell(row, COL_PLATFORM).to_owned(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::MemorySheet;

    const SHEET: &str = "Client tag";

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn directory(rows: &[&[&str]]) -> (Arc<MemorySheet>, ProfileDirectory) {
        let header: &[&str] = &["profile_name", "status", "last message timestamp", "user id", "platform"];
        let mut all = vec![header];
        all.extend_from_slice(rows);
        let sheet = Arc::new(MemorySheet::new());
        sheet.seed(SHEET, &all);
        let dir = ProfileDirectory::new(sheet.clone(), SHEET, chrono_tz::Asia::Bangkok);
        (sheet, dir)
    }

    #[tokio::test]
    async fn has_profile_is_case_sensitive() {
        let (_, dir) = directory(&[&["Alice", "in_progress", "2025-07-01", "U1", "line"]]);
        assert!(dir.has_profile("Alice").await.unwrap());
        assert!(!dir.has_profile("alice").await.unwrap());
        assert!(!dir.has_profile("Bob").await.unwrap());
    }

    #[tokio::test]
    async fn header_row_is_not_a_profile() {
        let (sheet, dir) = directory(&[]);
        assert!(!dir.has_profile("profile_name").await.unwrap());
        assert_eq!(
            dir.touch("profile_name", "U9", Platform::Line).await.unwrap(),
            TouchOutcome::Added
        );
        assert_eq!(sheet.row(SHEET, 1)[0], "profile_name");
        assert_eq!(sheet.row(SHEET, 2)[3], "U9");
    }

    #[tokio::test]
    async fn add_profile_appends_in_progress_row() {
        let (sheet, dir) = directory(&[]);
        dir.add_profile_on("Ann", "U1", Platform::Line, date("2025-07-20"))
            .await
            .unwrap();
        assert_eq!(
            sheet.row(SHEET, 2),
            vec!["Ann", "in_progress", "2025-07-20", "U1", "line"]
        );
    }

    #[tokio::test]
    async fn update_timestamp_twice_same_day_writes_once() {
        let (sheet, dir) = directory(&[&["Ann", "in_progress", "2025-07-01", "U1", "line"]]);
        let today = date("2025-07-20");
        assert!(dir.update_timestamp_on("Ann", today).await.unwrap());
        assert!(!dir.update_timestamp_on("Ann", today).await.unwrap());
        assert_eq!(sheet.row(SHEET, 2)[2], "2025-07-20");
        assert_eq!(sheet.writes(), 1);
    }

    #[tokio::test]
    async fn update_timestamp_skips_done_and_missing() {
        let (sheet, dir) = directory(&[&["Ann", "done", "2025-07-01", "U1", "line"]]);
        let today = date("2025-07-20");
        assert!(!dir.update_timestamp_on("Ann", today).await.unwrap());
        assert!(!dir.update_timestamp_on("Nobody", today).await.unwrap());
        assert_eq!(sheet.row(SHEET, 2)[2], "2025-07-01");
        assert_eq!(sheet.writes(), 0);
    }

    #[tokio::test]
    async fn list_stale_filters_by_age_and_status() {
        let (_, dir) = directory(&[
            &["Old", "in_progress", "2025-07-01", "U1", "line"],
            &["Edge", "in_progress", "2025-07-13", "U2", "messenger"],
            &["Fresh", "in_progress", "2025-07-19", "U3", "line"],
            &["Closed", "done", "2025-06-01", "U4", "line"],
            &["Garbled", "in_progress", "last week", "U5", "line"],
        ]);
        let stale = dir.list_stale_on(7, date("2025-07-20")).await.unwrap();
        let names: Vec<&str> = stale.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Old", "Edge"]);
        assert_eq!(stale[1].row, 3);
        assert_eq!(stale[1].platform, "messenger");
    }

    #[tokio::test]
    async fn touch_adds_then_refreshes() {
        let (sheet, dir) = directory(&[]);
        assert_eq!(dir.touch("Ann", "U1", Platform::Messenger).await.unwrap(), TouchOutcome::Added);
        assert_eq!(dir.touch("Ann", "U1", Platform::Messenger).await.unwrap(), TouchOutcome::Unchanged);
        assert_eq!(sheet.row(SHEET, 2)[4], "messenger");
        assert_eq!(sheet.rows(SHEET).len(), 2);
    }
}

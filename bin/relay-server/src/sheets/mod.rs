//! Spreadsheet-backed CRM state.
//!
//! [`SheetBackend`] is the narrow row/cell interface the rest of the server
//! needs.  [`client::SheetsClient`] implements it against the Google Sheets
//! v4 REST API; tests use an in-memory backend.  Rows and columns are
//! 1-based, matching A1 notation.

pub mod client;
pub mod contacts;
pub mod profiles;
pub mod settings;

pub use client::SheetsClient;
pub use contacts::ContactSheet;
pub use profiles::{Profile, ProfileDirectory, ProfileStatus};
pub use settings::SettingsSheet;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("sheets request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sheets API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("sheets authentication failed: {0}")]
    Auth(String),

    #[error("unexpected sheets response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait SheetBackend: Send + Sync {
    /// Rows of `sheet` starting at row 1 (the header); trailing empty rows
    /// are omitted, so index `i` is sheet row `i + 1`.
    async fn read_rows(&self, sheet: &str) -> Result<Vec<Vec<String>>, SheetError>;

    /// Append `row` after the last non-empty row.
    async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<(), SheetError>;

    async fn update_cell(
        &self,
        sheet: &str,
        row: usize,
        column: usize,
        value: &str,
    ) -> Result<(), SheetError>;

    /// Values of one column, top to bottom.  Short rows yield `""`.
    async fn read_column(&self, sheet: &str, column: usize) -> Result<Vec<String>, SheetError> {
        let rows = self.read_rows(sheet).await?;
        Ok(rows
            .into_iter()
            .map(|row| cell(&row, column).to_owned())
            .collect())
    }
}

/// 1-based cell access that tolerates short rows.
pub(crate) fn cell(row: &[String], column: usize) -> &str {
    column
        .checked_sub(1)
        .and_then(|i| row.get(i))
        .map(String::as_str)
        .unwrap_or("")
}

/// `1 → A`, `26 → Z`, `27 → AA`.
pub(crate) fn column_letter(mut column: usize) -> String {
    let mut out = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        out.push(b'A' + rem as u8);
        column = (column - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

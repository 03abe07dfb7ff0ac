//! Google Sheets v4 REST client.
//!
//! Authenticates with either a static OAuth access token or a
//! [`gcp_auth::TokenProvider`]: a service-account key file
//! (`GOOGLE_APPLICATION_CREDENTIALS`), gcloud user credentials, or the
//! GCE/Cloud Run metadata server.  Providers cache and refresh tokens
//! themselves.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{column_letter, SheetBackend, SheetError};

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

#[derive(Clone)]
pub enum TokenSource {
    Static(String),
    Provider(Arc<dyn TokenProvider>),
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Static(_) => f.write_str("Static(..)"),
            TokenSource::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

impl TokenSource {
    /// Pick credentials: a static token wins, then an explicit service-account
    /// key file, then whatever application-default credentials are available.
    pub async fn resolve(
        access_token: Option<&str>,
        credentials_path: Option<&Path>,
    ) -> Result<Self, SheetError> {
        if let Some(token) = access_token {
            info!("sheets auth: static access token");
            return Ok(TokenSource::Static(token.to_owned()));
        }
        if let Some(path) = credentials_path {
            let account = CustomServiceAccount::from_file(path)
                .map_err(|e| SheetError::Auth(format!("{}: {e}", path.display())))?;
            info!(path = %path.display(), "sheets auth: service-account key file");
            return Ok(TokenSource::Provider(Arc::new(account)));
        }
        let provider = gcp_auth::provider()
            .await
            .map_err(|e| SheetError::Auth(e.to_string()))?;
        info!("sheets auth: application-default credentials");
        Ok(TokenSource::Provider(provider))
    }

    async fn access_token(&self) -> Result<String, SheetError> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Provider(provider) => {
                let token = provider
                    .token(&[SHEETS_SCOPE])
                    .await
                    .map_err(|e| SheetError::Auth(e.to_string()))?;
                Ok(token.as_str().to_owned())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug)]
pub struct SheetsClient {
    base_url: String,
    spreadsheet_id: String,
    token: TokenSource,
    client: Client,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: impl Into<String>, token: TokenSource) -> Self {
        Self::with_base_url(spreadsheet_id, token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        spreadsheet_id: impl Into<String>,
        token: TokenSource,
        base_url: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .user_agent(concat!("relay-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            spreadsheet_id: spreadsheet_id.into(),
            token,
            client,
        }
    }

    async fn access_token(&self) -> Result<String, SheetError> {
        self.token.access_token().await
    }

    /// `{base}/{spreadsheet}/values/{range}`, with `range` percent-encoded.
    fn values_url(&self, range: &str) -> Result<Url, SheetError> {
        values_url(&self.base_url, &self.spreadsheet_id, range)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, SheetError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(SheetError::Status { status, body })
    }
}

pub(crate) fn values_url(base_url: &str, spreadsheet_id: &str, range: &str) -> Result<Url, SheetError> {
    let mut url = Url::parse(base_url).map_err(|e| SheetError::Decode(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| SheetError::Decode(format!("{base_url} cannot be a base URL")))?
        .pop_if_empty()
        .push(spreadsheet_id)
        .push("values")
        .push(range);
    Ok(url)
}

/// `'Client tag'`; embedded quotes are doubled as A1 notation requires.
pub(crate) fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

#[async_trait]
impl SheetBackend for SheetsClient {
    async fn read_rows(&self, sheet: &str) -> Result<Vec<Vec<String>>, SheetError> {
        let mut url = self.values_url(&quote_sheet(sheet))?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");
        let resp = self
            .client
            .get(url)
            .bearer_auth(self.access_token().await?)
            .send()
            .await?;
        let range: ValueRange = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| SheetError::Decode(e.to_string()))?;
        Ok(range.values)
    }

    async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<(), SheetError> {
        let mut url = self.values_url(&format!("{}:append", quote_sheet(sheet)))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let resp = self
            .client
            .post(url)
            .bearer_auth(self.access_token().await?)
            .json(&json!({ "values": [row] }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn update_cell(
        &self,
        sheet: &str,
        row: usize,
        column: usize,
        value: &str,
    ) -> Result<(), SheetError> {
        let range = format!("{}!{}{}", quote_sheet(sheet), column_letter(column), row);
        let mut url = self.values_url(&range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "USER_ENTERED");
        let resp = self
            .client
            .put(url)
            .bearer_auth(self.access_token().await?)
            .json(&json!({ "range": range, "values": [[value]] }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

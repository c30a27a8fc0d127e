//! Spreadsheet gateway: typed row access over the Google Sheets REST API.
//!
//! The engine only depends on the [`SheetsGateway`] trait (read raw rows,
//! append audit rows); parsing spreadsheet rows into [`AppointmentEntry`]
//! values lives here as well, as a strict tagged parse so unusable rows are
//! skipped deliberately rather than silently producing nulls.

use crate::model::AppointmentEntry;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use tracing::debug;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/";

/// Accepted formats for column 0, tried in order; first match wins.
const DATE_FORMATS: [&str; 2] = ["%d.%m.%Y %H:%M", "%d.%m.%Y %H:%M:%S"];
const DATE_ONLY_FORMAT: &str = "%d.%m.%Y";

#[async_trait]
pub trait SheetsGateway: Send + Sync {
    /// All rows of a tab, including the header.
    async fn read_rows(&self, tab: &str) -> Result<Vec<Vec<String>>>;

    /// Append one row; callers supply the exact field content.
    async fn append_row(&self, tab: &str, row: &[String]) -> Result<()>;
}

/// Why a row was excluded from the entry sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    EmptyDate,
    BadDate(String),
    MissingHandle,
}

/// Tagged outcome of parsing one spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowParse {
    Entry(AppointmentEntry),
    Skipped(SkipReason),
}

/// Parse one data row (columns: date-time, handle).
pub fn parse_row(row: &[String]) -> RowParse {
    let raw_date = row.first().map(|c| c.trim()).unwrap_or_default();
    if raw_date.is_empty() {
        return RowParse::Skipped(SkipReason::EmptyDate);
    }
    let Some(when) = parse_sheet_datetime(raw_date) else {
        return RowParse::Skipped(SkipReason::BadDate(raw_date.to_string()));
    };
    let handle = row.get(1).map(|c| c.trim()).unwrap_or_default();
    if handle.is_empty() {
        return RowParse::Skipped(SkipReason::MissingHandle);
    }
    RowParse::Entry(AppointmentEntry {
        when,
        handle: handle.to_string(),
    })
}

/// Try `dd.mm.yyyy HH:MM`, `dd.mm.yyyy HH:MM:SS`, then bare `dd.mm.yyyy`
/// (midnight).
pub fn parse_sheet_datetime(value: &str) -> Option<NaiveDateTime> {
    for fmt in DATE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, DATE_ONLY_FORMAT)
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Read a tab and keep only the usable appointment rows. The header row and
/// rows failing the strict parse are filtered out, not errors.
pub async fn read_entries(gateway: &dyn SheetsGateway, tab: &str) -> Result<Vec<AppointmentEntry>> {
    let rows = gateway.read_rows(tab).await?;
    let mut entries = Vec::new();
    for (idx, row) in rows.iter().enumerate().skip(1) {
        match parse_row(row) {
            RowParse::Entry(entry) => entries.push(entry),
            RowParse::Skipped(reason) => {
                debug!(tab, row = idx + 1, ?reason, "skipping spreadsheet row");
            }
        }
    }
    Ok(entries)
}

/// Gateway implementation over the Sheets REST v4 API.
#[derive(Clone)]
pub struct SheetsHttpClient {
    http: Client,
    base_url: Url,
    spreadsheet_id: String,
    token: String,
}

impl fmt::Debug for SheetsHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetsHttpClient")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

impl SheetsHttpClient {
    pub fn new(spreadsheet_id: String, token: String) -> Self {
        let base_url = Url::parse(SHEETS_API_BASE).expect("valid default Sheets URL");
        Self::with_base_url(spreadsheet_id, token, base_url)
    }

    pub fn with_base_url(spreadsheet_id: String, token: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("tg-clinicbot/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            spreadsheet_id,
            token,
        }
    }

    /// URL for `/v4/spreadsheets/{id}/values/{range}`; tab names are pushed as
    /// path segments so non-ASCII worksheet titles are percent-encoded.
    fn values_url(&self, range: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("invalid Sheets base URL"))?
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", range]);
        Ok(url)
    }
}

#[async_trait]
impl SheetsGateway for SheetsHttpClient {
    async fn read_rows(&self, tab: &str) -> Result<Vec<Vec<String>>> {
        let url = self.values_url(tab)?;
        let res = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("failed to reach Google Sheets")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("sheets read error {}: {}", status, body));
        }
        let payload: ValueRange = res
            .json()
            .await
            .context("invalid Sheets response JSON")?;
        Ok(payload.values)
    }

    async fn append_row(&self, tab: &str, row: &[String]) -> Result<()> {
        let mut url = self.values_url(&format!("{}:append", tab))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let body = json!({ "values": [row] });
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("failed to reach Google Sheets")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("sheets append error {}: {}", status, body));
        }
        Ok(())
    }
}

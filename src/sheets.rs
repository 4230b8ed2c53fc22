use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::auth::{ServiceAccountAuth, ServiceAccountKey};
use crate::config::SheetsConfig;
use crate::error::TrackerError;
use crate::models::{ApplicationStatus, JobApplicationRecord, RowId, StoredRecord};
use crate::store::{Presentation, RecordStore, FIRST_DATA_ROW};

const SHEETS_ENDPOINT: &str = "https://sheets.googleapis.com/v4/spreadsheets";

pub const HEADER: [&str; 5] = [
    "Company Name",
    "Job Title",
    "Date",
    "Sender Email",
    "Application Status",
];

const STATUS_COLUMN: &str = "E";
const REJECTED_BACKGROUND: (f32, f32, f32) = (0.96, 0.8, 0.8);
const CLEAR_BACKGROUND: (f32, f32, f32) = (1.0, 1.0, 1.0);

/// Cells are stored exactly as extracted; Sheets must not evaluate
/// formulas or coerce numbers and dates.
const RAW_INPUT: (&str, &str) = ("valueInputOption", "RAW");

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

pub struct SheetsClient {
    client: Client,
    auth: ServiceAccountAuth,
    spreadsheet_id: String,
}

impl SheetsClient {
    pub fn new(config: &SheetsConfig) -> Result<Self> {
        let key = ServiceAccountKey::load(&config.credentials_path)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        let auth = ServiceAccountAuth::new(key, client.clone());
        Ok(Self {
            client,
            auth,
            spreadsheet_id: config.spreadsheet_id.clone(),
        })
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        spreadsheet_url(&self.spreadsheet_id, segments, query)
    }

    fn send(&mut self, request: RequestBuilder) -> Result<String> {
        let token = self.auth.access_token()?;
        let response = request.bearer_auth(token).send()?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(TrackerError::GoogleApi {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(body)
    }

    pub fn read_rows(&mut self, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.url(&["values", range], &[])?;
        let body = self.send(self.client.get(url))?;
        let parsed: ValueRange =
            serde_json::from_str(&body).context("Failed to parse values response")?;
        Ok(parsed.values)
    }

    /// Appends one row and returns the range the API reports as written.
    pub fn append_row(&mut self, range: &str, row: Vec<String>) -> Result<Option<String>> {
        let url = append_url(&self.spreadsheet_id, range)?;
        let body = self.send(self.client.post(url).json(&json!({ "values": [row] })))?;
        let parsed: AppendResponse =
            serde_json::from_str(&body).context("Failed to parse append response")?;
        Ok(parsed.updates.and_then(|u| u.updated_range))
    }

    pub fn update_range(&mut self, range: &str, rows: Vec<Vec<String>>) -> Result<()> {
        let url = update_url(&self.spreadsheet_id, range)?;
        self.send(self.client.put(url).json(&json!({ "values": rows })))?;
        Ok(())
    }

    pub fn sheet_gid(&mut self, title: &str) -> Result<i64> {
        let url = self.url(&[], &[("fields", "sheets.properties")])?;
        let body = self.send(self.client.get(url))?;
        let meta: SpreadsheetMeta =
            serde_json::from_str(&body).context("Failed to parse spreadsheet metadata")?;
        meta.sheets
            .into_iter()
            .find(|s| s.properties.title == title)
            .map(|s| s.properties.sheet_id)
            .ok_or_else(|| anyhow!("Worksheet '{}' not found in spreadsheet", title))
    }

    pub fn set_row_background(&mut self, gid: i64, row: RowId, rgb: (f32, f32, f32)) -> Result<()> {
        let target = format!("{}:batchUpdate", self.spreadsheet_id);
        let mut url = Url::parse(SHEETS_ENDPOINT)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Sheets endpoint cannot be a base URL"))?
            .push(&target);

        let body = row_background_request(gid, row, rgb);
        self.send(self.client.post(url).json(&body))?;
        Ok(())
    }
}

fn spreadsheet_url(spreadsheet_id: &str, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
    let mut url = Url::parse(SHEETS_ENDPOINT)?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Sheets endpoint cannot be a base URL"))?
        .push(spreadsheet_id)
        .extend(segments);
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

fn append_url(spreadsheet_id: &str, range: &str) -> Result<Url> {
    let target = format!("{}:append", range);
    spreadsheet_url(
        spreadsheet_id,
        &["values", &target],
        &[RAW_INPUT, ("insertDataOption", "INSERT_ROWS")],
    )
}

fn update_url(spreadsheet_id: &str, range: &str) -> Result<Url> {
    spreadsheet_url(spreadsheet_id, &["values", range], &[RAW_INPUT])
}

fn row_background_request(gid: i64, row: RowId, (red, green, blue): (f32, f32, f32)) -> Value {
    json!({
        "requests": [{
            "repeatCell": {
                "range": {
                    "sheetId": gid,
                    "startRowIndex": row.0 - 1,
                    "endRowIndex": row.0,
                    "startColumnIndex": 0,
                    "endColumnIndex": HEADER.len(),
                },
                "cell": {
                    "userEnteredFormat": {
                        "backgroundColor": { "red": red, "green": green, "blue": blue }
                    }
                },
                "fields": "userEnteredFormat.backgroundColor",
            }
        }]
    })
}

/// Record store backed by one worksheet, columns A..E in `HEADER` order.
pub struct SheetStore {
    client: SheetsClient,
    worksheet: String,
    gid: Option<i64>,
}

impl SheetStore {
    pub fn open(config: &SheetsConfig) -> Result<Self> {
        Ok(Self {
            client: SheetsClient::new(config)?,
            worksheet: config.worksheet.clone(),
            gid: None,
        })
    }

    fn range(&self, cells: &str) -> String {
        a1_range(&self.worksheet, cells)
    }

    /// Writes the header row when the sheet is empty.
    pub fn ensure_header(&mut self) -> Result<()> {
        let range = self.range("A1:E1");
        let existing = self.client.read_rows(&range)?;
        let has_header = existing
            .first()
            .map(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .unwrap_or(false);

        if !has_header {
            tracing::info!("Writing header row to {}", self.worksheet);
            let header = HEADER.iter().map(|h| h.to_string()).collect();
            self.client.update_range(&range, vec![header])?;
        }
        Ok(())
    }
}

impl RecordStore for SheetStore {
    fn list_all(&mut self) -> Result<Vec<StoredRecord>> {
        let range = self.range(&format!("A{}:E", FIRST_DATA_ROW));
        let rows = self.client.read_rows(&range)?;
        Ok(rows
            .iter()
            .enumerate()
            .filter_map(|(i, cells)| row_to_record(RowId(FIRST_DATA_ROW + i as u32), cells))
            .collect())
    }

    fn append(&mut self, record: &JobApplicationRecord) -> Result<RowId> {
        let range = self.range("A1:E1");
        let updated = self.client.append_row(&range, record_to_row(record))?;

        match updated.as_deref().and_then(parse_updated_row) {
            Some(row) => Ok(RowId(row)),
            None => {
                // Fall back to counting rows when the response omits the range
                let column = self.range("A:A");
                let count = self.client.read_rows(&column)?.len() as u32;
                Ok(RowId(count.max(FIRST_DATA_ROW)))
            }
        }
    }

    fn update_status(&mut self, row: RowId, status: ApplicationStatus) -> Result<()> {
        let range = self.range(&format!("{col}{row}:{col}{row}", col = STATUS_COLUMN, row = row));
        self.client
            .update_range(&range, vec![vec![status.to_string()]])
    }
}

impl SheetStore {
    fn gid(&mut self) -> Result<i64> {
        if let Some(gid) = self.gid {
            return Ok(gid);
        }
        let gid = self.client.sheet_gid(&self.worksheet)?;
        self.gid = Some(gid);
        Ok(gid)
    }
}

impl Presentation for SheetStore {
    fn highlight_rejected(&mut self, row: RowId) -> Result<()> {
        let gid = self.gid()?;
        self.client.set_row_background(gid, row, REJECTED_BACKGROUND)
    }

    fn clear_highlight(&mut self, row: RowId) -> Result<()> {
        let gid = self.gid()?;
        self.client.set_row_background(gid, row, CLEAR_BACKGROUND)
    }
}

pub fn a1_range(worksheet: &str, cells: &str) -> String {
    if worksheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        format!("{}!{}", worksheet, cells)
    } else {
        format!("'{}'!{}", worksheet.replace('\'', "''"), cells)
    }
}

pub fn record_to_row(record: &JobApplicationRecord) -> Vec<String> {
    vec![
        record.company.clone(),
        record.job_title.clone(),
        record.date.format("%Y-%m-%d").to_string(),
        record.sender_email.clone(),
        record.status.to_string(),
    ]
}

pub fn row_to_record(row: RowId, cells: &[String]) -> Option<StoredRecord> {
    let cell = |i: usize| cells.get(i).map(|c| c.trim().to_string()).unwrap_or_default();

    let company = cell(0);
    let job_title = cell(1);
    if company.is_empty() && job_title.is_empty() {
        return None;
    }

    let date = parse_sheet_date(&cell(2)).unwrap_or_else(|| {
        tracing::debug!("Row {} has no readable date", row);
        NaiveDate::default()
    });

    Some(StoredRecord {
        row,
        record: JobApplicationRecord {
            company,
            job_title,
            date,
            sender_email: cell(3),
            status: ApplicationStatus::parse_lenient(&cell(4)),
        },
    })
}

fn parse_sheet_date(text: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%m/%d/%Y", "%d-%b-%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// `Sheet1!A7:E7` -> 7
pub fn parse_updated_row(range: &str) -> Option<u32> {
    let cells = range.rsplit('!').next()?;
    let start = cells.split(':').next()?;
    start
        .trim_start_matches(|c: char| c.is_ascii_alphabetic() || c == '$')
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_a1_range_quotes_when_needed() {
        assert_eq!(a1_range("Sheet1", "A2:E"), "Sheet1!A2:E");
        assert_eq!(a1_range("Job Tracker", "A1:E1"), "'Job Tracker'!A1:E1");
        assert_eq!(a1_range("Bob's", "A:A"), "'Bob''s'!A:A");
    }

    #[test]
    fn test_record_to_row_column_order() {
        let record = JobApplicationRecord {
            company: "Acme".to_string(),
            job_title: "Intern".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 14).unwrap(),
            sender_email: "a@x.com".to_string(),
            status: ApplicationStatus::Interview,
        };
        assert_eq!(
            record_to_row(&record),
            cells(&["Acme", "Intern", "2024-05-14", "a@x.com", "Interview"])
        );
    }

    #[test]
    fn test_row_to_record_reads_columns() {
        let stored = row_to_record(
            RowId(4),
            &cells(&["Acme", "Intern", "2024-05-14", "a@x.com", "Rejected"]),
        )
        .unwrap();
        assert_eq!(stored.row, RowId(4));
        assert_eq!(stored.record.company, "Acme");
        assert_eq!(stored.record.date, NaiveDate::from_ymd_opt(2024, 5, 14).unwrap());
        assert_eq!(stored.record.status, ApplicationStatus::Rejected);
    }

    #[test]
    fn test_row_to_record_tolerates_short_rows() {
        let stored = row_to_record(RowId(2), &cells(&["Acme", "Intern"])).unwrap();
        assert_eq!(stored.record.sender_email, "");
        assert_eq!(stored.record.status, ApplicationStatus::Unknown);
        assert_eq!(stored.record.date, NaiveDate::default());
    }

    #[test]
    fn test_row_to_record_skips_blank_rows() {
        assert!(row_to_record(RowId(2), &cells(&["", " ", "2024-01-01"])).is_none());
        assert!(row_to_record(RowId(2), &[]).is_none());
    }

    #[test]
    fn test_parse_sheet_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 14);
        assert_eq!(parse_sheet_date("2024-05-14"), expected);
        assert_eq!(parse_sheet_date("5/14/2024"), expected);
        assert_eq!(parse_sheet_date("14-May-2024"), expected);
        assert_eq!(parse_sheet_date("yesterday"), None);
    }

    #[test]
    fn test_parse_updated_row() {
        assert_eq!(parse_updated_row("Sheet1!A7:E7"), Some(7));
        assert_eq!(parse_updated_row("'Job Tracker'!A12:E12"), Some(12));
        assert_eq!(parse_updated_row("Sheet1!$A$3:$E$3"), Some(3));
        assert_eq!(parse_updated_row("garbage"), None);
    }

    #[test]
    fn test_row_background_request_targets_one_row() {
        let body = row_background_request(42, RowId(5), REJECTED_BACKGROUND);
        let range = &body["requests"][0]["repeatCell"]["range"];
        assert_eq!(range["sheetId"], 42);
        assert_eq!(range["startRowIndex"], 4);
        assert_eq!(range["endRowIndex"], 5);
        assert_eq!(range["endColumnIndex"], 5);
        assert_eq!(
            body["requests"][0]["repeatCell"]["fields"],
            "userEnteredFormat.backgroundColor"
        );
    }

    #[test]
    fn test_cleared_background_is_white() {
        let body = row_background_request(42, RowId(5), CLEAR_BACKGROUND);
        let color = &body["requests"][0]["repeatCell"]["cell"]["userEnteredFormat"]["backgroundColor"];
        assert_eq!(color["red"], 1.0);
        assert_eq!(color["green"], 1.0);
        assert_eq!(color["blue"], 1.0);
    }

    fn query_value(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_append_url_writes_raw_rows() {
        let url = append_url("sheet-id", "Sheet1!A:E").unwrap();
        assert!(url.path().starts_with("/v4/spreadsheets/sheet-id/values/"));
        assert!(url.path().ends_with(":append"));
        assert_eq!(query_value(&url, "valueInputOption").as_deref(), Some("RAW"));
        assert_eq!(query_value(&url, "insertDataOption").as_deref(), Some("INSERT_ROWS"));
    }

    #[test]
    fn test_update_url_writes_raw_values() {
        let url = update_url("sheet-id", "Sheet1!E7").unwrap();
        assert!(url.path().starts_with("/v4/spreadsheets/sheet-id/values/"));
        assert!(!url.path().ends_with(":append"));
        assert_eq!(query_value(&url, "valueInputOption").as_deref(), Some("RAW"));
        assert_eq!(query_value(&url, "insertDataOption"), None);
    }

    #[test]
    fn test_formula_like_values_round_trip_as_text() {
        let record = JobApplicationRecord {
            company: "=HYPERLINK(\"http://x\")".to_string(),
            job_title: "2.10".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 14).unwrap(),
            sender_email: "+1@x.com".to_string(),
            status: ApplicationStatus::Submitted,
        };
        let stored = row_to_record(RowId(3), &record_to_row(&record)).unwrap();
        assert_eq!(stored.record, record);
    }
}

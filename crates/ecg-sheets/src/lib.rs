//! Push annotation tables to spreadsheets.
//!
//! Every sink replaces a named worksheet wholesale: the previous contents are
//! cleared, then the header and all rows are written starting at `A1`.

use chrono::Utc;
use ecg_creds::{load_secrets, CredentialError, ServiceAccount};
use ecg_lib::{
    annotate::BeatRecord,
    io::table::{table_rows, Cell},
};
use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no data to upload: the annotation table is empty")]
    EmptyTable,
    #[error("credentials unusable: {0}")]
    Credentials(#[from] CredentialError),
    #[error("missing access token: set {0} or pass one explicitly")]
    MissingToken(&'static str),
    #[error("spreadsheet {0} not found or not shared with the service account")]
    SpreadsheetNotFound(String),
    #[error("worksheet '{0}' not found")]
    WorksheetNotFound(String),
    #[error("spreadsheet service returned {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("network error talking to the spreadsheet service: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("writing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoding worksheet rows: {0}")]
    Csv(#[from] csv::Error),
}

/// Where a sync landed and how much was written.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub destination: String,
    pub worksheet: String,
    pub rows_written: usize,
    pub synced_at: String,
}

impl SyncReport {
    fn new(destination: String, worksheet: &str, rows_written: usize) -> Self {
        Self {
            destination,
            worksheet: worksheet.to_string(),
            rows_written,
            synced_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A spreadsheet that can have one worksheet overwritten at a time.
pub trait SheetSink {
    fn replace_worksheet(
        &mut self,
        worksheet: &str,
        rows: &[Vec<Cell>],
    ) -> Result<SyncReport, ExportError>;
}

/// Overwrite `worksheet` with the header row plus one row per beat.
pub fn push_table<S: SheetSink + ?Sized>(
    sink: &mut S,
    worksheet: &str,
    records: &[BeatRecord],
) -> Result<SyncReport, ExportError> {
    if records.is_empty() {
        return Err(ExportError::EmptyTable);
    }
    let rows = table_rows(records);
    debug!("pushing {} row(s) to worksheet '{}'", rows.len(), worksheet);
    let report = sink.replace_worksheet(worksheet, &rows)?;
    info!(
        "synced {} row(s) to {} [{}]",
        report.rows_written, report.destination, report.worksheet
    );
    Ok(report)
}

/// Directory-backed workbook: each worksheet is `<dir>/<worksheet>.csv`.
pub struct LocalWorkbook {
    root: PathBuf,
}

impl LocalWorkbook {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn worksheet_path(&self, worksheet: &str) -> PathBuf {
        let name: String = worksheet
            .chars()
            .map(|ch| if ch == '/' || ch == '\\' { '_' } else { ch })
            .collect();
        self.root.join(format!("{}.csv", name))
    }

    fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
        move |source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl SheetSink for LocalWorkbook {
    fn replace_worksheet(
        &mut self,
        worksheet: &str,
        rows: &[Vec<Cell>],
    ) -> Result<SyncReport, ExportError> {
        fs::create_dir_all(&self.root).map_err(Self::io_err(&self.root))?;
        let path = self.worksheet_path(worksheet);
        let file = fs::File::create(&path).map_err(Self::io_err(&path))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush().map_err(Self::io_err(&path))?;
        Ok(SyncReport::new(
            path.display().to_string(),
            worksheet,
            rows.len(),
        ))
    }
}

/// Google Sheets v4 over REST.
///
/// Requests carry a bearer access token minted outside this crate. When a
/// service account is supplied it must already have passed validation; its
/// email is used in error messages about sharing.
pub struct GoogleSheets {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    token: String,
    name: Option<String>,
    account: Option<ServiceAccount>,
}

impl GoogleSheets {
    pub const TOKEN_ENV: &'static str = "ECG_SHEETS_TOKEN";

    pub fn new(spreadsheet_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: SHEETS_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            token: token.into(),
            name: None,
            account: None,
        }
    }

    /// Build a client with the token taken from `ECG_SHEETS_TOKEN`.
    pub fn from_env(spreadsheet_id: impl Into<String>) -> Result<Self, ExportError> {
        let token = std::env::var(Self::TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ExportError::MissingToken(Self::TOKEN_ENV))?;
        Ok(Self::new(spreadsheet_id, token.trim()))
    }

    pub fn with_account(mut self, account: ServiceAccount) -> Self {
        self.account = Some(account);
        self
    }

    /// Load and attach the service account from a secrets file.
    pub fn with_secrets(self, path: &Path) -> Result<Self, ExportError> {
        let account = load_secrets(path)?;
        Ok(self.with_account(account))
    }

    /// Human-readable spreadsheet title used in reports and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("'{}' ({})", name, self.spreadsheet_id),
            None => format!("'{}'", self.spreadsheet_id),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn spreadsheet_url(&self) -> String {
        format!(
            "https://docs.google.com/spreadsheets/d/{}",
            self.spreadsheet_id
        )
    }

    fn values_url(&self, worksheet: &str, action: &str) -> String {
        format!(
            "{}/{}/values/{}{}",
            self.base_url,
            self.spreadsheet_id,
            urlencoding::encode(&a1_range(worksheet)),
            action
        )
    }

    fn check(
        &self,
        worksheet: &str,
        response: reqwest::blocking::Response,
    ) -> Result<(), ExportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(self.classify_failure(worksheet, status, failure_body(response.text())))
    }

    fn classify_failure(&self, worksheet: &str, status: StatusCode, body: String) -> ExportError {
        match status {
            StatusCode::NOT_FOUND => ExportError::SpreadsheetNotFound(self.label()),
            StatusCode::FORBIDDEN => {
                let who = self
                    .account
                    .as_ref()
                    .map(|a| format!(" (share it with {})", a.client_email))
                    .unwrap_or_default();
                ExportError::Http {
                    status,
                    body: format!("{}{}", body, who),
                }
            }
            StatusCode::BAD_REQUEST if body.contains("Unable to parse range") => {
                ExportError::WorksheetNotFound(worksheet.to_string())
            }
            _ => ExportError::Http { status, body },
        }
    }
}

impl SheetSink for GoogleSheets {
    fn replace_worksheet(
        &mut self,
        worksheet: &str,
        rows: &[Vec<Cell>],
    ) -> Result<SyncReport, ExportError> {
        let clear_url = self.values_url(worksheet, ":clear");
        debug!("POST {}", clear_url);
        let response = self
            .client
            .post(&clear_url)
            .bearer_auth(&self.token)
            .json(&json!({}))
            .send()?;
        self.check(worksheet, response)?;

        let update_url = self.values_url(worksheet, "?valueInputOption=RAW");
        debug!("PUT {}", update_url);
        let response = self
            .client
            .put(&update_url)
            .bearer_auth(&self.token)
            .json(&update_body(worksheet, rows))
            .send()?;
        self.check(worksheet, response)?;

        let destination = match &self.name {
            Some(name) => format!("{} <{}>", name, self.spreadsheet_url()),
            None => self.spreadsheet_url(),
        };
        Ok(SyncReport::new(destination, worksheet, rows.len()))
    }
}

/// `'Sheet Name'!A1`, with embedded quotes doubled.
pub fn a1_range(worksheet: &str) -> String {
    format!("'{}'!A1", worksheet.replace('\'', "''"))
}

fn update_body(worksheet: &str, rows: &[Vec<Cell>]) -> serde_json::Value {
    json!({
        "range": a1_range(worksheet),
        "majorDimension": "ROWS",
        "values": rows,
    })
}

/// Error responses keep whatever body they carried; a body that cannot be
/// read is reported in its place.
fn failure_body(body: Result<String, reqwest::Error>) -> String {
    body.unwrap_or_else(|e| format!("<response body unreadable: {}>", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecg_lib::annotate::{annotate_beats, AnnotationConfig};
    use ecg_lib::io::table::annotations_to_csv_string;
    use ecg_lib::signal::{Events, Waveform};
    use tempfile::tempdir;

    fn records() -> Vec<BeatRecord> {
        let wave = Waveform::from_samples(200, vec![0.0; 1000]);
        annotate_beats(
            &wave,
            &Events::from_indices(vec![100, 300, 520]),
            &AnnotationConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn empty_table_is_refused() {
        let dir = tempdir().unwrap();
        let mut book = LocalWorkbook::new(dir.path());
        let err = push_table(&mut book, "Annotations", &[]).unwrap_err();
        assert!(matches!(err, ExportError::EmptyTable));
        assert!(!book.worksheet_path("Annotations").exists());
    }

    #[test]
    fn local_workbook_overwrites_worksheet() {
        let dir = tempdir().unwrap();
        let mut book = LocalWorkbook::new(dir.path().join("ECG Annotation Data"));
        let path = book.worksheet_path("Annotations");
        push_table(&mut book, "Annotations", &records()).unwrap();
        let all = records();
        let report = push_table(&mut book, "Annotations", &all[..1]).unwrap();
        assert_eq!(report.rows_written, 2);
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("Beat_Index,P_Amp_mV,"));
        assert!(text.contains("Normal Sinus Rhythm"));
        assert!(!text.contains("Tachycardia/Bradycardia"));
    }

    #[test]
    fn worksheet_names_cannot_escape_the_workbook() {
        let book = LocalWorkbook::new("/tmp/book");
        assert_eq!(
            book.worksheet_path("../x"),
            PathBuf::from("/tmp/book/.._x.csv")
        );
    }

    #[test]
    fn named_spreadsheet_labels_the_report() {
        let sheets = GoogleSheets::new("abc123", "tok").with_name("ECG Annotation Data");
        assert_eq!(sheets.label(), "'ECG Annotation Data' (abc123)");
    }

    #[test]
    fn sheets_urls_are_encoded() {
        let sheets = GoogleSheets::new("abc123", "tok").with_base_url("http://localhost:9/v4/");
        assert_eq!(
            sheets.values_url("Annotations", ":clear"),
            "http://localhost:9/v4/abc123/values/%27Annotations%27%21A1:clear"
        );
        assert_eq!(a1_range("Bob's beats"), "'Bob''s beats'!A1");
        assert_eq!(
            sheets.spreadsheet_url(),
            "https://docs.google.com/spreadsheets/d/abc123"
        );
    }

    #[test]
    fn update_body_carries_header_first() {
        let rows = table_rows(&records());
        let body = update_body("Annotations", &rows);
        assert_eq!(body["majorDimension"], "ROWS");
        assert_eq!(body["values"][0][0], "Beat_Index");
        assert_eq!(body["values"][1][0], 1);
        assert!(body["values"][1][10].is_number());
        assert_eq!(body["values"][1][10].as_f64(), Some(1.0));
        assert_eq!(body["values"][2][11], "Tachycardia/Bradycardia");
    }

    #[test]
    fn local_worksheet_matches_csv_export() {
        let dir = tempdir().unwrap();
        let mut book = LocalWorkbook::new(dir.path());
        push_table(&mut book, "Annotations", &records()).unwrap();
        let sheet = fs::read_to_string(book.worksheet_path("Annotations")).unwrap();
        assert_eq!(sheet, annotations_to_csv_string(&records()).unwrap());
        assert!(sheet.lines().nth(1).unwrap().ends_with(",1.0,Normal Sinus Rhythm"));
    }

    #[test]
    fn missing_secrets_are_a_credentials_error() {
        let dir = tempdir().unwrap();
        let err = GoogleSheets::new("abc123", "tok")
            .with_secrets(&dir.path().join("secrets.toml"))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ExportError::Credentials(CredentialError::NotFound(_))
        ));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn unreadable_failure_body_is_reported() {
        let err = Client::new().get("http://127.0.0.1:9/").send().unwrap_err();
        let body = failure_body(Err(err));
        assert!(body.starts_with("<response body unreadable: "));
        assert_eq!(failure_body(Ok("quota".into())), "quota");
    }

    #[test]
    fn failures_are_classified() {
        let sheets = GoogleSheets::new("abc123", "tok");
        assert!(matches!(
            sheets.classify_failure("A", StatusCode::NOT_FOUND, String::new()),
            ExportError::SpreadsheetNotFound(id) if id == "'abc123'"
        ));
        let named = GoogleSheets::new("abc123", "tok").with_name("ECG Annotation Data");
        let err = named.classify_failure("A", StatusCode::NOT_FOUND, String::new());
        assert_eq!(
            err.to_string(),
            "spreadsheet 'ECG Annotation Data' (abc123) not found or not shared with the service account"
        );
        assert!(matches!(
            sheets.classify_failure(
                "Missing",
                StatusCode::BAD_REQUEST,
                "Unable to parse range: 'Missing'!A1".into()
            ),
            ExportError::WorksheetNotFound(name) if name == "Missing"
        ));
        assert!(matches!(
            sheets.classify_failure("A", StatusCode::UNAUTHORIZED, "expired".into()),
            ExportError::Http { status, .. } if status == StatusCode::UNAUTHORIZED
        ));
    }

    #[test]
    fn unreachable_service_is_a_transport_error() {
        let mut sheets = GoogleSheets::new("abc123", "tok").with_base_url("http://127.0.0.1:9");
        let err = push_table(&mut sheets, "Annotations", &records()).unwrap_err();
        assert!(matches!(err, ExportError::Transport(_)));
    }
}

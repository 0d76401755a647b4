use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ExtratoError, Result, SheetError, SheetErrorKind};
use crate::sheet::{column_range, json_to_text, CellWrite, SheetClient};

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/";

/// Google Sheets REST v4 over blocking HTTP. The bearer token is obtained
/// elsewhere and passed in as-is.
#[derive(Debug, Clone)]
pub struct GoogleSheets {
    http: Client,
    base_url: Url,
    spreadsheet_id: String,
    token: String,
}

impl GoogleSheets {
    pub fn new(spreadsheet_id: &str, token: &str, timeout: Duration) -> Result<Self> {
        Self::with_base_url(SHEETS_BASE_URL, spreadsheet_id, token, timeout)
    }

    pub fn with_base_url(
        base_url: &str,
        spreadsheet_id: &str,
        token: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ExtratoError::Settings(format!("Invalid Sheets URL {base_url}: {e}")))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtratoError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url,
            spreadsheet_id: spreadsheet_id.to_string(),
            token: token.to_string(),
        })
    }

    fn endpoint(&self, tail: &[&str]) -> std::result::Result<Url, SheetError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SheetError::new(SheetErrorKind::Rejected, "base URL cannot hold a path"))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str()])
            .extend(tail);
        Ok(url)
    }
}

fn transport_error(err: reqwest::Error) -> SheetError {
    let kind = if err.is_timeout() {
        SheetErrorKind::Timeout
    } else {
        SheetErrorKind::Network
    };
    SheetError::new(kind, err.to_string())
}

/// How a failed response is treated by the retry policy: everything but
/// `Rejected` is retried.
fn error_kind(status: StatusCode) -> SheetErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SheetErrorKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => SheetErrorKind::RateLimited,
        StatusCode::REQUEST_TIMEOUT => SheetErrorKind::Timeout,
        s if s.is_server_error() => SheetErrorKind::Server,
        _ => SheetErrorKind::Rejected,
    }
}

fn check_status(response: Response) -> std::result::Result<Response, SheetError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let kind = error_kind(status);
    let body = response.text().unwrap_or_default();
    Err(SheetError::new(kind, format!("HTTP {status}: {body}")))
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateRequest {
    value_input_option: &'static str,
    data: Vec<RangeData>,
}

#[derive(Debug, Serialize)]
struct RangeData {
    range: String,
    values: Vec<Vec<serde_json::Value>>,
}

impl SheetClient for GoogleSheets {
    fn read_column(
        &mut self,
        worksheet: &str,
        column: &str,
        first_row: u32,
        last_row: u32,
    ) -> std::result::Result<Vec<String>, SheetError> {
        let range = column_range(worksheet, column, first_row, last_row);
        let mut url = self.endpoint(&["values", &range])?;
        url.query_pairs_mut()
            .append_pair("majorDimension", "ROWS")
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE");
        debug!(%range, "reading column");

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .map_err(transport_error)?;
        let body: ValueRange = check_status(response)?.json().map_err(transport_error)?;
        Ok(body
            .values
            .iter()
            .map(|row| row.first().map(json_to_text).unwrap_or_default())
            .collect())
    }

    fn batch_update(
        &mut self,
        worksheet: &str,
        writes: &[CellWrite],
    ) -> std::result::Result<(), SheetError> {
        let url = self.endpoint(&["values:batchUpdate"])?;
        let request = BatchUpdateRequest {
            value_input_option: "USER_ENTERED",
            data: writes
                .iter()
                .map(|w| RangeData {
                    range: w.a1(worksheet),
                    values: vec![vec![w.value.to_json()]],
                })
                .collect(),
        };
        debug!(cells = writes.len(), "sending batchUpdate");

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .map_err(transport_error)?;
        check_status(response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_range() {
        let sheets = GoogleSheets::new("abc123", "token", Duration::from_secs(5)).unwrap();
        let url = sheets
            .endpoint(&["values", &column_range("MARÇO", "B", 25, 51)])
            .unwrap();
        assert!(url
            .as_str()
            .starts_with("https://sheets.googleapis.com/v4/spreadsheets/abc123/values/"));
        assert!(!url.as_str().contains(' '));
        assert!(url.as_str().ends_with("!B25:B51"));
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (401, SheetErrorKind::Auth),
            (403, SheetErrorKind::Auth),
            (408, SheetErrorKind::Timeout),
            (429, SheetErrorKind::RateLimited),
            (500, SheetErrorKind::Server),
            (503, SheetErrorKind::Server),
            (400, SheetErrorKind::Rejected),
            (404, SheetErrorKind::Rejected),
        ];
        for (code, kind) in cases {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(error_kind(status), kind, "HTTP {code}");
        }
    }

    #[test]
    fn test_only_rejected_statuses_stop_retrying() {
        let transient = |code: u16| {
            SheetError::new(error_kind(StatusCode::from_u16(code).unwrap()), "x").is_transient()
        };
        assert!(transient(429));
        assert!(transient(401));
        assert!(transient(503));
        assert!(!transient(400));
        assert!(!transient(422));
    }

    #[test]
    fn test_batch_update_endpoint() {
        let sheets = GoogleSheets::new("abc123", "token", Duration::from_secs(5)).unwrap();
        let url = sheets.endpoint(&["values:batchUpdate"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values:batchUpdate"
        );
    }
}

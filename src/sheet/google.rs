use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::models::{JobRecord, HEADERS};
use super::{Result, SheetError, SheetStore};

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com/v4";

/// Last column letter for [`HEADERS`]
const LAST_COLUMN: &str = "H";

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Serialize)]
struct ValuesBody<'a> {
    values: &'a [Vec<String>],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    #[serde(default)]
    updates: Option<AppendUpdates>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    #[serde(default)]
    updated_rows: Option<usize>,
}

/// Sheets v4 REST client scoped to one tab of one spreadsheet
pub struct GoogleSheetStore {
    client: reqwest::Client,
    api_base: String,
    spreadsheet_id: String,
    sheet_name: String,
    access_token: String,
}

impl GoogleSheetStore {
    pub fn new(
        api_base: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
            access_token: access_token.into(),
        }
    }

    fn range(&self, cells: &str) -> String {
        format!("'{}'!{}", self.sheet_name.replace('\'', "''"), cells)
    }

    /// Build `{base}/spreadsheets/{id}/{segments...}` with each segment escaped
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| SheetError::Connection(format!("invalid sheets API base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                SheetError::Connection("sheets API base cannot be a base URL".to_string())
            })?
            .pop_if_empty()
            .push("spreadsheets")
            .push(&self.spreadsheet_id)
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| SheetError::Connection(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SheetError::Connection(format!(
                "credentials rejected ({}): {}",
                status.as_u16(),
                body
            )));
        }
        Err(SheetError::Api {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn get_values(&self, cells: &str) -> Result<Vec<Vec<String>>> {
        let url = self.url(&["values", &self.range(cells)])?;
        let resp = self.send(self.client.get(url)).await?;
        let body: ValueRange = resp
            .json()
            .await
            .map_err(|e| SheetError::Decode(e.to_string()))?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetStore for GoogleSheetStore {
    async fn validate_connection(&self) -> Result<()> {
        let mut url = self.url(&[])?;
        url.query_pairs_mut().append_pair("fields", "spreadsheetId");
        self.send(self.client.get(url)).await?;
        debug!("Sheet {} reachable", self.spreadsheet_id);
        Ok(())
    }

    async fn initialize_headers(&self) -> Result<bool> {
        let header_cells = format!("A1:{}1", LAST_COLUMN);
        let current = self.get_values(&header_cells).await?;
        let current = current.first().map(Vec::as_slice).unwrap_or(&[]);

        if current.iter().map(String::as_str).eq(HEADERS.iter().copied()) {
            debug!("Sheet headers already initialized");
            return Ok(false);
        }

        let headers = vec![HEADERS.iter().map(|h| h.to_string()).collect::<Vec<_>>()];
        let mut url = self.url(&["values", &self.range(&header_cells)])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        self.send(
            self.client
                .request(Method::PUT, url)
                .json(&ValuesBody { values: &headers }),
        )
        .await?;

        info!("Wrote header row to sheet '{}'", self.sheet_name);
        Ok(true)
    }

    async fn read_all(&self) -> Result<Vec<JobRecord>> {
        let rows = self.get_values(&format!("A2:{}", LAST_COLUMN)).await?;
        let total = rows.len();
        let records: Vec<JobRecord> = rows.iter().filter_map(|r| JobRecord::from_row(r)).collect();

        if records.len() < total {
            tracing::warn!("Skipped {} sheet rows without a URL", total - records.len());
        }
        debug!("Read {} records from sheet", records.len());
        Ok(records)
    }

    async fn append_records(&self, records: &[JobRecord]) -> Result<usize> {
        if records.is_empty() {
            debug!("Append called with no records");
            return Ok(0);
        }

        let rows: Vec<Vec<String>> = records.iter().map(JobRecord::to_row).collect();
        let append_range = format!("{}:append", self.range(&format!("A:{}", LAST_COLUMN)));
        let mut url = self.url(&["values", &append_range])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let resp = self
            .send(self.client.post(url).json(&ValuesBody { values: &rows }))
            .await?;
        let body: AppendResponse = resp
            .json()
            .await
            .map_err(|e| SheetError::Decode(e.to_string()))?;

        let written = body
            .updates
            .and_then(|u| u.updated_rows)
            .unwrap_or(rows.len());
        info!("Appended {} rows to sheet '{}'", written, self.sheet_name);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::posting;
    use wiremock::matchers::{header, method, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(base: &str) -> GoogleSheetStore {
        GoogleSheetStore::new(base, "sheet-123", "My Jobs", "token")
    }

    fn mock_store(server: &MockServer) -> GoogleSheetStore {
        GoogleSheetStore::new(server.uri(), "sheet-123", "Jobs", "token")
    }

    #[tokio::test]
    async fn matching_header_row_is_not_rewritten() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"/values/'Jobs'!A1:H1$"))
            .and(header("authorization", "Bearer token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "values": [HEADERS] })),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let sheet = mock_store(&server);
        assert!(!sheet.initialize_headers().await.unwrap());
        assert!(!sheet.initialize_headers().await.unwrap());
    }

    #[tokio::test]
    async fn missing_header_row_is_written_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"/values/'Jobs'!A1:H1$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(r"/values/'Jobs'!A1:H1$"))
            .and(query_param("valueInputOption", "RAW"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        assert!(mock_store(&server).initialize_headers().await.unwrap());
    }

    #[tokio::test]
    async fn rejected_credentials_are_connection_errors() {
        for code in [401u16, 403] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path_regex(r"/spreadsheets/sheet-123$"))
                .and(query_param("fields", "spreadsheetId"))
                .respond_with(ResponseTemplate::new(code).set_body_string("nope"))
                .mount(&server)
                .await;

            let err = mock_store(&server).validate_connection().await.unwrap_err();
            match err {
                SheetError::Connection(msg) => {
                    assert_eq!(msg, format!("credentials rejected ({}): nope", code))
                }
                other => panic!("expected connection error, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn other_failures_are_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"/values/'Jobs'!A2:H$"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend unavailable"))
            .mount(&server)
            .await;

        let err = mock_store(&server).read_all().await.unwrap_err();
        assert!(matches!(
            err,
            SheetError::Api { status: 500, ref message } if message == "backend unavailable"
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"/values/'Jobs'!A2:H$"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        assert!(matches!(
            mock_store(&server).read_all().await,
            Err(SheetError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn read_all_parses_rows_and_skips_blank_urls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"/values/'Jobs'!A2:H$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [
                    ["https://a.example/1", "Tailor", "Studio"],
                    ["", "orphan"],
                    ["https://a.example/2", "Cutter", "Atelier", "Leeds", "", "board",
                     "2026-03-01T12:00:00+00:00", true]
                ]
            })))
            .mount(&server)
            .await;

        let records = mock_store(&server).read_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].company, "Studio");
        assert_eq!(records[1].source, "board");
        assert!(records[1].matched);
    }

    #[tokio::test]
    async fn append_posts_rows_and_reports_updated_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/values/'Jobs'!A:H:append$"))
            .and(query_param("valueInputOption", "RAW"))
            .and(query_param("insertDataOption", "INSERT_ROWS"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "updates": { "updatedRows": 2 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let written = mock_store(&server)
            .append_records(&[posting(1), posting(2)])
            .await
            .unwrap();
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn empty_append_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(mock_store(&server).append_records(&[]).await.unwrap(), 0);
    }

    #[test]
    fn urls_escape_the_range() {
        let s = store(DEFAULT_API_BASE);
        let url = s.url(&["values", &s.range("A1:H1")]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-123/values/'My%20Jobs'!A1:H1"
        );
    }

    #[test]
    fn trailing_slash_in_base_is_tolerated() {
        let s = store("https://sheets.example.test/v4/");
        let url = s.url(&[]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.example.test/v4/spreadsheets/sheet-123"
        );
    }

    #[test]
    fn quotes_in_sheet_name_are_doubled() {
        let s = GoogleSheetStore::new(DEFAULT_API_BASE, "id", "Bob's", "t");
        assert_eq!(s.range("A2:H"), "'Bob''s'!A2:H");
    }

    #[test]
    fn non_string_cells_are_stringified() {
        assert_eq!(cell_to_string(serde_json::json!(true)), "true");
        assert_eq!(cell_to_string(serde_json::json!(3)), "3");
        assert_eq!(cell_to_string(serde_json::Value::Null), "");
        assert_eq!(cell_to_string(serde_json::json!("x")), "x");
    }
}

//! HTTP client for the spreadsheet values API

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::store::TabularStore;
use crate::types::*;

const VALUE_INPUT_OPTION: &str = "USER_ENTERED";

/// HTTP client for the Sheets v4 `values` API
///
/// # Example
///
/// ```rust,no_run
/// use binder_sheets_client::{AccessToken, Range, SheetsClient, SheetsConfig, Table, TabularStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = SheetsClient::new(SheetsConfig {
///     spreadsheet_id: "1AbC".into(),
///     ..Default::default()
/// })?;
///
/// let token = AccessToken::new("ya29...");
/// let rows = client.read_range(&token, &Range::data(Table::Users)).await?;
/// # Ok(())
/// # }
/// ```
pub struct SheetsClient {
    config: SheetsConfig,
    client: Client,
}

impl SheetsClient {
    /// Create a new sheets client
    pub fn new(config: SheetsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &SheetsConfig {
        &self.config
    }

    fn a1(&self, range: &Range) -> String {
        range.to_a1(self.config.sheet_names.name_of(range.table))
    }

    fn values_url(&self, a1: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.spreadsheet_id),
            urlencoding::encode(a1)
        )
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unauthorized(error_message(&body)));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Server {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| StoreError::InvalidResponse(format!("{}: {}", e, body)))
    }
}

/// Prefer the `error.message` of a Google error envelope, else the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.to_string())
}

fn to_values(rows: Vec<Row>) -> Vec<Vec<serde_json::Value>> {
    rows.into_iter()
        .map(|row| row.into_iter().map(serde_json::Value::String).collect())
        .collect()
}

#[async_trait]
impl TabularStore for SheetsClient {
    async fn read_range(&self, token: &AccessToken, range: &Range) -> Result<Vec<Row>> {
        let a1 = self.a1(range);
        debug!(range = %a1, "values.get");

        let response = self
            .client
            .get(self.values_url(&a1))
            .bearer_auth(token.secret())
            .send()
            .await?;

        let values: ValueRange = self.handle_response(response).await?;
        Ok(values.into_rows())
    }

    async fn append_row(&self, token: &AccessToken, table: Table, row: Row) -> Result<()> {
        let a1 = self.a1(&Range::columns(table));
        debug!(range = %a1, "values.append");

        let url = format!("{}:append", self.values_url(&a1));
        let body = ValueRange {
            values: to_values(vec![row]),
            ..Default::default()
        };

        let response = self
            .client
            .post(&url)
            .query(&[("valueInputOption", VALUE_INPUT_OPTION)])
            .bearer_auth(token.secret())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        let _: AppendValuesResponse = self.handle_response(response).await?;
        Ok(())
    }

    async fn update_range(&self, token: &AccessToken, range: &Range, rows: Vec<Row>) -> Result<()> {
        let a1 = self.a1(range);
        debug!(range = %a1, rows = rows.len(), "values.update");

        let body = ValueRange {
            range: Some(a1.clone()),
            major_dimension: Some("ROWS".to_string()),
            values: to_values(rows),
        };

        let response = self
            .client
            .put(self.values_url(&a1))
            .query(&[("valueInputOption", VALUE_INPUT_OPTION)])
            .bearer_auth(token.secret())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        let _: UpdateValuesResponse = self.handle_response(response).await?;
        Ok(())
    }

    async fn clear_range(&self, token: &AccessToken, range: &Range) -> Result<()> {
        let a1 = self.a1(range);
        debug!(range = %a1, "values.clear");

        let url = format!("{}:clear", self.values_url(&a1));
        let response = self
            .client
            .post(&url)
            .bearer_auth(token.secret())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let _: ClearValuesResponse = self.handle_response(response).await?;
        Ok(())
    }
}

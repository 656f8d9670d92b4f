//! Google Sheets v4 REST client
//!
//! Implements [`TabularSourceAdapter`] with three calls on the `values`
//! resource: `GET values/{range}`, `POST values/{range}:clear` and
//! `PUT values/{range}?valueInputOption=RAW`.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::sync::ports::{AdapterError, TabularRow, TabularSourceAdapter};

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeBody<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: Vec<TabularRow>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Authenticated Sheets API client
#[derive(Debug, Clone)]
pub struct SheetsClient {
    client: Client,
    base_url: Url,
    access_token: String,
}

impl SheetsClient {
    pub fn new(
        base_url: &str,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AdapterError::Transport(format!("invalid Sheets API base URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AdapterError::Transport(format!(
                "Sheets API base URL '{base_url}' cannot carry a path"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            access_token: access_token.into(),
        })
    }

    /// `{base}/spreadsheets/{id}/values/{range}{suffix}`
    fn values_url(&self, document_id: &str, range: &str, suffix: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["spreadsheets", document_id, "values"])
                .push(&format!("{range}{suffix}"));
        }
        url
    }

    async fn check(response: Response) -> Result<Response, AdapterError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| {
                if body.is_empty() {
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                } else {
                    body
                }
            });

        Err(AdapterError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn transport(e: reqwest::Error) -> AdapterError {
    AdapterError::Transport(e.to_string())
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl TabularSourceAdapter for SheetsClient {
    #[instrument(skip(self))]
    async fn read(&self, document_id: &str, range: &str) -> Result<Vec<TabularRow>, AdapterError> {
        let response = self
            .client
            .get(self.values_url(document_id, range, ""))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport)?;

        let body: ValueRange = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::Decode(e.to_string()))?;

        let rows: Vec<TabularRow> = body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        debug!(rows = rows.len(), "read sheet values");
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn clear(&self, document_id: &str, range: &str) -> Result<(), AdapterError> {
        let response = self
            .client
            .post(self.values_url(document_id, range, ":clear"))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(transport)?;

        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn write(
        &self,
        document_id: &str,
        range: &str,
        rows: Vec<TabularRow>,
    ) -> Result<(), AdapterError> {
        let mut url = self.values_url(document_id, range, "");
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = ValueRangeBody {
            range,
            major_dimension: "ROWS",
            values: rows,
        };

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        Self::check(response).await?;
        Ok(())
    }
}

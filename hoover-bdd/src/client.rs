//! HTTP client for the cleaning-sessions REST API.

use std::time::Duration;

use anyhow::{Context, Result};
use hoover_common::RecordedResponse;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::debug;

/// Path of the cleaning sessions resource.
pub const CLEANING_SESSIONS_PATH: &str = "/v1/cleaning-sessions";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to one worker's instance of the service.
#[derive(Debug, Clone)]
pub struct CleaningClient {
    http: Client,
    base_uri: String,
}

impl CleaningClient {
    pub fn new(base_uri: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_uri: base_uri.into(),
        })
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_uri)
    }

    /// GETs `path`; any non-success status is an error.
    pub async fn get(&self, path: &str) -> Result<RecordedResponse> {
        let url = self.url(path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?;
        record(response).await
    }

    /// POSTs a cleaning session request and records the response whatever
    /// its status.
    pub async fn post_cleaning_session(&self, request: &Map<String, Value>) -> Result<RecordedResponse> {
        let url = self.url(CLEANING_SESSIONS_PATH);
        debug!(%url, payload = %serde_json::Value::Object(request.clone()), "Sending cleaning session");
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;
        record(response).await
    }
}

async fn record(response: reqwest::Response) -> Result<RecordedResponse> {
    let status = response.status().as_u16();
    let bytes = response
        .bytes()
        .await
        .context("Failed to read response body")?;
    let body = decode_body(&bytes);
    debug!(status, %body, "Response received");
    Ok(RecordedResponse::new(status, body))
}

/// JSON when the body parses, the raw text otherwise, `Null` when empty.
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_json_body() {
        let body = decode_body(br#"{"coords":[1,3],"patches":1}"#);
        assert_eq!(body, json!({"coords": [1, 3], "patches": 1}));
    }

    #[test]
    fn test_decode_empty_and_text_bodies() {
        assert_eq!(decode_body(b""), Value::Null);
        assert_eq!(decode_body(b"  \n"), Value::Null);
        assert_eq!(decode_body(b"Bad Request"), json!("Bad Request"));
    }

    #[test]
    fn test_url_joins_base_and_path() {
        let client = CleaningClient::new("http://localhost:8081").unwrap();
        assert_eq!(
            client.url(CLEANING_SESSIONS_PATH),
            "http://localhost:8081/v1/cleaning-sessions"
        );
    }
}

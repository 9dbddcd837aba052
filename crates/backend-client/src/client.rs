//! HTTP client for the cinema management server's REST API.
//!
//! One retry loop serves every endpoint: transient transport failures and
//! retryable statuses are re-sent with a fixed backoff, permanent API
//! answers are returned as-is. Write endpoints are never retried since the
//! insert API is not idempotent.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::time::sleep;

use kinodesk_core::sync::{HealthReport, RemoteBackend, TableSpec};

use crate::error::{is_retryable_status, is_retryable_transport_error, BackendError, Result};

/// Per-attempt timeout for data requests.
const DEFAULT_TIMEOUT_MS: u64 = 15_000;
/// The health probe answers fast or not at all.
const HEALTH_TIMEOUT_MS: u64 = 5_000;
const HEALTH_RETRIES: u32 = 3;
const DATA_RETRIES: u32 = 2;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;
const MAX_LOG_BODY_CHARS: usize = 512;

#[derive(Debug, Clone, Default)]
struct Target {
    base_url: String,
    api_key: String,
}

/// Client for the cinema server REST API. Cheap to share behind an `Arc`;
/// the target can be swapped at runtime when the user reconfigures.
#[derive(Debug)]
pub struct BackendClient {
    client: reqwest::Client,
    target: RwLock<Target>,
    retry_backoff: Duration,
    health_timeout_ms: u64,
    request_timeout_ms: u64,
}

impl Default for BackendClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            target: RwLock::new(Target::default()),
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            health_timeout_ms: HEALTH_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    fn target(&self) -> Result<Target> {
        let target = self
            .target
            .read()
            .map_err(|_| BackendError::invalid_request("Client target lock poisoned"))?
            .clone();
        if target.base_url.is_empty() {
            return Err(BackendError::invalid_request("No server URL configured"));
        }
        Ok(target)
    }

    fn headers(&self, api_key: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !api_key.is_empty() {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| BackendError::invalid_request("Invalid API key format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }
        Ok(headers)
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }
        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    /// Error message from a JSON error body, or the raw body as fallback.
    fn api_error(status: u16, body: &str) -> BackendError {
        if let Ok(parsed) = serde_json::from_str::<Value>(body) {
            if let Some(message) = parsed
                .get("message")
                .or_else(|| parsed.get("detail"))
                .or_else(|| parsed.get("error"))
                .and_then(Value::as_str)
            {
                return BackendError::api(status, message);
            }
        }
        BackendError::api(status, format!("Request failed: {}", body))
    }

    /// Send a request with `retries + 1` total attempts. Retryable statuses
    /// and transport errors back off and re-send; when the last attempt also
    /// timed out the error carries the whole budget.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        timeout_ms: u64,
        retries: u32,
    ) -> Result<String> {
        let target = self.target()?;
        let url = format!("{}{}", target.base_url.trim_end_matches('/'), path);
        let max_attempts = retries.saturating_add(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let mut request = self
                .client
                .request(method.clone(), &url)
                .headers(self.headers(&target.api_key)?)
                .timeout(Duration::from_millis(timeout_ms));
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await?;
                    Self::log_response(status, &text);
                    if status.is_success() {
                        return Ok(text);
                    }
                    if is_retryable_status(status.as_u16()) && attempt < max_attempts {
                        debug!(
                            "Retrying {} {} after HTTP {} (attempt {}/{})",
                            method,
                            path,
                            status.as_u16(),
                            attempt,
                            max_attempts
                        );
                        sleep(self.retry_backoff).await;
                        continue;
                    }
                    return Err(Self::api_error(status.as_u16(), &text));
                }
                Err(err) => {
                    if is_retryable_transport_error(&err) && attempt < max_attempts {
                        debug!(
                            "Retrying {} {} after transport error (attempt {}/{}): {}",
                            method, path, attempt, max_attempts, err
                        );
                        sleep(self.retry_backoff).await;
                        continue;
                    }
                    if err.is_timeout() {
                        return Err(BackendError::Timeout {
                            attempts: attempt,
                            timeout_ms,
                        });
                    }
                    return Err(BackendError::Http(err));
                }
            }
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
        serde_json::from_str(body).map_err(|err| {
            debug!("Failed to deserialize response body: {}", err);
            BackendError::Json(err)
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let body = self
            .request(Method::GET, path, None, self.request_timeout_ms, DATA_RETRIES)
            .await?;
        Self::parse(&body)
    }
}

#[async_trait]
impl RemoteBackend for BackendClient {
    fn set_target(&self, base_url: &str, api_key: &str) {
        if let Ok(mut target) = self.target.write() {
            target.base_url = base_url.trim_end_matches('/').to_string();
            target.api_key = api_key.to_string();
        }
    }

    async fn health(&self) -> kinodesk_core::Result<HealthReport> {
        let body = self
            .request(Method::GET, "/", None, self.health_timeout_ms, HEALTH_RETRIES)
            .await
            .map_err(kinodesk_core::Error::from)?;
        Ok(Self::parse(&body)?)
    }

    async fn fetch_collection(&self, name: &str) -> kinodesk_core::Result<Value> {
        let path = format!("/cinema/{}", urlencoding::encode(name));
        Ok(self.get_json(&path).await?)
    }

    async fn table_exists(&self, table: &str) -> kinodesk_core::Result<bool> {
        let path = format!("/api/database/tables/{}", urlencoding::encode(table));
        match self.get_json(&path).await {
            Ok(_) => Ok(true),
            Err(err) if err.status_code() == Some(404) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn create_table(&self, spec: &TableSpec) -> kinodesk_core::Result<()> {
        let body = serde_json::to_value(spec).map_err(BackendError::Json)?;
        self.request(
            Method::POST,
            "/api/database/tables",
            Some(&body),
            self.request_timeout_ms,
            0,
        )
        .await
        .map_err(kinodesk_core::Error::from)?;
        Ok(())
    }

    async fn list_rows(&self, table: &str) -> kinodesk_core::Result<Value> {
        let path = format!("/api/database/tables/{}/data", urlencoding::encode(table));
        Ok(self.get_json(&path).await?)
    }

    async fn insert_row(&self, table: &str, data: &Value) -> kinodesk_core::Result<()> {
        let body = json!({ "table_name": table, "data": data });
        self.request(
            Method::POST,
            "/api/database/data/insert",
            Some(&body),
            self.request_timeout_ms,
            0,
        )
        .await
        .map_err(kinodesk_core::Error::from)?;
        Ok(())
    }

    async fn update_row(
        &self,
        table: &str,
        data: &Value,
        where_condition: &str,
    ) -> kinodesk_core::Result<()> {
        let body = json!({
            "table_name": table,
            "data": data,
            "where_condition": where_condition,
        });
        self.request(
            Method::PUT,
            "/api/database/data/update",
            Some(&body),
            self.request_timeout_ms,
            0,
        )
        .await
        .map_err(kinodesk_core::Error::from)?;
        Ok(())
    }
}

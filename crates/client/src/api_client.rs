//! HTTP API client for the booking backend.

use std::time::Duration;

use luci_shared::{ApiError, BookingRequest};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::ClientConfig;

/// Every REST path lives under this prefix.
const API_PREFIX: &str = "/api/v1";

/// Mark-read is fire-and-forget, so it gets a shorter leash.
const MARK_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the REST side of the backend.
///
/// Responses are returned as raw JSON; callers normalise the shapes.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_base_url.clone(), config.http_timeout)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}{API_PREFIX}/{path}")
    }

    async fn read_body<TRes: DeserializeOwned>(resp: reqwest::Response) -> Result<TRes, ApiError> {
        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Unreachable(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        if text.trim().is_empty() {
            serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
        }
    }

    /// Like `read_body`, but a 2xx body that is not JSON is kept as a string
    /// instead of failing.
    async fn read_lenient(resp: reqwest::Response) -> Result<Value, ApiError> {
        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Unreachable(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(_) => {
                tracing::warn!(status, "non-JSON success body kept as text");
                Ok(Value::String(text))
            }
        }
    }

    /// GET a JSON document
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);
        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(unreachable)?;
        Self::read_body(resp).await
    }

    /// POST a JSON body
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.post_json_within(path, body, self.timeout).await
    }

    async fn post_json_within<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
        timeout: Duration,
    ) -> Result<TRes, ApiError> {
        let url = self.url(path);
        let body_bytes = serde_json::to_vec(body).map_err(|e| ApiError::Deserialize(e.to_string()))?;
        tracing::debug!("POST {}", url);

        let resp = self
            .client
            .post(&url)
            .timeout(timeout)
            .body(body_bytes)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(unreachable)?;
        Self::read_body(resp).await
    }

    // --- Backend endpoints ---

    pub async fn recommendations(
        &self,
        user_id: &str,
        limit: u32,
        coords: Option<(f64, f64)>,
    ) -> Result<Value, ApiError> {
        let mut path = format!(
            "/recommendations/{}?limit={}",
            urlencoding::encode(user_id),
            limit
        );
        if let Some((latitude, longitude)) = coords {
            path.push_str(&format!("&latitude={latitude}&longitude={longitude}"));
        }
        self.get_json(&path).await
    }

    pub async fn salon_with_owner(&self, salon_id: &str) -> Result<Value, ApiError> {
        self.get_json(&format!("/salons/{}/with-owner", urlencoding::encode(salon_id)))
            .await
    }

    pub async fn salon(&self, salon_id: &str) -> Result<Value, ApiError> {
        self.get_json(&format!("/salons/{}", urlencoding::encode(salon_id)))
            .await
    }

    /// A 2xx reply always yields the raw body, JSON or not, so an accepted
    /// booking is never reported as failed.
    pub async fn create_booking(&self, request: &BookingRequest) -> Result<Value, ApiError> {
        let url = self.url("/bookings/create-booking");
        tracing::debug!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(unreachable)?;
        Self::read_lenient(resp).await
    }

    pub async fn conversations(&self, user_id: &str) -> Result<Value, ApiError> {
        self.get_json(&format!("/conversations/{}", urlencoding::encode(user_id)))
            .await
    }

    pub async fn messages(&self, conversation_id: &str) -> Result<Value, ApiError> {
        self.get_json(&format!("/messages/{}", urlencoding::encode(conversation_id)))
            .await
    }

    pub async fn mark_read(&self, conversation_id: &str, user_id: &str) -> Result<(), ApiError> {
        let body = json!({ "conversationId": conversation_id, "userId": user_id });
        let _: Value = self
            .post_json_within("/messages/mark-read", &body, MARK_READ_TIMEOUT.min(self.timeout))
            .await?;
        Ok(())
    }
}

fn unreachable(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Unreachable(format!("request timed out: {e}"))
    } else {
        ApiError::Unreachable(e.to_string())
    }
}

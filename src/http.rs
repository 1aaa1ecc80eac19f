//! Shared HTTP client for remote collaborators
//!
//! Wraps reqwest with per-call timeouts and maps response statuses onto
//! the pipeline error taxonomy so callers can rely on `is_transient()`.

use crate::error::{IngestError, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

/// HTTP client with taxonomy-aware status handling
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    /// Create a client with a per-call timeout in seconds
    pub fn new(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Execute a POST request with a JSON body
    pub async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
        headers: &[(&str, String)],
    ) -> Result<R> {
        debug!("POST {}", url);

        let mut request = self.client.post(url).json(body);
        for (key, value) in headers {
            request = request.header(*key, value);
        }

        let response = self.send(request).await?;
        Self::json_body(Self::check_status(response).await?).await
    }

    /// Execute a GET request returning JSON
    pub async fn get_json<R: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, String)],
    ) -> Result<R> {
        debug!("GET {}", url);

        let mut request = self.client.get(url);
        for (key, value) in headers {
            request = request.header(*key, value);
        }

        let response = self.send(request).await?;
        Self::json_body(Self::check_status(response).await?).await
    }

    /// Execute a GET request returning raw bytes
    pub async fn get_bytes(&self, url: &str, headers: &[(&str, String)]) -> Result<Vec<u8>> {
        debug!("GET {} (bytes)", url);

        let mut request = self.client.get(url);
        for (key, value) in headers {
            request = request.header(*key, value);
        }

        let response = Self::check_status(self.send(request).await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Upload raw bytes with PUT
    pub async fn put_bytes(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(&str, String)],
    ) -> Result<()> {
        debug!("PUT {} ({} bytes)", url, body.len());

        let mut request = self.client.put(url).body(body);
        for (key, value) in headers {
            request = request.header(*key, value);
        }

        Self::check_status(self.send(request).await?).await?;
        Ok(())
    }

    /// Execute a DELETE request; a 404 is treated as already gone
    pub async fn delete(&self, url: &str, headers: &[(&str, String)]) -> Result<bool> {
        debug!("DELETE {}", url);

        let mut request = self.client.delete(url);
        for (key, value) in headers {
            request = request.header(*key, value);
        }

        let response = self.send(request).await?;
        if response.status().as_u16() == 404 {
            return Ok(false);
        }
        Self::check_status(response).await?;
        Ok(true)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| IngestError::TransientNetwork("request timed out".to_string()))?
            .map_err(|e| IngestError::TransientNetwork(e.to_string()))
    }

    /// Map a non-success status onto the error taxonomy
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| format!("HTTP {} error", status));
        error!("API error ({}): {}", status, body);

        Err(match status.as_u16() {
            401 | 403 => IngestError::CredentialInvalid(body),
            408 => IngestError::TransientNetwork(body),
            429 => IngestError::RateLimited(body),
            500..=599 => IngestError::TransientNetwork(body),
            status => IngestError::Api {
                status,
                message: body,
            },
        })
    }

    async fn json_body<R: DeserializeOwned>(response: Response) -> Result<R> {
        response
            .json()
            .await
            .map_err(|e| IngestError::Api {
                status: 200,
                message: format!("invalid response body: {}", e),
            })
    }

    /// Get the underlying reqwest client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Bearer-token authorization header when a key is configured
pub fn bearer_headers(api_key: Option<&str>) -> Vec<(&'static str, String)> {
    let mut headers = Vec::new();
    if let Some(key) = api_key {
        headers.push(("Authorization", format!("Bearer {}", key)));
    }
    headers
}

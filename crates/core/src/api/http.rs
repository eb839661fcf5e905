//! Thin wrapper over `reqwest` that classifies transport outcomes.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{HashDbError, Result};

/// HTTP client used by the query operations.
///
/// Timeouts are applied per request so a settings change takes effect on the
/// next task without rebuilding the client.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new client.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("hashdb-rs/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HashDbError::Transport {
                url: String::new(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    /// GET `url` and decode the body as JSON.
    pub async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value> {
        debug!("GET {} (timeout {:?})", url, timeout);
        let response = self.send(self.client.get(url), url, timeout).await?;
        decode_json(response, url).await
    }

    /// POST `body` as JSON to `url` and decode the response body as JSON.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<Value> {
        debug!("POST {} (timeout {:?})", url, timeout);
        let response = self
            .send(self.client.post(url).json(body), url, timeout)
            .await?;
        decode_json(response, url).await
    }

    async fn send(&self, request: RequestBuilder, url: &str, timeout: Duration) -> Result<Response> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Unexpected response code {} from {}", status, url);
            return Err(HashDbError::ResponseCode {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

async fn decode_json(response: Response, url: &str) -> Result<Value> {
    let body = response
        .text()
        .await
        .map_err(|e| classify_transport_error(url, e))?;

    serde_json::from_str(&body).map_err(|e| HashDbError::Json {
        url: url.to_string(),
        message: format!("{} (body={:?})", e, truncate(&body, 256)),
    })
}

fn classify_transport_error(url: &str, error: reqwest::Error) -> HashDbError {
    if error.is_timeout() {
        warn!("Request to {} timed out", url);
        HashDbError::Timeout {
            url: url.to_string(),
        }
    } else {
        warn!("Request to {} failed: {}", url, error);
        HashDbError::Transport {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("héllo", 2), "hé");
    }
}

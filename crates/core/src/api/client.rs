//! HashDB HTTP client implementing the four query operations.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{HashDbError, Result};

use super::http::HttpClient;
use super::types::{parse_algorithm, parse_all, parse_hash, parse_hit};
use super::{Algorithm, Endpoint, Hash, HashDbApi, Hit};

/// Production [`HashDbApi`] implementation.
#[derive(Clone)]
pub struct HashDbClient {
    http: HttpClient,
}

impl HashDbClient {
    /// Create a new client.
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: HttpClient::new()?,
        })
    }

    /// Create a client around an existing HTTP wrapper.
    pub fn with_http(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HashDbApi for HashDbClient {
    async fn fetch_algorithms(&self, endpoint: &Endpoint) -> Result<Vec<Algorithm>> {
        let url = endpoint.url("/hash");
        let body = self.http.get_json(&url, endpoint.timeout).await?;
        let algorithms = parse_all(records(&body, "algorithms", &url)?, parse_algorithm)?;

        info!("Fetched {} algorithms from {}", algorithms.len(), endpoint.api_url);
        Ok(algorithms)
    }

    async fn lookup_hash(
        &self,
        endpoint: &Endpoint,
        algorithm_name: &str,
        hash_value: u64,
    ) -> Result<Vec<Hash>> {
        let url = endpoint.url(&format!(
            "/hash/{}/{}",
            urlencoding::encode(algorithm_name),
            hash_value
        ));
        let body = self.http.get_json(&url, endpoint.timeout).await?;
        let hashes = parse_all(records(&body, "hashes", &url)?, parse_hash)?;

        debug!(
            algorithm = algorithm_name,
            value = hash_value,
            matches = hashes.len(),
            "Hash lookup finished"
        );
        Ok(hashes)
    }

    async fn fetch_module_hashes(
        &self,
        endpoint: &Endpoint,
        module_name: &str,
        algorithm_name: &str,
        permutation: &str,
    ) -> Result<Vec<Hash>> {
        let url = endpoint.url(&format!(
            "/module/{}/{}/{}",
            urlencoding::encode(module_name),
            urlencoding::encode(algorithm_name),
            urlencoding::encode(permutation)
        ));
        let body = self.http.get_json(&url, endpoint.timeout).await?;
        let hashes = parse_all(records(&body, "hashes", &url)?, parse_hash)?;

        info!(
            "Fetched {} hashes for module {} ({}, {})",
            hashes.len(),
            module_name,
            algorithm_name,
            permutation
        );
        Ok(hashes)
    }

    async fn hunt(&self, endpoint: &Endpoint, hash_value: u64) -> Result<Vec<Hit>> {
        let url = endpoint.url("/hunt");
        let request = json!({ "hashes": [hash_value] });
        let body = self
            .http
            .post_json(&url, &request, endpoint.timeout)
            .await?;
        let hits = parse_all(records(&body, "hits", &url)?, parse_hit)?;

        debug!(value = hash_value, hits = hits.len(), "Hunt finished");
        Ok(hits)
    }
}

/// Pull the record array out of a response object.
///
/// A missing field means "no records"; anything other than an array is a
/// malformed body.
fn records<'a>(body: &'a Value, field: &str, url: &str) -> Result<&'a [Value]> {
    let object = body.as_object().ok_or_else(|| HashDbError::Json {
        url: url.to_string(),
        message: "response body is not a JSON object".to_string(),
    })?;

    match object.get(field) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(HashDbError::Json {
            url: url.to_string(),
            message: format!("field {:?} is not an array", field),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_missing_field_is_empty() {
        let body = json!({"other": []});
        assert!(records(&body, "hashes", "u").unwrap().is_empty());
    }

    #[test]
    fn test_records_rejects_non_array() {
        let body = json!({"hashes": {"hash": 1}});
        assert!(matches!(
            records(&body, "hashes", "u"),
            Err(HashDbError::Json { .. })
        ));

        let body = json!([1, 2]);
        assert!(matches!(
            records(&body, "hashes", "u"),
            Err(HashDbError::Json { .. })
        ));
    }
}

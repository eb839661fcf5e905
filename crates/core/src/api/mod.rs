//! HashDB remote service: record types, HTTP wrapper and query operations.
//!
//! The four remote operations are exposed through the [`HashDbApi`] trait so the
//! workflows can be driven by [`HashDbClient`] in production and by
//! `testing::MockHashDb` in tests.

mod client;
mod http;
mod types;

pub use client::HashDbClient;
pub use http::HttpClient;
pub use types::{
    algorithm_size_bits, parse_algorithm, parse_all, parse_hash, parse_hit, Algorithm, Hash, Hit,
};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Where and how patiently to talk to the service.
///
/// Built from a settings snapshot at task start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Base URL without a trailing slash.
    pub api_url: String,
    pub timeout: Duration,
}

impl Endpoint {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Self {
        let api_url = api_url.into();
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Join a path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

/// The remote operations offered by a HashDB service.
#[async_trait]
pub trait HashDbApi: Send + Sync {
    /// List every algorithm the server knows (`GET /hash`).
    async fn fetch_algorithms(&self, endpoint: &Endpoint) -> Result<Vec<Algorithm>>;

    /// Resolve one hash value (`GET /hash/{algorithm}/{value}`).
    ///
    /// The caller applies any XOR key to `hash_value` beforehand.
    async fn lookup_hash(
        &self,
        endpoint: &Endpoint,
        algorithm_name: &str,
        hash_value: u64,
    ) -> Result<Vec<Hash>>;

    /// Every hash exported by a module for an algorithm and permutation
    /// (`GET /module/{module}/{algorithm}/{permutation}`).
    async fn fetch_module_hashes(
        &self,
        endpoint: &Endpoint,
        module_name: &str,
        algorithm_name: &str,
        permutation: &str,
    ) -> Result<Vec<Hash>>;

    /// Guess which algorithms could have produced `hash_value` (`POST /hunt`).
    async fn hunt(&self, endpoint: &Endpoint, hash_value: u64) -> Result<Vec<Hit>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let endpoint = Endpoint::new("https://hashdb.openanalysis.net/", Duration::from_secs(15));
        assert_eq!(endpoint.url("/hash"), "https://hashdb.openanalysis.net/hash");
    }
}

//! Mock HashDB service for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::api::{Algorithm, Endpoint, Hash, HashDbApi, Hit};
use crate::error::{HashDbError, Result};

/// A recorded request for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedQuery {
    FetchAlgorithms,
    LookupHash {
        algorithm: String,
        value: u64,
    },
    FetchModuleHashes {
        module: String,
        algorithm: String,
        permutation: String,
    },
    Hunt {
        value: u64,
    },
}

/// Mock implementation of the [`HashDbApi`] trait.
///
/// Provides controllable behavior for testing:
/// - Return canned algorithms, hashes, module hashes and hits
/// - Track queries for assertions
/// - Simulate failures and slow responses
#[derive(Debug, Default)]
pub struct MockHashDb {
    algorithms: Arc<RwLock<Vec<Algorithm>>>,
    /// Hashes by (algorithm, queried value).
    hashes: Arc<RwLock<HashMap<(String, u64), Vec<Hash>>>>,
    /// Hashes by (module, algorithm, permutation).
    modules: Arc<RwLock<HashMap<(String, String, String), Vec<Hash>>>>,
    /// Hits by hunted value.
    hits: Arc<RwLock<HashMap<u64, Vec<Hit>>>>,
    /// Recorded queries.
    queries: Arc<RwLock<Vec<RecordedQuery>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<HashDbError>>>,
    /// Errors for lookups of specific values.
    lookup_errors: Arc<RwLock<HashMap<u64, HashDbError>>>,
    /// Delay applied before every response.
    delay: Arc<RwLock<Option<Duration>>>,
}

impl MockHashDb {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub async fn set_algorithms(&self, algorithms: Vec<Algorithm>) {
        *self.algorithms.write().await = algorithms;
    }

    /// Answer lookups of `value` under `algorithm` with `hashes`.
    pub async fn add_hashes(&self, algorithm: &str, value: u64, hashes: Vec<Hash>) {
        self.hashes
            .write()
            .await
            .insert((algorithm.to_string(), value), hashes);
    }

    pub async fn add_module_hashes(
        &self,
        module: &str,
        algorithm: &str,
        permutation: &str,
        hashes: Vec<Hash>,
    ) {
        self.modules.write().await.insert(
            (
                module.to_string(),
                algorithm.to_string(),
                permutation.to_string(),
            ),
            hashes,
        );
    }

    pub async fn add_hits(&self, value: u64, hits: Vec<Hit>) {
        self.hits.write().await.insert(value, hits);
    }

    /// Make the next operation fail.
    pub async fn set_next_error(&self, error: HashDbError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make the lookup of `value` fail.
    pub async fn set_lookup_error(&self, value: u64, error: HashDbError) {
        self.lookup_errors.write().await.insert(value, error);
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    // =========================================================================
    // Assertions
    // =========================================================================

    pub async fn recorded_queries(&self) -> Vec<RecordedQuery> {
        self.queries.read().await.clone()
    }

    pub async fn lookup_count(&self) -> usize {
        self.queries
            .read()
            .await
            .iter()
            .filter(|q| matches!(q, RecordedQuery::LookupHash { .. }))
            .count()
    }

    async fn begin(&self, query: RecordedQuery) -> Result<()> {
        self.queries.write().await.push(query);

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_error.write().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl HashDbApi for MockHashDb {
    async fn fetch_algorithms(&self, _endpoint: &Endpoint) -> Result<Vec<Algorithm>> {
        self.begin(RecordedQuery::FetchAlgorithms).await?;
        Ok(self.algorithms.read().await.clone())
    }

    async fn lookup_hash(
        &self,
        _endpoint: &Endpoint,
        algorithm_name: &str,
        hash_value: u64,
    ) -> Result<Vec<Hash>> {
        self.begin(RecordedQuery::LookupHash {
            algorithm: algorithm_name.to_string(),
            value: hash_value,
        })
        .await?;

        if let Some(error) = self.lookup_errors.write().await.remove(&hash_value) {
            return Err(error);
        }

        Ok(self
            .hashes
            .read()
            .await
            .get(&(algorithm_name.to_string(), hash_value))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_module_hashes(
        &self,
        _endpoint: &Endpoint,
        module_name: &str,
        algorithm_name: &str,
        permutation: &str,
    ) -> Result<Vec<Hash>> {
        self.begin(RecordedQuery::FetchModuleHashes {
            module: module_name.to_string(),
            algorithm: algorithm_name.to_string(),
            permutation: permutation.to_string(),
        })
        .await?;

        Ok(self
            .modules
            .read()
            .await
            .get(&(
                module_name.to_string(),
                algorithm_name.to_string(),
                permutation.to_string(),
            ))
            .cloned()
            .unwrap_or_default())
    }

    async fn hunt(&self, _endpoint: &Endpoint, hash_value: u64) -> Result<Vec<Hit>> {
        self.begin(RecordedQuery::Hunt { value: hash_value }).await?;
        Ok(self
            .hits
            .read()
            .await
            .get(&hash_value)
            .cloned()
            .unwrap_or_default())
    }
}

//! Testing utilities and mock implementations.
//!
//! This module provides a mock HashDB service and a scriptable host so the
//! workflows can be exercised end to end without a network or a disassembler.
//!
//! # Example
//!
//! ```rust,ignore
//! use hashdb_core::testing::{fixtures, MockHashDb, MockHost};
//!
//! let api = MockHashDb::new();
//! api.set_algorithms(vec![fixtures::crc32()]).await;
//! api.add_hashes("crc32", 1653273962, vec![fixtures::route_the_call_hash()]).await;
//!
//! let host = MockHost::new()
//!     .with_highlighted(Some(0x401000), 1653273962)
//!     .with_module_import(None);
//! ```

mod mock_api;
mod mock_host;

pub use crate::config::MemorySettingsStore;
pub use mock_api::{MockHashDb, RecordedQuery};
pub use mock_host::{MockHost, RecordedLabel};

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::{json, Value};

    use crate::api::{Algorithm, Hash, Hit};

    pub fn crc32() -> Algorithm {
        Algorithm {
            name: "crc32".to_string(),
            description: "Standard crc32 hash.".to_string(),
            size_bits: 32,
        }
    }

    pub fn fnv1a_64() -> Algorithm {
        Algorithm {
            name: "fnv1a_64".to_string(),
            description: "FNV1a hash (64-bit)".to_string(),
            size_bits: 64,
        }
    }

    /// A plain string hash.
    pub fn string_hash(value: u64, string: &str) -> Hash {
        Hash {
            value,
            string: string.to_string(),
            is_api: false,
            permutation_type: None,
            api_name: None,
            modules: Vec::new(),
        }
    }

    /// An API hash with the `api` permutation.
    pub fn api_hash(value: u64, api: &str, modules: &[&str]) -> Hash {
        Hash {
            value,
            string: api.to_string(),
            is_api: true,
            permutation_type: Some("api".to_string()),
            api_name: Some(api.to_string()),
            modules: modules.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// crc32 of the empty string.
    pub fn empty_string_hash() -> Hash {
        string_hash(2998556761, "")
    }

    pub fn route_the_call_hash() -> Hash {
        api_hash(1653273962, "RouteTheCall", &["zipfldr"])
    }

    pub fn crc32_hit() -> Hit {
        Hit {
            algorithm_name: "crc32".to_string(),
            count: 1,
            hitrate: 1.0,
        }
    }

    pub fn algorithms_json() -> Value {
        json!({"algorithms": [
            {"algorithm": "crc32", "description": "Standard crc32 hash.", "type": "unsigned_int"},
            {"algorithm": "fnv1a_64", "description": "FNV1a hash (64-bit)", "type": "unsigned_long"}
        ]})
    }

    pub fn hashes_json() -> Value {
        json!({"hashes": [
            {"hash": 1653273962u64, "string": {
                "string": "RouteTheCall", "is_api": true, "permutation": "api",
                "api": "RouteTheCall", "modules": ["zipfldr"]
            }},
            {"hash": 2998556761u64, "string": {"string": "DllCanUnloadNow", "is_api": false}}
        ]})
    }

    pub fn hits_json() -> Value {
        json!({"hits": [{"algorithm": "crc32", "count": 1, "hitrate": 1.0}]})
    }
}

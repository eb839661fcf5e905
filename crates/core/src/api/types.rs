//! Typed HashDB records and the validator that builds them from server JSON.
//!
//! The server payloads are loosely shaped, so every record goes through a
//! private wire struct with optional fields first and is only promoted to the
//! public type once its invariants hold.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HashDbError, Result};

const TYPE_UNSIGNED_INT: &str = "unsigned_int";
const TYPE_UNSIGNED_LONG: &str = "unsigned_long";

// ============================================================================
// Public types
// ============================================================================

/// A hashing algorithm known to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Algorithm {
    pub name: String,
    pub description: String,
    /// Either 32 or 64.
    pub size_bits: u32,
}

impl Algorithm {
    /// Width of a hash produced by this algorithm, in bytes.
    pub fn size_bytes(&self) -> u8 {
        (self.size_bits / 8) as u8
    }

    /// Server type tag for this algorithm's width.
    pub fn type_tag(&self) -> &'static str {
        if self.size_bits == 64 {
            TYPE_UNSIGNED_LONG
        } else {
            TYPE_UNSIGNED_INT
        }
    }

    /// Serialize back into the server's record shape.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "algorithm": self.name,
            "description": self.description,
            "type": self.type_tag(),
        })
    }
}

/// Map a server type tag to a bit width.
pub fn algorithm_size_bits(tag: &str) -> Result<u32> {
    match tag {
        TYPE_UNSIGNED_INT => Ok(32),
        TYPE_UNSIGNED_LONG => Ok(64),
        other => Err(HashDbError::UnknownAlgorithmType {
            tag: other.to_string(),
        }),
    }
}

/// A hash value and the string it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hash {
    pub value: u64,
    pub string: String,
    pub is_api: bool,
    /// Set only for API hashes.
    pub permutation_type: Option<String>,
    /// Set only for API hashes; always equal to `string`.
    pub api_name: Option<String>,
    /// Non-empty for API hashes, empty otherwise.
    pub modules: Vec<String>,
}

impl Hash {
    /// Serialize back into the server's record shape.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(WireHash::from(self)).unwrap_or(Value::Null)
    }
}

/// One algorithm match from a hunt.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub algorithm_name: String,
    pub count: u64,
    /// Fraction of submitted hashes this algorithm matched, in `[0, 1]`.
    pub hitrate: f64,
}

// ============================================================================
// Wire types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireAlgorithm {
    #[serde(default)]
    algorithm: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireHash {
    #[serde(default)]
    hash: Option<u64>,
    #[serde(default)]
    string: Option<WireString>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireString {
    #[serde(default)]
    string: Option<String>,
    #[serde(default)]
    is_api: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    permutation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modules: Option<Vec<String>>,
}

impl WireString {
    fn is_empty(&self) -> bool {
        self.string.is_none()
            && self.is_api.is_none()
            && self.permutation.is_none()
            && self.api.is_none()
            && self.modules.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct WireHit {
    #[serde(default)]
    algorithm: Option<String>,
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    hitrate: Option<f64>,
}

impl From<&Hash> for WireHash {
    fn from(hash: &Hash) -> Self {
        let string = if hash.is_api {
            WireString {
                string: Some(hash.string.clone()),
                is_api: Some(true),
                permutation: hash.permutation_type.clone(),
                api: hash.api_name.clone(),
                modules: Some(hash.modules.clone()),
            }
        } else {
            WireString {
                string: Some(hash.string.clone()),
                is_api: Some(false),
                ..Default::default()
            }
        };
        WireHash {
            hash: Some(hash.value),
            string: Some(string),
        }
    }
}

// ============================================================================
// Validator
// ============================================================================

/// Build an [`Algorithm`] from one server record.
pub fn parse_algorithm(json: &Value) -> Result<Algorithm> {
    let wire: WireAlgorithm = serde_json::from_value(json.clone())
        .map_err(|e| HashDbError::InvalidAlgorithm(format!("malformed record: {}", e)))?;

    let name = wire
        .algorithm
        .ok_or_else(|| HashDbError::InvalidAlgorithm("missing key: algorithm".to_string()))?;
    let description = wire
        .description
        .ok_or_else(|| HashDbError::InvalidAlgorithm("missing key: description".to_string()))?;
    let tag = wire
        .kind
        .ok_or_else(|| HashDbError::InvalidAlgorithm("missing key: type".to_string()))?;

    Ok(Algorithm {
        name,
        description,
        size_bits: algorithm_size_bits(&tag)?,
    })
}

/// Build a [`Hash`] from one server record.
pub fn parse_hash(json: &Value) -> Result<Hash> {
    let wire: WireHash = serde_json::from_value(json.clone())
        .map_err(|e| HashDbError::InvalidHash(format!("malformed record: {}", e)))?;

    let value = wire
        .hash
        .ok_or_else(|| HashDbError::InvalidHash("missing key: hash".to_string()))?;

    let string_object = match wire.string {
        Some(s) if !s.is_empty() => s,
        _ => {
            return Err(HashDbError::InvalidHash(format!(
                "\"string\" object doesn't exist, or is empty (hash {})",
                value
            )))
        }
    };

    let string = string_object
        .string
        .ok_or_else(|| HashDbError::InvalidHash("missing key: string.string".to_string()))?;
    let is_api = string_object
        .is_api
        .ok_or_else(|| HashDbError::InvalidHash("missing key: string.is_api".to_string()))?;

    if !is_api {
        return Ok(Hash {
            value,
            string: string.replace('\0', ""),
            is_api,
            permutation_type: None,
            api_name: None,
            modules: Vec::new(),
        });
    }

    let permutation = non_empty(string_object.permutation)
        .ok_or_else(|| HashDbError::InvalidHash("missing key: string.permutation".to_string()))?;
    let api = non_empty(string_object.api)
        .ok_or_else(|| HashDbError::InvalidHash("missing key: string.api".to_string()))?;
    let modules = string_object
        .modules
        .filter(|m| !m.is_empty())
        .ok_or_else(|| HashDbError::InvalidHash("missing key: string.modules".to_string()))?;

    if api != string {
        return Err(HashDbError::InvalidHash(format!(
            "api value {:?} doesn't match string value {:?}",
            api, string
        )));
    }

    Ok(Hash {
        value,
        string,
        is_api,
        permutation_type: Some(permutation),
        api_name: Some(api),
        modules,
    })
}

/// Build a [`Hit`] from one server record.
pub fn parse_hit(json: &Value) -> Result<Hit> {
    let wire: WireHit = serde_json::from_value(json.clone())
        .map_err(|e| HashDbError::InvalidHit(format!("malformed record: {}", e)))?;

    let algorithm_name = wire
        .algorithm
        .ok_or_else(|| HashDbError::InvalidHit("missing key: algorithm".to_string()))?;
    let count = wire
        .count
        .ok_or_else(|| HashDbError::InvalidHit("missing key: count".to_string()))?;
    let hitrate = wire
        .hitrate
        .ok_or_else(|| HashDbError::InvalidHit("missing key: hitrate".to_string()))?;

    if !(0.0..=1.0).contains(&hitrate) {
        return Err(HashDbError::InvalidHit(format!(
            "hitrate out of range: {}",
            hitrate
        )));
    }

    Ok(Hit {
        algorithm_name,
        count,
        hitrate,
    })
}

/// Parse every record in an array, failing on the first malformed one.
pub fn parse_all<T>(records: &[Value], parse: fn(&Value) -> Result<T>) -> Result<Vec<T>> {
    records.iter().map(parse).collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{parse_algorithm, Algorithm, Endpoint};
use crate::error::{HashDbError, Result};

pub const DEFAULT_API_URL: &str = "https://hashdb.openanalysis.net";
pub const DEFAULT_ENUM_PREFIX: &str = "hashdb_strings";
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 15;

/// Session configuration.
///
/// One live instance exists per session; tasks work on a snapshot taken when
/// they start.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    pub enum_prefix: String,
    pub request_timeout_seconds: u64,
    pub xor_enabled: bool,
    pub xor_value: u64,
    pub selected_algorithm: Option<Algorithm>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            enum_prefix: DEFAULT_ENUM_PREFIX.to_string(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT,
            xor_enabled: false,
            xor_value: 0,
            selected_algorithm: None,
        }
    }
}

impl Settings {
    /// Check the invariants every query relies on.
    pub fn validate(&self) -> Result<()> {
        if self.api_url.is_empty() {
            return Err(HashDbError::InvalidSettings(
                "api_url cannot be empty".to_string(),
            ));
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(HashDbError::InvalidSettings(format!(
                "api_url must be an http(s) URL: {}",
                self.api_url
            )));
        }
        if self.enum_prefix.is_empty() {
            return Err(HashDbError::InvalidSettings(
                "enum_prefix cannot be empty".to_string(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(HashDbError::InvalidSettings(
                "request_timeout cannot be 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(
            self.api_url.clone(),
            std::time::Duration::from_secs(self.request_timeout_seconds),
        )
    }

    /// Value to send to the server for a value read from the binary.
    pub fn query_value(&self, value: u64) -> u64 {
        if self.xor_enabled {
            value ^ self.xor_value
        } else {
            value
        }
    }

    /// Human readable timeout, e.g. "15 seconds".
    pub fn timeout_description(&self) -> String {
        format!(
            "{} second{}",
            self.request_timeout_seconds,
            if self.request_timeout_seconds == 1 { "" } else { "s" }
        )
    }

    /// Build the persisted record for `scope`.
    pub fn to_record(&self, scope: SettingsScope) -> SettingsRecord {
        let local = scope == SettingsScope::Local;
        SettingsRecord {
            api_url: self.api_url.clone(),
            enum_prefix: self.enum_prefix.clone(),
            request_timeout: self.request_timeout_seconds,
            algorithm: if local {
                self.selected_algorithm.as_ref().map(Algorithm::to_json)
            } else {
                None
            },
            use_xor: local.then_some(self.xor_enabled),
            xor_value: local.then_some(self.xor_value),
        }
    }

    /// Overlay a persisted record on top of these settings.
    ///
    /// Fields the record does not carry are left untouched.
    pub fn apply_record(&mut self, record: &SettingsRecord) -> Result<()> {
        let algorithm = match &record.algorithm {
            Some(Value::Null) | None => None,
            Some(json) => Some(parse_algorithm(json).map_err(|e| {
                HashDbError::InvalidSettings(format!("invalid saved algorithm: {}", e))
            })?),
        };

        let mut next = self.clone();
        next.api_url = record.api_url.clone();
        next.enum_prefix = record.enum_prefix.clone();
        next.request_timeout_seconds = record.request_timeout;
        if algorithm.is_some() {
            next.selected_algorithm = algorithm;
        }
        if let Some(use_xor) = record.use_xor {
            next.xor_enabled = use_xor;
        }
        if let Some(xor_value) = record.xor_value {
            next.xor_value = xor_value;
        }

        next.validate()?;
        *self = next;
        Ok(())
    }
}

/// Where a settings record is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsScope {
    /// Tied to the current project; carries the algorithm and XOR key.
    Local,
    /// Shared across projects; never carries the algorithm.
    Global,
}

/// Persisted settings layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsRecord {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_enum_prefix")]
    pub enum_prefix: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// `{algorithm, description, type}` or null.
    #[serde(default)]
    pub algorithm: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_xor: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xor_value: Option<u64>,
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Settings::default().to_record(SettingsScope::Global)
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_enum_prefix() -> String {
    DEFAULT_ENUM_PREFIX.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn crc32() -> Algorithm {
        Algorithm {
            name: "crc32".to_string(),
            description: "Standard crc32 hash.".to_string(),
            size_bits: 32,
        }
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.api_url, "https://hashdb.openanalysis.net");
        assert_eq!(settings.enum_prefix, "hashdb_strings");
        assert_eq!(settings.request_timeout_seconds, 15);
        assert!(settings.selected_algorithm.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            Settings {
                api_url: String::new(),
                ..Default::default()
            },
            Settings {
                api_url: "ftp://hashdb".to_string(),
                ..Default::default()
            },
            Settings {
                enum_prefix: String::new(),
                ..Default::default()
            },
            Settings {
                request_timeout_seconds: 0,
                ..Default::default()
            },
        ];
        for settings in cases {
            assert!(matches!(
                settings.validate(),
                Err(HashDbError::InvalidSettings(_))
            ));
        }
    }

    #[test]
    fn test_query_value_applies_xor() {
        let mut settings = Settings::default();
        assert_eq!(settings.query_value(0x1234), 0x1234);
        settings.xor_enabled = true;
        settings.xor_value = 0xff;
        assert_eq!(settings.query_value(0x1234), 0x12cb);
    }

    #[test]
    fn test_global_record_omits_algorithm() {
        let settings = Settings {
            selected_algorithm: Some(crc32()),
            xor_enabled: true,
            xor_value: 7,
            ..Default::default()
        };

        let global = serde_json::to_value(settings.to_record(SettingsScope::Global)).unwrap();
        assert_eq!(global["algorithm"], Value::Null);
        assert!(global.get("use_xor").is_none());

        let local = serde_json::to_value(settings.to_record(SettingsScope::Local)).unwrap();
        assert_eq!(
            local["algorithm"],
            json!({"algorithm": "crc32", "description": "Standard crc32 hash.", "type": "unsigned_int"})
        );
        assert_eq!(local["request_timeout"], json!(15));
        assert_eq!(local["use_xor"], json!(true));
    }

    #[test]
    fn test_apply_record_round_trip() {
        let original = Settings {
            api_url: "http://localhost:8000".to_string(),
            request_timeout_seconds: 3,
            selected_algorithm: Some(crc32()),
            ..Default::default()
        };
        let record = original.to_record(SettingsScope::Local);

        let mut restored = Settings::default();
        restored.apply_record(&record).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_apply_record_rejects_unknown_algorithm_type() {
        let record = SettingsRecord {
            algorithm: Some(json!({"algorithm": "x", "description": "y", "type": "unsigned_float"})),
            ..Default::default()
        };
        let mut settings = Settings::default();
        assert!(matches!(
            settings.apply_record(&record),
            Err(HashDbError::InvalidSettings(_))
        ));
        assert_eq!(settings, Settings::default());
    }
}

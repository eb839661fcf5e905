use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use super::types::{Settings, SettingsRecord, SettingsScope};
use crate::error::{HashDbError, Result};

/// Load/save interface for persisted settings.
pub trait SettingsStore: Send + Sync {
    /// Load the record for `scope`, or `None` if nothing was saved there.
    fn load(&self, scope: SettingsScope) -> Result<Option<SettingsRecord>>;

    /// Persist `record` in `scope`.
    fn save(&self, record: &SettingsRecord, scope: SettingsScope) -> Result<()>;
}

/// Build session settings: defaults, then global, then local.
pub fn load_settings(store: &dyn SettingsStore) -> Result<Settings> {
    let mut settings = Settings::default();

    for scope in [SettingsScope::Global, SettingsScope::Local] {
        if let Some(record) = store.load(scope)? {
            settings.apply_record(&record)?;
            debug!("Applied {:?} settings record", scope);
        }
    }

    Ok(settings)
}

/// Persist `settings` in `scope`.
pub fn save_settings(store: &dyn SettingsStore, settings: &Settings, scope: SettingsScope) -> Result<()> {
    settings.validate()?;
    store.save(&settings.to_record(scope), scope)?;
    info!("Settings saved ({:?})", scope);
    Ok(())
}

/// Prefix of the environment variables that override file settings.
pub const ENV_PREFIX: &str = "HASHDB_";

/// Load a settings record from a file with `HASHDB_` environment overrides.
///
/// `.toml` files are read as TOML, anything else as JSON.
pub fn load_record_from_file(path: &Path) -> Result<SettingsRecord> {
    if !path.exists() {
        return Err(HashDbError::InvalidSettings(format!(
            "settings file not found: {}",
            path.display()
        )));
    }

    extract_record(record_figment(path, ENV_PREFIX))
}

/// Defaults, then the file at `path` if there is one, then the environment.
fn record_figment(path: &Path, env_prefix: &str) -> Figment {
    let figment = Figment::from(Serialized::defaults(SettingsRecord::default()));
    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => figment.merge(Toml::file(path)),
        _ => figment.merge(Json::file(path)),
    };

    figment.merge(Env::prefixed(env_prefix).only(&["api_url", "enum_prefix", "request_timeout"]))
}

fn extract_record(figment: Figment) -> Result<SettingsRecord> {
    figment
        .extract()
        .map_err(|e| HashDbError::InvalidSettings(e.to_string()))
}

/// Load a settings record from a JSON string.
pub fn load_record_from_str(json: &str) -> Result<SettingsRecord> {
    serde_json::from_str(json).map_err(|e| HashDbError::InvalidSettings(e.to_string()))
}

/// Stores the global record and an optional project-local record as files.
///
/// The global record always layers the environment over defaults, so
/// `HASHDB_API_URL` works before any global file has been written.
pub struct FileSettingsStore {
    global_path: PathBuf,
    local_path: Option<PathBuf>,
    env_prefix: String,
}

impl FileSettingsStore {
    pub fn new(global_path: impl Into<PathBuf>, local_path: Option<PathBuf>) -> Self {
        Self {
            global_path: global_path.into(),
            local_path,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Read overrides from `<prefix>API_URL` and friends instead of `HASHDB_*`.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    fn path(&self, scope: SettingsScope) -> Option<&Path> {
        match scope {
            SettingsScope::Global => Some(self.global_path.as_path()),
            SettingsScope::Local => self.local_path.as_deref(),
        }
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self, scope: SettingsScope) -> Result<Option<SettingsRecord>> {
        match scope {
            SettingsScope::Global => {
                extract_record(record_figment(&self.global_path, &self.env_prefix)).map(Some)
            }
            SettingsScope::Local => match self.local_path.as_deref() {
                Some(path) if path.exists() => {
                    extract_record(record_figment(path, &self.env_prefix)).map(Some)
                }
                _ => Ok(None),
            },
        }
    }

    fn save(&self, record: &SettingsRecord, scope: SettingsScope) -> Result<()> {
        let path = self.path(scope).ok_or_else(|| {
            HashDbError::HostOperationFailed("no project settings path configured".to_string())
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                HashDbError::HostOperationFailed(format!("{}: {}", parent.display(), e))
            })?;
        }

        let body = serde_json::to_string_pretty(record)
            .map_err(|e| HashDbError::InvalidSettings(e.to_string()))?;
        std::fs::write(path, body)
            .map_err(|e| HashDbError::HostOperationFailed(format!("{}: {}", path.display(), e)))
    }
}

/// In-memory store; handy for hosts that keep settings in their own database.
#[derive(Default)]
pub struct MemorySettingsStore {
    local: Mutex<Option<SettingsRecord>>,
    global: Mutex<Option<SettingsRecord>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, scope: SettingsScope) -> &Mutex<Option<SettingsRecord>> {
        match scope {
            SettingsScope::Local => &self.local,
            SettingsScope::Global => &self.global,
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self, scope: SettingsScope) -> Result<Option<SettingsRecord>> {
        let slot = self
            .slot(scope)
            .lock()
            .map_err(|_| HashDbError::HostOperationFailed("settings store poisoned".to_string()))?;
        Ok(slot.clone())
    }

    fn save(&self, record: &SettingsRecord, scope: SettingsScope) -> Result<()> {
        let mut slot = self
            .slot(scope)
            .lock()
            .map_err(|_| HashDbError::HostOperationFailed("settings store poisoned".to_string()))?;
        *slot = Some(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Algorithm;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn crc32() -> Algorithm {
        Algorithm {
            name: "crc32".to_string(),
            description: "Standard crc32 hash.".to_string(),
            size_bits: 32,
        }
    }

    #[test]
    fn test_load_record_file_not_found() {
        let result = load_record_from_file(Path::new("/nonexistent/settings.json"));
        assert!(matches!(result, Err(HashDbError::InvalidSettings(_))));
    }

    #[test]
    fn test_load_record_from_json_file() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(
            temp_file,
            r#"{{"api_url": "http://127.0.0.1:9000", "enum_prefix": "hashes", "request_timeout": 5, "algorithm": null}}"#
        )
        .unwrap();

        let record = load_record_from_file(temp_file.path()).unwrap();
        assert_eq!(record.api_url, "http://127.0.0.1:9000");
        assert_eq!(record.enum_prefix, "hashes");
        assert_eq!(record.request_timeout, 5);
        assert!(record.algorithm.is_none());
    }

    #[test]
    fn test_load_record_from_toml_file_with_defaults() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(temp_file, "enum_prefix = \"malware_hashes\"").unwrap();

        let record = load_record_from_file(temp_file.path()).unwrap();
        assert_eq!(record.enum_prefix, "malware_hashes");
        assert_eq!(record.api_url, "https://hashdb.openanalysis.net");
        assert_eq!(record.request_timeout, 15);
    }

    #[test]
    fn test_load_record_from_str_invalid() {
        assert!(matches!(
            load_record_from_str("{not json"),
            Err(HashDbError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_local_overrides_global() {
        let store = MemorySettingsStore::new();
        let global = Settings {
            enum_prefix: "global_prefix".to_string(),
            request_timeout_seconds: 30,
            ..Default::default()
        };
        let local = Settings {
            enum_prefix: "local_prefix".to_string(),
            selected_algorithm: Some(crc32()),
            ..Default::default()
        };
        save_settings(&store, &global, SettingsScope::Global).unwrap();
        save_settings(&store, &local, SettingsScope::Local).unwrap();

        let settings = load_settings(&store).unwrap();
        assert_eq!(settings.enum_prefix, "local_prefix");
        assert_eq!(settings.request_timeout_seconds, 15);
        assert_eq!(settings.selected_algorithm, Some(crc32()));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileSettingsStore::new(
            dir.path().join("global/settings.json"),
            Some(dir.path().join("project.hashdb.json")),
        );

        assert!(store.load(SettingsScope::Local).unwrap().is_none());
        let global = store.load(SettingsScope::Global).unwrap().unwrap();
        assert_eq!(global.enum_prefix, "hashdb_strings");
        assert!(global.algorithm.is_none());

        let settings = Settings {
            selected_algorithm: Some(crc32()),
            xor_enabled: true,
            xor_value: 0x1f,
            ..Default::default()
        };
        save_settings(&store, &settings, SettingsScope::Global).unwrap();
        save_settings(&store, &settings, SettingsScope::Local).unwrap();

        let global = store.load(SettingsScope::Global).unwrap().unwrap();
        assert!(global.algorithm.is_none());

        let loaded = load_settings(&store).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_env_overrides_apply_without_global_file() {
        // Variable names unique to this test so parallel tests never see them
        std::env::set_var("HASHDB_NO_FILE_TEST_API_URL", "http://127.0.0.1:9999");
        std::env::set_var("HASHDB_NO_FILE_TEST_REQUEST_TIMEOUT", "42");

        let dir = TempDir::new().unwrap();
        let store = FileSettingsStore::new(dir.path().join("missing.json"), None)
            .with_env_prefix("HASHDB_NO_FILE_TEST_");
        let settings = load_settings(&store).unwrap();

        std::env::remove_var("HASHDB_NO_FILE_TEST_API_URL");
        std::env::remove_var("HASHDB_NO_FILE_TEST_REQUEST_TIMEOUT");

        assert_eq!(settings.api_url, "http://127.0.0.1:9999");
        assert_eq!(settings.request_timeout_seconds, 42);
        assert_eq!(settings.enum_prefix, "hashdb_strings");
        assert!(!dir.path().join("missing.json").exists());
    }

    #[test]
    fn test_env_overrides_global_file() {
        std::env::set_var("HASHDB_FILE_TEST_ENUM_PREFIX", "from_env");

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "enum_prefix = \"from_file\"\nrequest_timeout = 7\n").unwrap();
        let store = FileSettingsStore::new(path, None).with_env_prefix("HASHDB_FILE_TEST_");
        let settings = load_settings(&store).unwrap();

        std::env::remove_var("HASHDB_FILE_TEST_ENUM_PREFIX");

        assert_eq!(settings.enum_prefix, "from_env");
        assert_eq!(settings.request_timeout_seconds, 7);
    }

    #[test]
    fn test_file_store_without_local_path() {
        let dir = TempDir::new().unwrap();
        let store = FileSettingsStore::new(dir.path().join("settings.json"), None);
        let result = save_settings(&store, &Settings::default(), SettingsScope::Local);
        assert!(matches!(result, Err(HashDbError::HostOperationFailed(_))));
    }
}

use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::api::{Algorithm, HashDbApi};
use crate::config::Settings;
use crate::error::{HashDbError, Result};
use crate::host::{EnumValue, Host};
use crate::naming::{add_enum_value, MemberOutcome};
use crate::ui::UiDispatcher;

/// Everything a background task needs, with settings snapshotted at start.
pub(crate) struct TaskContext {
    pub api: Arc<dyn HashDbApi>,
    pub ui: UiDispatcher,
    pub shared_settings: Arc<RwLock<Settings>>,
    pub settings: Settings,
}

impl TaskContext {
    /// The selected algorithm, asking for settings first if there is none.
    ///
    /// `Ok(None)` means the user cancelled the settings prompt.
    pub async fn ensure_algorithm(&mut self) -> Result<Option<Algorithm>> {
        if let Some(algorithm) = &self.settings.selected_algorithm {
            return Ok(Some(algorithm.clone()));
        }

        self.ui
            .message("Please select a hash algorithm before using HashDB.");
        match self.prompt_settings().await? {
            Some(settings) => match settings.selected_algorithm {
                Some(algorithm) => Ok(Some(algorithm)),
                None => Err(HashDbError::InvalidSettings(
                    "no hash algorithm selected".to_string(),
                )),
            },
            None => Ok(None),
        }
    }

    /// Fetch algorithms, show the settings prompt and store the result.
    pub async fn prompt_settings(&mut self) -> Result<Option<Settings>> {
        let endpoint = self.settings.endpoint();
        let algorithms = self.api.fetch_algorithms(&endpoint).await?;

        let current = self.settings.clone();
        let chosen = self
            .ui
            .call(move |host| host.prompt_settings(&current, &algorithms))
            .await?;

        let Some(settings) = chosen else {
            self.ui.message("HashDB configuration cancelled!");
            return Ok(None);
        };

        settings.validate()?;
        {
            let mut shared = self
                .shared_settings
                .write()
                .unwrap_or_else(|e| e.into_inner());
            *shared = settings.clone();
        }
        self.settings = settings.clone();

        info!(
            api_url = %settings.api_url,
            algorithm = ?settings.selected_algorithm.as_ref().map(|a| a.name.as_str()),
            xor = settings.xor_enabled,
            "HashDB configured"
        );
        self.ui.message(configured_message(&settings));
        Ok(Some(settings))
    }

    /// Make `algorithm` the session's algorithm for the next task.
    pub fn select_algorithm(&mut self, algorithm: Algorithm) {
        let mut shared = self
            .shared_settings
            .write()
            .unwrap_or_else(|e| e.into_inner());
        shared.selected_algorithm = Some(algorithm.clone());
        self.settings.selected_algorithm = Some(algorithm);
    }

    /// Name and width of the namespace values for `algorithm` go into.
    pub fn namespace_for(&self, algorithm: &Algorithm) -> (String, u8) {
        let width = if algorithm.size_bits == 64 { 8 } else { 4 };
        (
            format!("{}_{}", self.settings.enum_prefix, algorithm.name),
            width,
        )
    }
}

fn configured_message(settings: &Settings) -> String {
    let (name, bits) = settings
        .selected_algorithm
        .as_ref()
        .map(|a| (a.name.as_str(), a.size_bits))
        .unwrap_or(("none", 0));
    format!(
        "HashDB configured successfully!\n\
         HASHDB_API_URL:        {}\n\
         HASHDB_USE_XOR:        {}\n\
         HASHDB_XOR_VALUE:      {:#x}\n\
         HASHDB_ALGORITHM:      {}\n\
         HASHDB_ALGORITHM_SIZE: {}",
        settings.api_url, settings.xor_enabled, settings.xor_value, name, bits
    )
}

/// Insert `value` into the namespace and, given an address, label it there.
///
/// Runs on the UI thread.
pub(crate) fn apply_enum_value(
    host: &mut dyn Host,
    namespace: &str,
    width: u8,
    address: Option<u64>,
    value: &EnumValue,
) -> Result<MemberOutcome> {
    let handle = host.create_or_find_namespace(namespace, width)?;
    let outcome = add_enum_value(host, &handle, value)?;

    match (&outcome, address) {
        (MemberOutcome::Inserted { name }, Some(address)) => {
            let applied = EnumValue {
                name: name.clone(),
                ..value.clone()
            };
            host.apply_label(&handle, address, &applied, width)?;
        }
        (MemberOutcome::Abandoned { name }, _) => {
            warn!("Could not add {} to {}", name, namespace);
        }
        _ => {}
    }

    Ok(outcome)
}

//! Reduces the candidates returned for one hash value to a single decision.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::api::Hash;
use crate::error::{HashDbError, Result};
use crate::host::EnumValue;

/// Label used when the matching string is empty.
pub const EMPTY_STRING_LABEL: &str = "empty_string";

/// Asks the user to pick one of several display keys.
#[async_trait]
pub trait Disambiguator: Send + Sync {
    /// `Ok(None)` means the user declined to pick.
    async fn choose(&self, options: Vec<String>) -> Result<Option<String>>;
}

/// Follow-up offered when the chosen hash names an API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleImport {
    pub api_name: String,
    pub modules: Vec<String>,
    pub permutation: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHash {
    pub enum_value: EnumValue,
    pub module_import: Option<ModuleImport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Chosen(ResolvedHash),
    /// The user declined the disambiguation prompt.
    Cancelled,
    /// The server returned no candidates.
    NoMatch,
}

/// The name a candidate is shown and labelled under.
pub fn display_key(hash: &Hash) -> String {
    let key = match (&hash.api_name, hash.is_api) {
        (Some(api_name), true) => api_name.as_str(),
        _ => hash.string.as_str(),
    };
    if key.is_empty() {
        EMPTY_STRING_LABEL.to_string()
    } else {
        key.to_string()
    }
}

/// Candidates keyed by display key, first occurrence wins.
pub fn distinct_candidates(candidates: &[Hash]) -> Vec<(String, &Hash)> {
    let mut distinct: Vec<(String, &Hash)> = Vec::with_capacity(candidates.len());
    for hash in candidates {
        let key = display_key(hash);
        if !distinct.iter().any(|(existing, _)| *existing == key) {
            distinct.push((key, hash));
        }
    }
    distinct
}

/// Turn the chosen hash into the value handed to the host.
///
/// `value` is the value as it appears in the binary, not the XOR'd query.
pub fn finalize(hash: &Hash, value: u64, algorithm: &str) -> ResolvedHash {
    let name = display_key(hash);
    let module_import = match (&hash.permutation_type, hash.is_api) {
        (Some(permutation), true) if !hash.modules.is_empty() => Some(ModuleImport {
            api_name: name.clone(),
            modules: hash.modules.clone(),
            permutation: permutation.clone(),
            algorithm: algorithm.to_string(),
        }),
        _ => None,
    };

    ResolvedHash {
        enum_value: EnumValue {
            name,
            value,
            is_api: hash.is_api,
        },
        module_import,
    }
}

/// Pick one candidate, prompting only when there is more than one.
pub async fn resolve(
    candidates: &[Hash],
    value: u64,
    algorithm: &str,
    disambiguator: &dyn Disambiguator,
) -> Result<Resolution> {
    let chosen = match candidates {
        [] => return Ok(Resolution::NoMatch),
        [only] => only,
        many => {
            let distinct = distinct_candidates(many);
            let options: Vec<String> = distinct.iter().map(|(key, _)| key.clone()).collect();
            debug!(
                candidates = many.len(),
                options = options.len(),
                "Hash collision, asking for a choice"
            );

            let Some(selected) = disambiguator.choose(options).await? else {
                info!("Hash selection cancelled for {:#x}", value);
                return Ok(Resolution::Cancelled);
            };

            distinct
                .into_iter()
                .find(|(key, _)| *key == selected)
                .map(|(_, hash)| hash)
                .ok_or_else(|| {
                    HashDbError::HostOperationFailed(format!(
                        "selection {:?} is not one of the offered matches",
                        selected
                    ))
                })?
        }
    };

    let resolved = finalize(chosen, value, algorithm);
    info!("Hash match found: {}", resolved.enum_value.name);
    Ok(Resolution::Chosen(resolved))
}

use tracing::{info, warn};

use crate::error::Result;
use crate::host::{EnumValue, HighlightedValue, Host};
use crate::naming::{add_enum_value, MemberOutcome};
use crate::resolver::{resolve, ModuleImport, Resolution};

use super::context::{apply_enum_value, TaskContext};
use super::{LookupOutcome, ModuleImportResult};

/// Look up one highlighted value and apply the chosen name.
pub(crate) async fn run(mut ctx: TaskContext, input: HighlightedValue) -> Result<LookupOutcome> {
    let Some(algorithm) = ctx.ensure_algorithm().await? else {
        return Ok(LookupOutcome::Cancelled);
    };

    let endpoint = ctx.settings.endpoint();
    let query = ctx.settings.query_value(input.value);
    ctx.ui.message(format!("HashDB: Found hash value: {:#x}", input.value));

    let candidates = ctx.api.lookup_hash(&endpoint, &algorithm.name, query).await?;
    if candidates.is_empty() {
        ctx.ui
            .message(format!("HashDB: No hash found for {:#x}", input.value));
        return Ok(LookupOutcome::NoMatch);
    }

    let resolved = match resolve(&candidates, input.value, &algorithm.name, &ctx.ui).await? {
        Resolution::Chosen(resolved) => resolved,
        Resolution::Cancelled => return Ok(LookupOutcome::Cancelled),
        Resolution::NoMatch => return Ok(LookupOutcome::NoMatch),
    };
    ctx.ui.message(format!(
        "HashDB: Hash match found: {}",
        resolved.enum_value.name
    ));

    let (namespace, width) = ctx.namespace_for(&algorithm);
    let member = {
        let namespace = namespace.clone();
        let value = resolved.enum_value.clone();
        ctx.ui
            .call(move |host| apply_enum_value(host, &namespace, width, input.address, &value))
            .await??
    };

    let module_import = match (&member, resolved.module_import) {
        (MemberOutcome::Inserted { .. }, Some(offer)) => {
            import_module(&ctx, offer, namespace, width).await?
        }
        _ => None,
    };

    Ok(LookupOutcome::Applied {
        value: resolved.enum_value,
        member,
        module_import,
    })
}

/// Offer the module import and, if accepted, add every hash of the module.
///
/// A failed module fetch is reported in the result rather than failing the lookup.
async fn import_module(
    ctx: &TaskContext,
    offer: ModuleImport,
    namespace: String,
    width: u8,
) -> Result<Option<ModuleImportResult>> {
    let module = {
        let api_name = offer.api_name.clone();
        let modules = offer.modules.clone();
        ctx.ui
            .call(move |host| host.prompt_module_import(&api_name, &modules))
            .await?
    };
    let Some(module) = module else {
        return Ok(None);
    };

    let endpoint = ctx.settings.endpoint();
    let hashes = match ctx
        .api
        .fetch_module_hashes(&endpoint, &module, &offer.algorithm, &offer.permutation)
        .await
    {
        Ok(hashes) => hashes,
        Err(e) => {
            warn!("Module hashes request for {} failed: {}", module, e);
            ctx.ui
                .message(format!("ERROR: HashDB module hashes request failed: {}", e));
            return Ok(Some(ModuleImportResult::Failed {
                module,
                error: e.to_string(),
            }));
        }
    };

    let values: Vec<EnumValue> = hashes
        .into_iter()
        .map(|hash| EnumValue {
            name: hash.api_name.unwrap_or(hash.string),
            value: ctx.settings.query_value(hash.value),
            is_api: true,
        })
        .collect();

    let count = ctx
        .ui
        .call(move |host| insert_all(host, &namespace, width, &values))
        .await??;

    info!("Added {} hashes for module {}", count, module);
    ctx.ui
        .message(format!("HashDB: Added {} hashes for module {}", count, module));
    Ok(Some(ModuleImportResult::Imported { module, count }))
}

fn insert_all(host: &mut dyn Host, namespace: &str, width: u8, values: &[EnumValue]) -> Result<usize> {
    let handle = host.create_or_find_namespace(namespace, width)?;
    let mut count = 0;
    for value in values {
        if add_enum_value(host, &handle, value)?.inserted_name().is_some() {
            count += 1;
        }
    }
    Ok(count)
}

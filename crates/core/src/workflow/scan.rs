use tracing::{debug, info};

use crate::error::Result;
use crate::host::{EnumValue, Host};
use crate::naming::{add_enum_value, MemberOutcome};
use crate::resolver::{resolve, Resolution};

use super::context::TaskContext;
use super::{ScanEntry, ScanReport};

/// Scan `[start, end)` for hash values, look all of them up, then apply the
/// results in address order.
pub(crate) async fn run(mut ctx: TaskContext, range: (u64, u64), convert: bool) -> Result<ScanReport> {
    let Some(algorithm) = ctx.ensure_algorithm().await? else {
        return Ok(ScanReport {
            cancelled: true,
            ..Default::default()
        });
    };

    let (start, end) = range;
    let algorithm_width = algorithm.size_bytes();
    let values = ctx
        .ui
        .call(move |host| read_values(host, start, end, algorithm_width))
        .await??;
    for (index, (address, value, width)) in values.iter().enumerate() {
        ctx.ui.message(format!(
            "HashDB: [{}] Found hash value {:#x} ({} bytes) at {:#x}",
            index + 1,
            value,
            width,
            address
        ));
    }

    // Every request completes before anything is applied; one failure fails the batch.
    let endpoint = ctx.settings.endpoint();
    let mut lookups = Vec::with_capacity(values.len());
    for (address, value, width) in values {
        let query = ctx.settings.query_value(value);
        let candidates = ctx.api.lookup_hash(&endpoint, &algorithm.name, query).await?;
        debug!(address, value, matches = candidates.len(), "Scanned value looked up");
        lookups.push((address, value, width, candidates));
    }

    let (namespace, namespace_width) = ctx.namespace_for(&algorithm);
    let mut report = ScanReport::default();

    for (address, value, width, candidates) in lookups {
        match resolve(&candidates, value, &algorithm.name, &ctx.ui).await? {
            Resolution::NoMatch => {
                ctx.ui.message(format!(
                    "HashDB: Couldn't find any matches for hash value {:#x} ({} bytes) at {:#x}",
                    value, width, address
                ));
                report.unmatched.push(address);
            }
            Resolution::Cancelled => {
                info!("Scan cancelled at {:#x}", address);
                report.cancelled = true;
                break;
            }
            Resolution::Chosen(resolved) => {
                let namespace = namespace.clone();
                let entry = ctx
                    .ui
                    .call(move |host| {
                        apply_entry(
                            host,
                            &namespace,
                            namespace_width,
                            address,
                            width,
                            resolved.enum_value,
                            convert,
                        )
                    })
                    .await??;
                report.applied.push(entry);
            }
        }
    }

    info!(
        applied = report.applied.len(),
        unmatched = report.unmatched.len(),
        cancelled = report.cancelled,
        "Scan finished"
    );
    Ok(report)
}

/// Read consecutive values that fit entirely inside the range.
///
/// Each address is read at the width the host guesses for it when that is
/// narrower than the algorithm, else at the algorithm width.
fn read_values(
    host: &mut dyn Host,
    start: u64,
    end: u64,
    algorithm_width: u8,
) -> Result<Vec<(u64, u64, u8)>> {
    let mut values = Vec::new();
    let mut address = start;
    loop {
        let width = match host.guess_type_width(address) {
            Some(guess) if guess > 0 && guess < algorithm_width => guess,
            _ => algorithm_width,
        };
        let Some(next) = address
            .checked_add(u64::from(width.max(1)))
            .filter(|next| *next <= end)
        else {
            break;
        };
        values.push((address, host.read_integer(address, width)?, width));
        address = next;
    }
    Ok(values)
}

fn apply_entry(
    host: &mut dyn Host,
    namespace: &str,
    namespace_width: u8,
    address: u64,
    width: u8,
    value: EnumValue,
    convert: bool,
) -> Result<ScanEntry> {
    let handle = host.create_or_find_namespace(namespace, namespace_width)?;
    let member = add_enum_value(host, &handle, &value)?;

    let mut label = None;
    if let (true, MemberOutcome::Inserted { name }) = (convert, &member) {
        host.convert_storage(address, width)?;
        let applied = EnumValue {
            name: name.clone(),
            ..value.clone()
        };
        host.apply_label(&handle, address, &applied, width)?;

        let free = free_label(host, &format!("ptr_{}", name));
        host.set_name(address, &free)?;
        label = Some(free);
    }

    Ok(ScanEntry {
        address,
        width,
        value,
        member,
        label,
    })
}

/// `base`, or `base_1`, `base_2`, … whichever is free first.
fn free_label(host: &mut dyn Host, base: &str) -> String {
    let mut candidate = base.to_string();
    let mut index = 1;
    while host.name_exists(&candidate) {
        candidate = format!("{}_{}", base, index);
        index += 1;
    }
    candidate
}

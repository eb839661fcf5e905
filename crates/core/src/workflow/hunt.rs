use std::cmp::Ordering;

use tracing::info;

use crate::api::{Algorithm, Hit};
use crate::error::{HashDbError, Result};
use crate::host::{HighlightedValue, HuntCandidate};

use super::context::TaskContext;
use super::HuntOutcome;

/// Ask the server which algorithms produce the value and let the user pick one.
pub(crate) async fn run(mut ctx: TaskContext, input: HighlightedValue) -> Result<HuntOutcome> {
    let endpoint = ctx.settings.endpoint();
    let query = ctx.settings.query_value(input.value);

    let hits = ctx.api.hunt(&endpoint, query).await?;
    if hits.is_empty() {
        ctx.ui
            .message("HashDB: Couldn't find any algorithms that match the provided hash.");
        return Ok(HuntOutcome::NoCandidates);
    }

    // Hits carry no width, so the algorithm list is fetched again to recover it.
    let algorithms = ctx.api.fetch_algorithms(&endpoint).await?;
    let candidates = rank_candidates(&hits, &algorithms);
    if candidates.is_empty() {
        ctx.ui
            .message("HashDB: Couldn't find any algorithms that match the provided hash.");
        return Ok(HuntOutcome::NoCandidates);
    }

    let offered = candidates.clone();
    let selection = ctx
        .ui
        .call(move |host| host.prompt_hunt_selection(&offered))
        .await?;
    let Some(index) = selection else {
        return Ok(HuntOutcome::Cancelled);
    };

    let algorithm = candidates
        .get(index)
        .map(|candidate| candidate.algorithm.clone())
        .ok_or_else(|| {
            HashDbError::HostOperationFailed(format!("hunt selection {} is out of range", index))
        })?;

    ctx.select_algorithm(algorithm.clone());
    info!("Hunt selected algorithm {}", algorithm.name);
    ctx.ui.message(format!(
        "HashDB: Selected algorithm {} ({} bits)",
        algorithm.name, algorithm.size_bits
    ));
    Ok(HuntOutcome::Selected(algorithm))
}

/// Known algorithms among `hits`, best hit rate first, then highest count.
pub fn rank_candidates(hits: &[Hit], algorithms: &[Algorithm]) -> Vec<HuntCandidate> {
    let mut candidates: Vec<HuntCandidate> = Vec::new();
    for hit in hits {
        if candidates
            .iter()
            .any(|c| c.algorithm.name == hit.algorithm_name)
        {
            continue;
        }
        if let Some(algorithm) = algorithms.iter().find(|a| a.name == hit.algorithm_name) {
            candidates.push(HuntCandidate {
                algorithm: algorithm.clone(),
                count: hit.count,
                hitrate: hit.hitrate,
            });
        }
    }

    candidates.sort_by(|a, b| {
        b.hitrate
            .partial_cmp(&a.hitrate)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.count.cmp(&a.count))
    });
    candidates
}

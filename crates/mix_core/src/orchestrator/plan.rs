//! Plan resolution: from contracts plus an enabled set to an ordered,
//! dependency-validated stage sequence.

use std::collections::BTreeSet;

use crate::contracts::{Contract, ContractRegistry};

use super::errors::{PipelineError, PipelineResult};

/// Resolve the plan for a job.
///
/// Starts from the registry's default order and filters by
/// `enabled_stage_ids` (everything when `None`, nothing when `Some([])`).
/// Fails with [`PipelineError::UnknownStage`] for an enabled id that is
/// not declared, and with [`PipelineError::InvalidPlan`] when a retained
/// stage's dependency is not retained.
pub fn resolve_plan<'a>(
    registry: &'a ContractRegistry,
    enabled_stage_ids: Option<&[String]>,
) -> PipelineResult<Vec<&'a Contract>> {
    let plan: Vec<&Contract> = match enabled_stage_ids {
        None => registry.all_in_order(),
        Some(enabled) => {
            for id in enabled {
                if registry.get(id).is_none() {
                    return Err(PipelineError::unknown_stage(id));
                }
            }
            let enabled: BTreeSet<&str> = enabled.iter().map(String::as_str).collect();
            registry
                .all_in_order()
                .into_iter()
                .filter(|c| enabled.contains(c.id.as_str()))
                .collect()
        }
    };

    let retained: BTreeSet<&str> = plan.iter().map(|c| c.id.as_str()).collect();
    for contract in &plan {
        for dep in &contract.depends_on {
            if !retained.contains(dep.as_str()) {
                return Err(PipelineError::invalid_plan(&contract.id, dep));
            }
        }
    }

    Ok(plan)
}

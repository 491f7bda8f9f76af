// Snowcap: Synthesizing Network-Wide Configuration Updates
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Turns a [`crate::pcs::WorkflowMap`] into hop-to-hop and aggregate-to-aggregate dependency
//! edges over a [`Registry`], deriving `import_from` along the way. Cycles surface as
//! [`crate::error::Error::DependencyCycle`] before any aggregate is contacted.

use crate::error::Error;
use crate::model::registry::ForwardedAggregateState;
use crate::model::{HopIdx, Registry};
use crate::pcs::{WorkflowDependency, WorkflowMap};
use crate::vlan::TagSet;
use std::collections::BTreeMap;

/// Ingest a workflow map into `registry`, creating aggregates/hops as needed and wiring up both
/// hop-level and aggregate-level dependency edges. `forwarded` carries state across outer-loop
/// cycles, keyed by aggregate URN (section 3, "Lifecycles").
pub fn ingest(
    registry: &mut Registry,
    workflow: &WorkflowMap,
    forwarded: &BTreeMap<String, ForwardedAggregateState>,
) -> Result<(), Error> {
    for (path_id, deps) in workflow {
        let path_idx = registry.get_or_create_path(path_id);
        for dep in deps {
            ingest_one(registry, path_idx, dep, None, forwarded)?;
        }
    }
    Ok(())
}

fn ingest_one(
    registry: &mut Registry,
    path_idx: crate::model::PathIdx,
    dep: &WorkflowDependency,
    parent_hop: Option<HopIdx>,
    forwarded: &BTreeMap<String, ForwardedAggregateState>,
) -> Result<HopIdx, Error> {
    let fwd = forwarded.get(&dep.aggregate_urn);
    let agg_idx = registry.get_or_create_aggregate(&dep.aggregate_urn, fwd);
    if !dep.aggregate_url.is_empty() && registry.aggregate(agg_idx).url.is_none() {
        registry.aggregate_mut(agg_idx).url = Some(dep.aggregate_url.clone());
    }
    let forwarded_unavailable = fwd.and_then(|f| f.hop_vlans_unavailable.get(&dep.hop_urn));
    let hop_idx = registry.add_hop(
        path_idx,
        agg_idx,
        &dep.hop_urn,
        TagSet::universe(),
        forwarded_unavailable,
    );

    let mut child_idxs = Vec::with_capacity(dep.dependencies.len());
    for child in &dep.dependencies {
        let child_idx = ingest_one(registry, path_idx, child, Some(hop_idx), forwarded)?;
        child_idxs.push(child_idx);
    }

    for &child_idx in &child_idxs {
        registry.add_hop_dependency(hop_idx, child_idx);
        let child_agg = registry.hop(child_idx).aggregate;
        if child_agg != agg_idx {
            registry.add_dependency(agg_idx, child_agg)?;
        }
    }

    if dep.import_vlans {
        let import_target = child_idxs
            .iter()
            .copied()
            .find(|&c| registry.hop(c).aggregate != agg_idx);
        if let Some(target) = import_target {
            registry.hop_mut(hop_idx).import_from = Some(target);
        }
    }

    if let Some(parent) = parent_hop {
        let _ = parent; // edges are recorded from the parent's side in the caller
    }

    Ok(hop_idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcs::WorkflowDependency;

    fn leaf(hop_urn: &str, agg_urn: &str, import: bool) -> WorkflowDependency {
        WorkflowDependency {
            hop_urn: hop_urn.to_string(),
            aggregate_url: format!("https://{}/", agg_urn),
            aggregate_urn: agg_urn.to_string(),
            import_vlans: import,
            dependencies: Vec::new(),
        }
    }

    #[test]
    fn two_hop_chain_sets_import_from_and_agg_dependency() {
        let mut reg = Registry::new();
        let b_hop = leaf("urn:hopB", "urn:aggB", false);
        let a_hop = WorkflowDependency {
            hop_urn: "urn:hopA".to_string(),
            aggregate_url: "https://aggA/".to_string(),
            aggregate_urn: "urn:aggA".to_string(),
            import_vlans: true,
            dependencies: vec![b_hop],
        };
        let mut workflow = WorkflowMap::new();
        workflow.insert("link1".to_string(), vec![a_hop]);
        ingest(&mut reg, &workflow, &BTreeMap::new()).unwrap();

        let agg_a = reg.find_aggregate("urn:aggA").unwrap();
        let agg_b = reg.find_aggregate("urn:aggB").unwrap();
        assert!(reg.aggregate(agg_a).depends_on.contains(&agg_b));

        let hop_a = reg.find_hop("link1", "urn:hopA").unwrap();
        let hop_b = reg.find_hop("link1", "urn:hopB").unwrap();
        assert_eq!(reg.hop(hop_a).import_from, Some(hop_b));
    }

    #[test]
    fn mutual_dependency_is_a_cycle() {
        let mut reg = Registry::new();
        let b_hop = WorkflowDependency {
            hop_urn: "urn:hopB".to_string(),
            aggregate_url: "https://aggB/".to_string(),
            aggregate_urn: "urn:aggB".to_string(),
            import_vlans: false,
            dependencies: vec![leaf("urn:hopA2", "urn:aggA", false)],
        };
        let a_hop = WorkflowDependency {
            hop_urn: "urn:hopA".to_string(),
            aggregate_url: "https://aggA/".to_string(),
            aggregate_urn: "urn:aggA".to_string(),
            import_vlans: false,
            dependencies: vec![b_hop],
        };
        let mut workflow = WorkflowMap::new();
        workflow.insert("link1".to_string(), vec![a_hop]);
        let err = ingest(&mut reg, &workflow, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::DependencyCycle(_)));
    }
}

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

//! The PCS driver: builds the routing-profile options from learned exclusions, invokes the
//! path-computation service, and hands back the expanded request plus workflow map. The wire
//! transport is out of scope; see [`PathComputationService`].

use crate::error::PcsError;
use crate::model::Registry;
use crate::vlan::TagSet;
use crate::xmldoc::XmlDoc;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::time::Duration;

/// One path's entry in the `geni_routing_profile` option.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathExclusions {
    /// Hops to omit entirely (bare URN) or whose listed tags must not be proposed
    /// (`"URN=<tagset>"`).
    pub hop_exclusion_list: Vec<String>,
    /// Hops that must be used.
    pub hop_inclusion_list: Vec<String>,
}

/// The full `geni_routing_profile` options object, keyed by path (link) id.
pub type RoutingProfileOptions = BTreeMap<String, PathExclusions>;

/// One entry in the workflow dependency map (section 4.3): a hop, the aggregate it sits on,
/// whether it imports its VLAN tag, and its own nested dependencies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDependency {
    /// URN of the hop this dependency describes.
    pub hop_urn: String,
    /// URL of the aggregate this hop is at.
    pub aggregate_url: String,
    /// URN of the aggregate this hop is at.
    pub aggregate_urn: String,
    /// Whether this hop must import its VLAN tag from one of its dependencies.
    pub import_vlans: bool,
    /// Hops that must be reserved before this one.
    pub dependencies: Vec<WorkflowDependency>,
}

/// The workflow map returned by PCS: one entry per path (link) id.
pub type WorkflowMap = BTreeMap<String, Vec<WorkflowDependency>>;

/// The two pieces of PCS's response: the request expanded with intermediate aggregates and
/// per-hop VLAN constraints, and the dependency workflow over it.
#[derive(Debug, Clone)]
pub struct PcsResponse {
    /// Expanded request document.
    pub rspec: XmlDoc,
    /// Dependency workflow.
    pub workflow: WorkflowMap,
}

/// Operations the core invokes against the path-computation service. The wire transport is out
/// of scope; the core only ever sees this boundary.
pub trait PathComputationService: Send + Sync {
    /// Compute an expanded path for `rspec` under `slice_urn`, honoring `options`.
    fn compute_path(
        &self,
        slice_urn: &str,
        rspec: &XmlDoc,
        options: &RoutingProfileOptions,
    ) -> Result<PcsResponse, PcsError>;

    /// List the aggregates PCS currently knows about.
    fn list_aggregates(
        &self,
        fresh: bool,
        timeout: Duration,
    ) -> Result<BTreeMap<String, String>, PcsError>;
}

/// Drives one PCS call: builds the exclusion options from registry state, invokes the service,
/// and returns its response untouched for the workflow ingester to consume.
pub struct PcsDriver<'a> {
    service: &'a dyn PathComputationService,
    timeout: Duration,
}

impl<'a> PcsDriver<'a> {
    /// Construct a driver around a PCS implementation with a fixed SSL/read timeout.
    pub fn new(service: &'a dyn PathComputationService, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Build the `geni_routing_profile` options from current registry state: hops marked
    /// `exclude_from_pcs` are omitted entirely, hops with non-empty `vlans_unavailable` get a
    /// `URN=<tagset>` entry, and any caller-supplied excludes/includes are applied to every
    /// path.
    pub fn build_options(
        &self,
        registry: &Registry,
        extra_exclude: &[String],
        extra_include: &[String],
    ) -> RoutingProfileOptions {
        let mut options: RoutingProfileOptions = BTreeMap::new();
        for hop_idx in registry.hop_indices() {
            let hop = registry.hop(hop_idx);
            let path_id = registry.path(hop.path).id.clone();
            if hop.exclude_from_pcs {
                options.entry(path_id).or_default().hop_exclusion_list.push(hop.urn.clone());
            } else if !hop.vlans_unavailable.is_empty() {
                let entry = format!("{}={}", hop.urn, hop.vlans_unavailable.emit());
                options.entry(path_id).or_default().hop_exclusion_list.push(entry);
            }
        }
        if !extra_exclude.is_empty() || !extra_include.is_empty() {
            for entry in options.values_mut() {
                entry.hop_exclusion_list.extend(extra_exclude.iter().cloned());
                entry.hop_inclusion_list.extend(extra_include.iter().cloned());
            }
            // Extra excludes/includes apply to every path, including paths that otherwise have
            // no learned exclusions yet.
            for path_idx in registry.hop_indices().map(|h| registry.hop(h).path) {
                let path_id = registry.path(path_idx).id.clone();
                let entry = options.entry(path_id).or_default();
                if entry.hop_exclusion_list.iter().all(|e| !extra_exclude.contains(e)) {
                    entry.hop_exclusion_list.extend(extra_exclude.iter().cloned());
                }
                if entry.hop_inclusion_list.iter().all(|e| !extra_include.contains(e)) {
                    entry.hop_inclusion_list.extend(extra_include.iter().cloned());
                }
            }
        }
        options
    }

    /// Invoke PCS, bounded by the driver's configured timeout. A timeout is a failed attempt the
    /// outer loop may retry within budget; any other transport error is forwarded unchanged for
    /// the caller to classify.
    pub fn invoke(
        &self,
        slice_urn: &str,
        rspec: &XmlDoc,
        options: &RoutingProfileOptions,
    ) -> Result<PcsResponse, PcsError> {
        debug!("invoking PCS for slice {} with {} path(s) carrying exclusions", slice_urn, options.len());
        let (tx, rx) = mpsc::channel();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                let result = self.service.compute_path(slice_urn, rspec, options);
                let _ = tx.send(result);
            });
            match rx.recv_timeout(self.timeout) {
                Ok(result) => result,
                Err(mpsc::RecvTimeoutError::Timeout) => Err(PcsError::Timeout),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    Err(PcsError::Transport("PCS call thread dropped its result".to_string()))
                }
            }
        })
    }

    /// The configured SSL/read timeout every RPC through this driver is bounded by.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Merge a learned tag-set exclusion for `hop_urn` into its running total, keeping
/// `vlans_unavailable` monotone non-decreasing (data-model invariant 5).
pub fn accumulate_unavailable(existing: &TagSet, newly_unavailable: &TagSet) -> TagSet {
    existing.union(newly_unavailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Registry;

    #[test]
    fn build_options_emits_bare_urn_for_excluded_hop() {
        let mut reg = Registry::new();
        let a = reg.get_or_create_aggregate("urn:a", None);
        let p = reg.get_or_create_path("link1");
        let h = reg.add_hop(p, a, "urn:hopA", TagSet::universe(), None);
        reg.hop_mut(h).exclude_from_pcs = true;
        let driver_service = crate::testutil::FakePcs::new();
        let driver = PcsDriver::new(&driver_service, Duration::from_secs(10));
        let opts = driver.build_options(&reg, &[], &[]);
        assert_eq!(opts["link1"].hop_exclusion_list, vec!["urn:hopA".to_string()]);
    }

    #[test]
    fn build_options_emits_tagset_for_unavailable_hop() {
        let mut reg = Registry::new();
        let a = reg.get_or_create_aggregate("urn:a", None);
        let p = reg.get_or_create_path("link1");
        let h = reg.add_hop(p, a, "urn:hopA", TagSet::universe(), None);
        reg.hop_mut(h).vlans_unavailable = TagSet::parse("100-110").unwrap();
        let service = crate::testutil::FakePcs::new();
        let driver = PcsDriver::new(&service, Duration::from_secs(10));
        let opts = driver.build_options(&reg, &[], &[]);
        assert_eq!(opts["link1"].hop_exclusion_list, vec!["urn:hopA=100-110".to_string()]);
    }
}

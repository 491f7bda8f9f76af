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

//! The [`Registry`]: a single arena owning every [`Aggregate`], [`Hop`] and [`Path`] for one
//! outer-loop cycle. All cross-references between these objects are indices resolved through
//! this registry, so the object graph never needs `Rc`/`RefCell` back-references.

use crate::model::{Aggregate, AggIdx, Hop, HopIdx, HopKey, ModelError, Path, PathIdx};
use crate::vlan::TagSet;
use std::collections::BTreeMap;

/// State forwarded across outer-loop cycles for an aggregate matched by URN (section 3,
/// "Lifecycles"): `vlans_unavailable`, type flags, `userRequested`, and `api_version` survive a
/// `clear_cache`, everything else does not.
#[derive(Debug, Clone, Default)]
pub struct ForwardedAggregateState {
    /// Accumulated unavailable tags, per hop URN at this aggregate.
    pub hop_vlans_unavailable: BTreeMap<String, TagSet>,
    /// Learned implementation family.
    pub family: Option<crate::model::AggregateFamily>,
    /// Learned API version.
    pub api_version: Option<u32>,
    /// Whether the user named this aggregate explicitly.
    pub user_requested: bool,
    /// Primary URL, if known from a previous cycle or static configuration.
    pub url: Option<String>,
}

/// The arena of aggregates, hops and paths for one PCS cycle.
#[derive(Debug, Default)]
pub struct Registry {
    aggregates: Vec<Aggregate>,
    hops: Vec<Hop>,
    paths: Vec<Path>,
    agg_index: BTreeMap<String, AggIdx>,
    hop_index: BTreeMap<HopKey, HopIdx>,
    path_index: BTreeMap<String, PathIdx>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an aggregate by its canonical URN or any synonym.
    pub fn find_aggregate(&self, urn: &str) -> Option<AggIdx> {
        self.agg_index.get(urn).copied()
    }

    /// Look up a hop by its compound `(path_id, hop_urn)` key.
    pub fn find_hop(&self, path_id: &str, hop_urn: &str) -> Option<HopIdx> {
        self.hop_index.get(&(path_id.to_string(), hop_urn.to_string())).copied()
    }

    /// Look up a path by its link id.
    pub fn find_path(&self, id: &str) -> Option<PathIdx> {
        self.path_index.get(id).copied()
    }

    /// Immutable accessors.
    pub fn aggregate(&self, idx: AggIdx) -> &Aggregate {
        &self.aggregates[idx]
    }
    /// Mutable accessor.
    pub fn aggregate_mut(&mut self, idx: AggIdx) -> &mut Aggregate {
        &mut self.aggregates[idx]
    }
    /// Immutable accessor.
    pub fn hop(&self, idx: HopIdx) -> &Hop {
        &self.hops[idx]
    }
    /// Mutable accessor.
    pub fn hop_mut(&mut self, idx: HopIdx) -> &mut Hop {
        &mut self.hops[idx]
    }
    /// Immutable accessor.
    pub fn path(&self, idx: PathIdx) -> &Path {
        &self.paths[idx]
    }

    /// All aggregate indices, in insertion order.
    pub fn aggregate_indices(&self) -> impl Iterator<Item = AggIdx> {
        0..self.aggregates.len()
    }
    /// All hop indices, in insertion order.
    pub fn hop_indices(&self) -> impl Iterator<Item = HopIdx> {
        0..self.hops.len()
    }

    /// Get the aggregate for `urn`, creating it (with any forwarded state applied) if it is not
    /// yet known.
    pub fn get_or_create_aggregate(
        &mut self,
        urn: &str,
        forwarded: Option<&ForwardedAggregateState>,
    ) -> AggIdx {
        if let Some(idx) = self.find_aggregate(urn) {
            return idx;
        }
        let mut agg = Aggregate::new(urn);
        if let Some(f) = forwarded {
            agg.family = f.family;
            agg.api_version = f.api_version;
            agg.user_requested = f.user_requested;
            agg.url = f.url.clone();
        }
        let idx = self.aggregates.len();
        self.agg_index.insert(urn.to_string(), idx);
        self.aggregates.push(agg);
        idx
    }

    /// Register a synonym URN for an existing aggregate so future lookups by either URN resolve
    /// to the same canonical entry.
    pub fn add_synonym(&mut self, idx: AggIdx, synonym: &str) {
        self.aggregates[idx].synonyms.insert(synonym.to_string());
        self.agg_index.entry(synonym.to_string()).or_insert(idx);
    }

    /// Get or create the path for this link id.
    pub fn get_or_create_path(&mut self, id: &str) -> PathIdx {
        if let Some(idx) = self.find_path(id) {
            return idx;
        }
        let idx = self.paths.len();
        self.path_index.insert(id.to_string(), idx);
        self.paths.push(Path::new(id));
        idx
    }

    /// Create a hop on `path` at `aggregate`, with the given requested range, returning its
    /// index. Also appends it to both the path's hop list and the aggregate's hop list.
    pub fn add_hop(
        &mut self,
        path: PathIdx,
        aggregate: AggIdx,
        urn: &str,
        requested: TagSet,
        forwarded_unavailable: Option<&TagSet>,
    ) -> HopIdx {
        let path_id = self.paths[path].id.clone();
        if let Some(existing) = self.find_hop(&path_id, urn) {
            return existing;
        }
        let mut hop = Hop::new(urn, path, aggregate, requested);
        if let Some(u) = forwarded_unavailable {
            hop.vlans_unavailable = u.clone();
        }
        let idx = self.hops.len();
        self.hop_index.insert((path_id, urn.to_string()), idx);
        self.hops.push(hop);
        self.paths[path].hops.push(idx);
        self.aggregates[aggregate].hops.push(idx);
        idx
    }

    /// Add a hop-to-hop dependency: `dependent` must be reserved after `dependency`.
    pub fn add_hop_dependency(&mut self, dependent: HopIdx, dependency: HopIdx) {
        if !self.hops[dependent].depends_on.contains(&dependency) {
            self.hops[dependent].depends_on.push(dependency);
        }
    }

    /// Add an aggregate dependency: `a` depends on `b` (`b` must reach `Reserved` before `a` may
    /// submit). Idempotent; fails with [`ModelError::DependencyCycle`] if `b` already
    /// (transitively) depends on `a`. On success, also makes `a` depend on everything `b`
    /// depends on, materialising the transitive closure (matches the original workflow-ingester
    /// behaviour).
    pub fn add_dependency(&mut self, a: AggIdx, b: AggIdx) -> Result<(), ModelError> {
        if a == b {
            return Ok(());
        }
        if self.aggregates[a].depends_on.contains(&b) {
            return Ok(());
        }
        if self.reaches(b, a) {
            return Err(ModelError::DependencyCycle(format!(
                "{} depends on {} which already (transitively) depends on {}",
                self.aggregates[a].urn, self.aggregates[b].urn, self.aggregates[a].urn
            )));
        }
        self.aggregates[a].depends_on.insert(b);
        let b_deps: Vec<AggIdx> = self.aggregates[b].depends_on.iter().copied().collect();
        for transitive in b_deps {
            self.add_dependency(a, transitive)?;
        }
        Ok(())
    }

    /// True iff `from` can reach `to` by following `depends_on` edges.
    fn reaches(&self, from: AggIdx, to: AggIdx) -> bool {
        if from == to {
            return true;
        }
        let mut seen = vec![false; self.aggregates.len()];
        let mut stack = vec![from];
        while let Some(cur) = stack.pop() {
            if cur == to {
                return true;
            }
            if seen[cur] {
                continue;
            }
            seen[cur] = true;
            stack.extend(self.aggregates[cur].depends_on.iter().copied());
        }
        false
    }

    /// Snapshot the forwardable state of every aggregate, keyed by canonical URN, for carrying
    /// into the next outer-loop cycle.
    pub fn snapshot_forwarded_state(&self) -> BTreeMap<String, ForwardedAggregateState> {
        let mut out = BTreeMap::new();
        for agg in &self.aggregates {
            let mut hop_vlans_unavailable = BTreeMap::new();
            for &h in &agg.hops {
                let hop = &self.hops[h];
                if !hop.vlans_unavailable.is_empty() {
                    hop_vlans_unavailable.insert(hop.urn.clone(), hop.vlans_unavailable.clone());
                }
            }
            out.insert(
                agg.urn.clone(),
                ForwardedAggregateState {
                    hop_vlans_unavailable,
                    family: agg.family,
                    api_version: agg.api_version,
                    user_requested: agg.user_requested,
                    url: agg.url.clone(),
                },
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_lookup_by_synonym() {
        let mut reg = Registry::new();
        let a = reg.get_or_create_aggregate("urn:a", None);
        reg.add_synonym(a, "urn:a-alt");
        assert_eq!(reg.find_aggregate("urn:a-alt"), Some(a));
        assert_eq!(reg.find_aggregate("urn:a"), Some(a));
    }

    #[test]
    fn add_dependency_idempotent() {
        let mut reg = Registry::new();
        let a = reg.get_or_create_aggregate("urn:a", None);
        let b = reg.get_or_create_aggregate("urn:b", None);
        reg.add_dependency(a, b).unwrap();
        reg.add_dependency(a, b).unwrap();
        assert_eq!(reg.aggregate(a).depends_on.len(), 1);
    }

    #[test]
    fn add_dependency_detects_cycle() {
        let mut reg = Registry::new();
        let a = reg.get_or_create_aggregate("urn:a", None);
        let b = reg.get_or_create_aggregate("urn:b", None);
        reg.add_dependency(a, b).unwrap();
        assert!(reg.add_dependency(b, a).is_err());
    }

    #[test]
    fn add_dependency_materialises_transitive_closure() {
        let mut reg = Registry::new();
        let a = reg.get_or_create_aggregate("urn:a", None);
        let b = reg.get_or_create_aggregate("urn:b", None);
        let c = reg.get_or_create_aggregate("urn:c", None);
        reg.add_dependency(b, c).unwrap();
        reg.add_dependency(a, b).unwrap();
        assert!(reg.aggregate(a).depends_on.contains(&c));
    }

    #[test]
    fn compound_hop_key_allows_same_urn_on_different_paths() {
        let mut reg = Registry::new();
        let a = reg.get_or_create_aggregate("urn:a", None);
        let p1 = reg.get_or_create_path("link1");
        let p2 = reg.get_or_create_path("link2");
        let h1 = reg.add_hop(p1, a, "urn:hop", TagSet::universe(), None);
        let h2 = reg.add_hop(p2, a, "urn:hop", TagSet::universe(), None);
        assert_ne!(h1, h2);
    }
}

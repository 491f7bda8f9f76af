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

//! Deterministic, in-memory doubles for [`crate::pcs::PathComputationService`] and
//! [`crate::amclient::AggregateClient`], scripted ahead of time. Used both by unit/integration
//! tests and by the `fakeModeDir` configuration option (section 6) for dry runs against no
//! network at all.

use crate::error::{AggregateError, PcsError};
use crate::pcs::{PathComputationService, PcsResponse, RoutingProfileOptions, WorkflowMap};
use crate::amclient::{AggregateClient, VersionInfo};
use crate::xmldoc::XmlDoc;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

/// A scripted [`PathComputationService`]: returns a fixed response (or a fixed failure) for
/// every `compute_path` call, optionally varying by how many times it has been invoked so a test
/// can model "first call fails, second succeeds".
pub struct FakePcs {
    responses: Mutex<Vec<Result<PcsResponse, PcsError>>>,
    aggregates: BTreeMap<String, String>,
    calls: Mutex<u32>,
}

impl FakePcs {
    /// A fake that always returns an empty workflow over the request unchanged.
    pub fn new() -> Self {
        Self { responses: Mutex::new(Vec::new()), aggregates: BTreeMap::new(), calls: Mutex::new(0) }
    }

    /// Queue a scripted response, consumed in order; once exhausted, the last response repeats.
    pub fn with_response(self, response: Result<PcsResponse, PcsError>) -> Self {
        self.responses.lock().unwrap().push(response);
        self
    }

    /// Number of times `compute_path` has been called so far.
    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl Default for FakePcs {
    fn default() -> Self {
        Self::new()
    }
}

impl PathComputationService for FakePcs {
    fn compute_path(
        &self,
        _slice_urn: &str,
        rspec: &XmlDoc,
        _options: &RoutingProfileOptions,
    ) -> Result<PcsResponse, PcsError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        let mut queue = self.responses.lock().unwrap();
        if queue.is_empty() {
            return Ok(PcsResponse { rspec: rspec.clone(), workflow: WorkflowMap::new() });
        }
        if queue.len() == 1 {
            queue[0].clone()
        } else {
            queue.remove(0)
        }
    }

    fn list_aggregates(
        &self,
        _fresh: bool,
        _timeout: Duration,
    ) -> Result<BTreeMap<String, String>, PcsError> {
        Ok(self.aggregates.clone())
    }
}

/// A scripted [`AggregateClient`]: each hop URN may be pre-assigned a tag (reservation succeeds
/// immediately), marked as always rejecting a set of tags (VLAN conflict), or left to fail with a
/// fixed transient/fatal error, driving the FSM's retry and escalation paths under test.
#[derive(Default)]
pub struct FakeAggregateClient {
    assignments: BTreeMap<String, u16>,
    rejections: BTreeMap<String, Vec<u16>>,
    failures: BTreeMap<String, AggregateError>,
    am_types: BTreeMap<String, Vec<String>>,
    reserved_slices: Mutex<Vec<String>>,
    deleted_slices: Mutex<Vec<String>>,
}

impl FakeAggregateClient {
    /// A fake aggregate client with no scripted behaviour yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-assign a tag to a hop URN: any `reserve` call proposing that hop succeeds with this
    /// tag in the manifest.
    pub fn with_assignment(mut self, hop_urn: &str, tag: u16) -> Self {
        self.assignments.insert(hop_urn.to_string(), tag);
        self
    }

    /// Make a hop URN reject the listed tags whenever proposed.
    pub fn with_rejection(mut self, hop_urn: &str, tags: Vec<u16>) -> Self {
        self.rejections.insert(hop_urn.to_string(), tags);
        self
    }

    /// Make a hop URN always fail `reserve` with a fixed error, regardless of proposed tag.
    pub fn with_failure(mut self, hop_urn: &str, err: AggregateError) -> Self {
        self.failures.insert(hop_urn.to_string(), err);
        self
    }

    /// Script the `geni_am_type` values `get_version` reports for a URL; drives family
    /// detection (`VersionInfo::family`) the same way a real aggregate's response would.
    pub fn with_am_types(mut self, url: &str, am_types: Vec<String>) -> Self {
        self.am_types.insert(url.to_string(), am_types);
        self
    }

    /// Slice names that were ever reserved against this fake, in call order.
    pub fn reserved_slices(&self) -> Vec<String> {
        self.reserved_slices.lock().unwrap().clone()
    }

    /// Slice names that were ever deleted against this fake, in call order.
    pub fn deleted_slices(&self) -> Vec<String> {
        self.deleted_slices.lock().unwrap().clone()
    }
}

impl AggregateClient for FakeAggregateClient {
    fn get_version(&self, url: &str) -> Result<VersionInfo, AggregateError> {
        let mut api_versions = BTreeMap::new();
        api_versions.insert(3, "https://fake/".to_string());
        let am_types = self.am_types.get(url).cloned().unwrap_or_else(|| vec!["fake".to_string()]);
        Ok(VersionInfo { am_types, api_versions })
    }

    fn reserve(&self, _url: &str, slice_cred: &str, rspec: &XmlDoc) -> Result<XmlDoc, AggregateError> {
        self.reserved_slices.lock().unwrap().push(slice_cred.to_string());
        let mut offending_hops = Vec::new();
        let mut offending_tags = Vec::new();
        for link in rspec.root.children_named("link") {
            for iface in link.children_named("interface_ref") {
                let client_id = match iface.attr("client_id") {
                    Some(c) => c.to_string(),
                    None => continue,
                };
                if let Some(err) = self.failures.get(&client_id) {
                    return Err(err.clone());
                }
                let proposed = iface.attr("vlan_tag").and_then(|v| v.parse::<u16>().ok());
                if let (Some(tag), Some(rejected)) = (proposed, self.rejections.get(&client_id)) {
                    if rejected.contains(&tag) {
                        offending_hops.push(client_id.clone());
                        offending_tags.push(tag);
                    }
                }
            }
        }
        if !offending_hops.is_empty() {
            return Err(AggregateError::VlanUnavailable { hops: offending_hops, tags: offending_tags });
        }

        let mut manifest_root = crate::xmldoc::Element::new("rspec");
        for link in rspec.root.children_named("link") {
            let mut out_link = crate::xmldoc::Element::new("link").with_attr("id", link.attr("id").unwrap_or_default());
            for iface in link.children_named("interface_ref") {
                let client_id = iface.attr("client_id").unwrap_or_default().to_string();
                let tag = iface
                    .attr("vlan_tag")
                    .and_then(|v| v.parse::<u16>().ok())
                    .or_else(|| self.assignments.get(&client_id).copied())
                    .unwrap_or(1);
                let out_iface = crate::xmldoc::Element::new("interface_ref")
                    .with_attr("client_id", client_id)
                    .with_attr("vlan_tag", tag.to_string());
                out_link.push_child(out_iface);
            }
            manifest_root.push_child(out_link);
        }
        Ok(XmlDoc::new(manifest_root))
    }

    fn delete(&self, _url: &str, slice_name: &str) -> Result<(), AggregateError> {
        self.deleted_slices.lock().unwrap().push(slice_name.to_string());
        Ok(())
    }
}

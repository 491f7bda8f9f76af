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

//! The aggregate RPC boundary. The wire transport (SSL/XML-RPC to a real aggregate manager) is
//! out of scope; this module defines only the trait the core calls, so the core stays testable
//! against [`crate::testutil::FakeAggregateClient`] without a network.

use crate::error::AggregateError;
use crate::model::AggregateFamily;
use crate::xmldoc::XmlDoc;
use std::collections::BTreeMap;

/// Result of a `getversion` probe, used to pick an aggregate's implementation family and reject
/// API v1-only aggregates.
#[derive(Debug, Clone, Default)]
pub struct VersionInfo {
    /// `geni_am_type` values the aggregate advertises.
    pub am_types: Vec<String>,
    /// Supported API version -> URL for that version.
    pub api_versions: BTreeMap<u32, String>,
}

impl VersionInfo {
    /// Highest API version this aggregate advertises, if any.
    pub fn max_version(&self) -> Option<u32> {
        self.api_versions.keys().copied().max()
    }

    /// Implementation family implied by the advertised `geni_am_type` values (Design Notes,
    /// section 9). The family is chosen at `getversion` time, not guessed from the aggregate's
    /// URN, since a DCN aggregate's URN need not mention "dcn".
    pub fn family(&self) -> Option<AggregateFamily> {
        self.am_types.iter().find_map(|am_type| {
            let lower = am_type.to_ascii_lowercase();
            if lower.contains("dcn") {
                Some(AggregateFamily::Dcn)
            } else if lower.contains("orca") || lower.contains("exogeni") {
                Some(AggregateFamily::Orca)
            } else if lower.contains("protogeni") || lower.contains("pg") {
                Some(AggregateFamily::Protogeni)
            } else {
                None
            }
        })
    }
}

/// Operations the core invokes against an aggregate manager. Implementations are responsible
/// for the real RPC transport; the core only ever sees this boundary.
pub trait AggregateClient: Send + Sync {
    /// Probe an aggregate's advertised type and supported API versions.
    fn get_version(&self, url: &str) -> Result<VersionInfo, AggregateError>;

    /// Attempt to reserve resources described by `rspec` under `slice_cred`. On success, returns
    /// the manifest document; on failure, an [`AggregateError`] describing why (in particular,
    /// [`AggregateError::VlanUnavailable`] with the offending hops/tags when that's the cause).
    fn reserve(&self, url: &str, slice_cred: &str, rspec: &XmlDoc) -> Result<XmlDoc, AggregateError>;

    /// Delete a prior reservation. Best-effort from the caller's perspective: failures are
    /// collected, never allowed to mask a primary error.
    fn delete(&self, url: &str, slice_name: &str) -> Result<(), AggregateError>;
}

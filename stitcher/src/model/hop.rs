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

//! [`Hop`] and [`Path`]: one end of one link at one aggregate, and the ordered chain of hops
//! that forms a requested end-to-end circuit.

use crate::model::{AggIdx, HopIdx, PathIdx};
use crate::vlan::TagSet;

/// One end of one link at one aggregate on one path.
#[derive(Debug, Clone)]
pub struct Hop {
    /// Stable URN. Unique only within its containing path (section 9 design note).
    pub urn: String,
    /// The path this hop belongs to.
    pub path: PathIdx,
    /// The aggregate this hop is reserved at.
    pub aggregate: AggIdx,
    /// What tags are acceptable to the requester.
    pub requested: TagSet,
    /// The single tag the client proposes next, or `None` for "ANY".
    pub suggested: Option<u16>,
    /// The tag the aggregate actually assigned, set after a successful reservation.
    pub manifest_tag: Option<u16>,
    /// What the aggregate says remains acceptable after reservation.
    pub manifest_range: Option<TagSet>,
    /// Another hop whose manifest tag this hop must adopt, or `None` if this hop chooses freely.
    pub import_from: Option<HopIdx>,
    /// Tags that have been rejected at this hop across retries. Monotone non-decreasing for the
    /// lifetime of one outer-loop run.
    pub vlans_unavailable: TagSet,
    /// If set, this hop is omitted entirely from future PCS requests.
    pub exclude_from_pcs: bool,
    /// Other hops that must be reserved before this one.
    pub depends_on: Vec<HopIdx>,
}

impl Hop {
    /// Construct a fresh hop with no manifest state yet.
    pub fn new(urn: impl Into<String>, path: PathIdx, aggregate: AggIdx, requested: TagSet) -> Self {
        Self {
            urn: urn.into(),
            path,
            aggregate,
            requested,
            suggested: None,
            manifest_tag: None,
            manifest_range: None,
            import_from: None,
            vlans_unavailable: TagSet::empty(),
            exclude_from_pcs: false,
            depends_on: Vec::new(),
        }
    }

    /// Candidate tags remaining after subtracting tags known to be unavailable.
    pub fn candidates(&self) -> TagSet {
        self.requested.difference(&self.vlans_unavailable)
    }

    /// True once a successful reservation assigned this hop a tag.
    pub fn is_reserved(&self) -> bool {
        self.manifest_tag.is_some()
    }
}

/// Ordered list of hops forming one end-to-end circuit, identified by the corresponding link id
/// in the request.
#[derive(Debug, Clone)]
pub struct Path {
    /// The link id from the user request this path corresponds to.
    pub id: String,
    /// Hops in traversal order.
    pub hops: Vec<HopIdx>,
}

impl Path {
    /// Construct an empty path for the given link id.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), hops: Vec::new() }
    }
}

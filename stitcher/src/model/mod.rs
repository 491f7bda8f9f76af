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

//! In-memory graph model: hops within paths, hops grouped by aggregate, and the dependency
//! edges between both. An arena of [`Registry`]: aggregates and hops reference each other only
//! through indices resolved via the registry, avoiding a cycle of `Rc`/back-references.

mod aggregate;
mod hop;
pub mod registry;

pub use aggregate::{Aggregate, AggregateFamily, FsmState};
pub use hop::{Hop, Path};
pub use registry::Registry;

use thiserror::Error;

/// Index of an aggregate inside a [`Registry`].
pub type AggIdx = usize;
/// Index of a hop inside a [`Registry`].
pub type HopIdx = usize;
/// Index of a path inside a [`Registry`].
pub type PathIdx = usize;

/// Compound key for a hop: hop URNs are not guaranteed globally unique, only unique within a
/// path (Design Note, section 9).
pub type HopKey = (String, String);

/// Errors raised by the graph model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Adding this dependency would create a cycle in the aggregate dependency graph.
    #[error("dependency cycle: {0}")]
    DependencyCycle(String),
    /// No aggregate with this URN (or synonym) is known.
    #[error("no aggregate found for URN {0:?}")]
    AggregateNotFound(String),
    /// No hop with this (path, URN) key is known.
    #[error("no hop found for URN {1:?} on path {0:?}")]
    HopNotFound(String, String),
    /// No path with this id is known.
    #[error("no path found with id {0:?}")]
    PathNotFound(String),
}

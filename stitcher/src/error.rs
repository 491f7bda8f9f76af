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

//! Module containing all error types

use crate::model::ModelError;
use crate::vlan::VlanError;
use thiserror::Error;

/// Errors raised by the PCS driver.
#[derive(Error, Debug, Clone)]
pub enum PcsError {
    /// The RPC timed out. Counts as a failed attempt, not fatal on its own.
    #[error("PCS request timed out")]
    Timeout,
    /// Any other transport-level failure.
    #[error("PCS transport error: {0}")]
    Transport(String),
    /// The response could not be parsed into an expanded rspec + workflow.
    #[error("PCS returned a malformed response: {0}")]
    MalformedResponse(String),
    /// PCS reported it could not compute a path at all.
    #[error("PCS reported failure: {0}")]
    ComputationFailed(String),
}

/// Errors raised by the aggregate RPC boundary.
#[derive(Error, Debug, Clone)]
pub enum AggregateError {
    /// The proposed VLAN tag(s) were rejected. Carries the offending hop URNs and tags.
    #[error("VLAN unavailable at {hops:?}: {tags:?}")]
    VlanUnavailable {
        /// Hop URNs the aggregate rejected.
        hops: Vec<String>,
        /// Tags that were rejected.
        tags: Vec<u16>,
    },
    /// A transient, retryable condition (overloaded, timeout).
    #[error("aggregate transiently unavailable: {0}")]
    Transient(String),
    /// Authentication or authorization failure. Not retryable.
    #[error("aggregate permission error: {0}")]
    Permission(String),
    /// The aggregate returned something the core could not parse.
    #[error("aggregate returned a malformed response: {0}")]
    Malformed(String),
    /// The RPC timed out.
    #[error("aggregate request timed out")]
    Timeout,
}

/// Main error type for the stitcher crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The request failed schema or structural pre-normalisation.
    #[error("input request is malformed: {0}")]
    InputMalformed(String),
    /// The workflow implies a cycle in the aggregate dependency graph.
    #[error("dependency cycle detected: {0}")]
    DependencyCycle(String),
    /// PCS could not be used to compute a path, and the retry budget is exhausted.
    #[error("PCS failure: {0}")]
    PcsFailure(#[from] PcsError),
    /// No VLAN tag was available at a hop, and re-invoking PCS did not resolve it within the
    /// retry budget.
    #[error("VLAN unavailable on {urn}, budget exhausted: {source}")]
    VlanUnavailableEscalated {
        /// Hop URN with no remaining candidate tags.
        urn: String,
        /// The last rejection observed there.
        source: AggregateError,
    },
    /// Unrecoverable error from an aggregate (auth, malformed, retry-cap exceeded).
    #[error("aggregate {urn} failed fatally: {source}")]
    AggregateFatal {
        /// URN of the aggregate that failed.
        urn: String,
        /// The underlying cause.
        source: AggregateError,
    },
    /// Errors propagated from the in-memory graph model, other than dependency cycles (which
    /// become [`Error::DependencyCycle`] directly; see the `From<ModelError>` impl below).
    #[error("graph model error: {0}")]
    ModelError(ModelError),
    /// Errors propagated from the VLAN tag-set algebra.
    #[error("VLAN range error: {0}")]
    VlanError(#[from] VlanError),
    /// Best-effort deletion of partial reservations failed. Never masks a primary error; carried
    /// alongside one for diagnostics.
    #[error("failed to delete {} reservation(s)", .0.len())]
    DeleteFailure(Vec<(String, AggregateError)>),
}

impl Error {
    /// Compose this error with a higher-level description, producing a single message that
    /// shows the root cause alongside the context that surfaced it. Mirrors the "first fatal
    /// wins, root cause retained" propagation policy: nothing here discards `self`, it only adds
    /// context on top.
    pub fn with_context(self, context: &str) -> ContextualError {
        ContextualError { context: context.to_string(), root_cause: self }
    }

    /// Fixed process exit code for this error family, one per taxonomy bucket.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InputMalformed(_) => 1,
            Error::DependencyCycle(_) => 2,
            Error::PcsFailure(_) => 3,
            Error::AggregateFatal { .. } => 4,
            Error::VlanUnavailableEscalated { .. }
            | Error::ModelError(_)
            | Error::VlanError(_)
            | Error::DeleteFailure(_) => 5,
        }
    }
}

impl From<ModelError> for Error {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::DependencyCycle(msg) => Error::DependencyCycle(msg),
            other => Error::ModelError(other),
        }
    }
}

/// An [`Error`] wrapped with the higher-level operation that surfaced it, so the message reads
/// "<context>, which caused stitching failure: <root cause>" as required by the propagation
/// policy.
#[derive(Debug, Error)]
#[error("{context}, which caused stitching failure: {root_cause}")]
pub struct ContextualError {
    context: String,
    /// The original error.
    pub root_cause: Error,
}

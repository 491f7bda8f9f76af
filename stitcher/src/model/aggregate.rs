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

//! [`Aggregate`]: a reservation target, its FSM state, and the three implementation families the
//! core must distinguish.

use crate::model::{AggIdx, HopIdx};
use crate::xmldoc::XmlDoc;
use std::collections::BTreeSet;

/// The well-known multi-site ExoSM endpoint every orca-family (ExoGENI) aggregate can also be
/// reached through, as an alternative to its per-site local URL.
pub const EXOSM_URL: &str = "https://geni.renci.org:11443/orca/xmlrpc";

/// Which of the three implementation families an aggregate belongs to. Affects post-delete
/// pause duration, dual-URL handling, and error-message parsing (Design Notes, section 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFamily {
    /// DCN-style aggregates require a longer "free resources" pause after delete.
    Dcn,
    /// ORCA-based aggregates may advertise a dual endpoint (ExoSM / non-ExoSM).
    Orca,
    /// ProtoGENI-based aggregates.
    Protogeni,
}

impl AggregateFamily {
    /// The pause to observe after issuing `delete`, before this aggregate may be reserved again
    /// within the same process.
    pub fn post_delete_pause(&self) -> std::time::Duration {
        match self {
            AggregateFamily::Dcn => std::time::Duration::from_secs(15),
            AggregateFamily::Orca | AggregateFamily::Protogeni => std::time::Duration::from_secs(0),
        }
    }
}

/// Reservation FSM state for one aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsmState {
    /// Waiting for its dependencies; not yet submitted.
    Ready,
    /// A reservation RPC is in flight.
    Submitting,
    /// The aggregate returned a manifest; hops carry their assigned tags.
    Reserved,
    /// The aggregate rejected the proposed tag(s) on this attempt.
    VlanUnavailable,
    /// A transient error occurred; eligible for bounded retry.
    RecoverableFailure,
    /// Unrecoverable: auth failure, malformed response, or retry cap exceeded.
    Fatal,
}

/// A resource provider reserving a subset of a slice.
#[derive(Debug, Clone)]
pub struct Aggregate {
    /// Canonical URN (the first-seen URN for this aggregate).
    pub urn: String,
    /// Other URNs this aggregate is also known by.
    pub synonyms: BTreeSet<String>,
    /// Primary RPC endpoint.
    pub url: Option<String>,
    /// Alternate endpoint (ORCA dual-URL aggregates).
    pub alt_url: Option<String>,
    /// GENI AM API version, learned from `getversion`.
    pub api_version: Option<u32>,
    /// Implementation family, learned from `getversion`.
    pub family: Option<AggregateFamily>,
    /// True if the user's request named this aggregate explicitly (as opposed to it being
    /// introduced by PCS expansion).
    pub user_requested: bool,
    /// Hops at this aggregate.
    pub hops: Vec<HopIdx>,
    /// Aggregates that must reach `Reserved` before this one may submit.
    pub depends_on: BTreeSet<AggIdx>,
    /// Current FSM state.
    pub state: FsmState,
    /// Number of times a reservation has been attempted (incremented on each `Submitting`
    /// entry); caps local retries.
    pub attempts: u32,
    /// The manifest document returned by a successful reservation, if any.
    pub manifest: Option<XmlDoc>,
}

impl Aggregate {
    /// Construct a freshly-discovered aggregate, not yet reserved.
    pub fn new(urn: impl Into<String>) -> Self {
        let urn = urn.into();
        let mut synonyms = BTreeSet::new();
        synonyms.insert(urn.clone());
        Self {
            urn,
            synonyms,
            url: None,
            alt_url: None,
            api_version: None,
            family: None,
            user_requested: false,
            hops: Vec::new(),
            depends_on: BTreeSet::new(),
            state: FsmState::Ready,
            attempts: 0,
            manifest: None,
        }
    }

    /// True iff this URN or any synonym matches.
    pub fn matches(&self, urn: &str) -> bool {
        self.urn == urn || self.synonyms.contains(urn)
    }

    /// An aggregate is `Reserved` iff it has a manifest document (data-model invariant 6).
    pub fn is_reserved(&self) -> bool {
        matches!(self.state, FsmState::Reserved) && self.manifest.is_some()
    }

    /// Clear reservation state, as happens on delete: manifest is dropped, hops' manifest tags
    /// stay intact on the hop side (callers clear those separately if needed) but the aggregate
    /// itself returns to `Ready`.
    pub fn clear_manifest(&mut self) {
        self.manifest = None;
        self.state = FsmState::Ready;
    }

    /// Resolve the ExoSM/local dual-URL pair for an orca-family aggregate and apply the
    /// `noExoSM`/`useExoSM` rewrite policy (Design Notes, section 9). A no-op for other families.
    pub fn apply_exo_sm_policy(&mut self, no_exo_sm: bool, use_exo_sm: bool) {
        if self.family != Some(AggregateFamily::Orca) {
            return;
        }
        let is_exo_sm = self.url.as_deref() == Some(EXOSM_URL);
        if !is_exo_sm && self.alt_url.is_none() {
            self.alt_url = Some(EXOSM_URL.to_string());
        }
        let should_swap = (is_exo_sm && no_exo_sm) || (!is_exo_sm && use_exo_sm);
        if should_swap {
            if let Some(alt) = self.alt_url.take() {
                self.alt_url = self.url.replace(alt);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_exo_sm_rewrites_a_local_orca_url_to_the_exosm_endpoint() {
        let mut agg = Aggregate::new("urn:orca-agg");
        agg.family = Some(AggregateFamily::Orca);
        agg.url = Some("https://local.example/orca".to_string());

        agg.apply_exo_sm_policy(false, true);

        assert_eq!(agg.url.as_deref(), Some(EXOSM_URL));
        assert_eq!(agg.alt_url.as_deref(), Some("https://local.example/orca"));
    }

    #[test]
    fn no_exo_sm_rewrites_an_exosm_url_back_to_the_local_endpoint() {
        let mut agg = Aggregate::new("urn:orca-agg");
        agg.family = Some(AggregateFamily::Orca);
        agg.url = Some(EXOSM_URL.to_string());
        agg.alt_url = Some("https://local.example/orca".to_string());

        agg.apply_exo_sm_policy(true, false);

        assert_eq!(agg.url.as_deref(), Some("https://local.example/orca"));
        assert_eq!(agg.alt_url.as_deref(), Some(EXOSM_URL));
    }

    #[test]
    fn non_orca_aggregate_is_unaffected_by_exo_sm_policy() {
        let mut agg = Aggregate::new("urn:dcn-agg");
        agg.family = Some(AggregateFamily::Dcn);
        agg.url = Some("https://dcn.example/".to_string());

        agg.apply_exo_sm_policy(true, true);

        assert_eq!(agg.url.as_deref(), Some("https://dcn.example/"));
        assert_eq!(agg.alt_url, None);
    }
}

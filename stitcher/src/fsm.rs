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

//! Per-aggregate reservation FSM: `Ready -> Submitting -> { Reserved | VlanUnavailable |
//! RecoverableFailure | Fatal }`. One aggregate's transition is entirely local: it only reads and
//! writes its own hops and its own [`crate::model::FsmState`].

use crate::amclient::AggregateClient;
use crate::error::AggregateError;
use crate::model::{AggIdx, FsmState, HopIdx, Registry};
use crate::xmldoc::{Element, XmlDoc};
use log::{info, warn};

/// Maximum number of local (non-PCS) retries at one aggregate before its failure is treated as
/// fatal and escalated to the outer loop.
pub const LOCAL_RETRY_CAP: u32 = 3;

/// A reservation request ready to submit: the aggregate's URL and the composed rspec document
/// covering only its own hops.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Index of the aggregate this submission targets.
    pub agg_idx: AggIdx,
    /// RPC endpoint to submit to.
    pub url: String,
    /// The per-aggregate request document.
    pub rspec: XmlDoc,
}

/// What an aggregate RPC attempt produced, prior to being folded into registry state.
#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    /// The aggregate reserved the request; carries the manifest document.
    Reserved(XmlDoc),
    /// The aggregate rejected one or more proposed tags.
    VlanUnavailable {
        /// Offending hop URNs.
        hops: Vec<String>,
        /// Offending tags.
        tags: Vec<u16>,
    },
    /// A transient condition occurred; eligible for local retry.
    Transient(String),
    /// An unrecoverable condition occurred.
    Fatal(AggregateError),
}

/// The decision the caller (the launcher) must act on after folding an outcome into the
/// registry.
#[derive(Debug)]
pub enum Transition {
    /// The aggregate is now `Reserved`.
    Reserved,
    /// The aggregate returned to `Ready`; the caller may resubmit within the same PCS cycle.
    LocalRetry,
    /// The local retry budget is exhausted on a VLAN conflict; the outer loop must re-invoke PCS
    /// excluding the offending hop/tag combination.
    Escalate {
        /// Hop URN with no remaining candidate tags after the retry budget.
        hop_urn: String,
        /// The rejection that triggered escalation, kept as the root cause if the outer loop's
        /// PCS budget is exhausted before the conflict resolves.
        source: AggregateError,
    },
    /// The aggregate failed in a way no retry can fix.
    Fatal(AggregateError),
}

/// For every hop at `agg_idx` that does not import its tag from a dependency, pick the next
/// candidate tag to propose. Hops that do import pull their `suggested` (and narrow their
/// `requested` range) from the dependency's manifest once it is available. Must run
/// single-threaded, after all of this aggregate's dependencies have reached `Reserved`.
pub fn prepare_submission(registry: &mut Registry, agg_idx: AggIdx) -> Result<(), crate::error::Error> {
    let hop_idxs: Vec<HopIdx> = registry.aggregate(agg_idx).hops.clone();
    for hop_idx in hop_idxs {
        let import_from = registry.hop(hop_idx).import_from;
        if let Some(parent_idx) = import_from {
            let parent = registry.hop(parent_idx);
            let parent_tag = parent.manifest_tag;
            let parent_range = parent.manifest_range.clone();
            let hop = registry.hop_mut(hop_idx);
            hop.suggested = parent_tag;
            if let Some(range) = parent_range {
                hop.requested = hop.requested.intersect(&range);
            }
        } else {
            let hop = registry.hop(hop_idx);
            if hop.suggested.is_none() {
                let picked = hop.candidates().pick_any()?;
                registry.hop_mut(hop_idx).suggested = Some(picked);
            }
        }
    }
    Ok(())
}

/// Compose the per-aggregate request document: one `<node>`-less `<rspec>` carrying a `<link>`
/// per path touching this aggregate, each with the hop's URN and suggested tag. This intentionally
/// mirrors the shape [`crate::normalize`] expects on the way back in, simplified to exactly the
/// hops this aggregate owns.
pub fn build_submission(registry: &Registry, agg_idx: AggIdx) -> Submission {
    let agg = registry.aggregate(agg_idx);
    let mut root = Element::new("rspec");
    for &hop_idx in &agg.hops {
        let hop = registry.hop(hop_idx);
        let mut link = Element::new("link").with_attr("id", registry.path(hop.path).id.clone());
        let mut iface = Element::new("interface_ref").with_attr("client_id", hop.urn.clone());
        if let Some(tag) = hop.suggested {
            iface.set_attr("vlan_tag", tag.to_string());
        } else {
            iface.set_attr("vlan_range", hop.candidates().emit());
        }
        link.push_child(iface);
        root.push_child(link);
    }
    Submission { agg_idx, url: agg.url.clone().unwrap_or_default(), rspec: XmlDoc::new(root) }
}

/// Submit `sub` against `client`, translating transport-level errors into a [`SubmissionOutcome`]
/// the caller can fold into registry state without further knowledge of the RPC layer.
pub fn run_submission<C: AggregateClient>(
    client: &C,
    sub: &Submission,
    slice_cred: &str,
) -> SubmissionOutcome {
    match client.reserve(&sub.url, slice_cred, &sub.rspec) {
        Ok(manifest) => SubmissionOutcome::Reserved(manifest),
        Err(AggregateError::VlanUnavailable { hops, tags }) => {
            SubmissionOutcome::VlanUnavailable { hops, tags }
        }
        Err(AggregateError::Transient(msg)) => SubmissionOutcome::Transient(msg),
        Err(AggregateError::Timeout) => SubmissionOutcome::Transient("timeout".to_string()),
        Err(err @ AggregateError::Permission(_)) => SubmissionOutcome::Fatal(err),
        Err(err @ AggregateError::Malformed(_)) => SubmissionOutcome::Fatal(err),
    }
}

/// Fold a [`SubmissionOutcome`] into registry state and decide what the launcher should do next.
/// On success, splices the per-hop manifest tag/range out of the returned manifest by matching on
/// hop URN, sets the aggregate to `Reserved`, and stores the manifest. On `VlanUnavailable`, marks
/// the offending tags unavailable at each offending hop (monotonically) and either retries locally
/// (budget remains) or escalates (budget exhausted). On `Transient`, retries locally up to the same
/// budget. On `Fatal`, marks the aggregate `Fatal` and returns the error for the outer loop.
pub fn apply_outcome(
    registry: &mut Registry,
    agg_idx: AggIdx,
    outcome: SubmissionOutcome,
    local_retry_cap: u32,
) -> Transition {
    match outcome {
        SubmissionOutcome::Reserved(manifest) => {
            apply_manifest(registry, agg_idx, &manifest);
            let agg = registry.aggregate_mut(agg_idx);
            agg.manifest = Some(manifest);
            agg.state = FsmState::Reserved;
            info!("aggregate {} reserved", registry.aggregate(agg_idx).urn);
            Transition::Reserved
        }
        SubmissionOutcome::VlanUnavailable { hops, tags } => {
            let urn = registry.aggregate(agg_idx).urn.clone();
            let offending_set = tags.iter().fold(crate::vlan::TagSet::empty(), |acc, &t| {
                acc.union(&crate::vlan::TagSet::single(t))
            });
            let mut escalate_urn = None;
            for hop_urn in &hops {
                if let Some(hop_idx) = registry.aggregate(agg_idx).hops.iter().copied().find(|&h| &registry.hop(h).urn == hop_urn) {
                    let hop = registry.hop_mut(hop_idx);
                    hop.vlans_unavailable = crate::pcs::accumulate_unavailable(&hop.vlans_unavailable, &offending_set);
                    hop.suggested = None;
                    if hop.candidates().is_empty() {
                        escalate_urn = Some(hop.urn.clone());
                    }
                }
            }
            let attempts = registry.aggregate(agg_idx).attempts;
            if let Some(hop_urn) = escalate_urn {
                warn!("aggregate {} exhausted local candidates at hop {}", urn, hop_urn);
                registry.aggregate_mut(agg_idx).state = FsmState::VlanUnavailable;
                Transition::Escalate {
                    hop_urn,
                    source: AggregateError::VlanUnavailable { hops, tags },
                }
            } else if attempts > local_retry_cap {
                let hop_urn = hops.first().cloned().unwrap_or_default();
                registry.aggregate_mut(agg_idx).state = FsmState::VlanUnavailable;
                Transition::Escalate {
                    hop_urn,
                    source: AggregateError::VlanUnavailable { hops, tags },
                }
            } else {
                registry.aggregate_mut(agg_idx).state = FsmState::Ready;
                Transition::LocalRetry
            }
        }
        SubmissionOutcome::Transient(msg) => {
            let attempts = registry.aggregate(agg_idx).attempts;
            if attempts > local_retry_cap {
                let urn = registry.aggregate(agg_idx).urn.clone();
                registry.aggregate_mut(agg_idx).state = FsmState::Fatal;
                Transition::Fatal(AggregateError::Transient(format!(
                    "{} after {} attempts at {}",
                    msg, attempts, urn
                )))
            } else {
                registry.aggregate_mut(agg_idx).state = FsmState::Ready;
                Transition::LocalRetry
            }
        }
        SubmissionOutcome::Fatal(err) => {
            registry.aggregate_mut(agg_idx).state = FsmState::Fatal;
            Transition::Fatal(err)
        }
    }
}

/// Read each hop's assigned tag and remaining range back out of a returned manifest document and
/// write it onto the registry's hop state, matched by `client_id`/hop URN.
fn apply_manifest(registry: &mut Registry, agg_idx: AggIdx, manifest: &XmlDoc) {
    let hop_idxs: Vec<HopIdx> = registry.aggregate(agg_idx).hops.clone();
    for link in manifest.root.children_named("link") {
        for iface in link.children_named("interface_ref") {
            let client_id = match iface.attr("client_id") {
                Some(c) => c,
                None => continue,
            };
            if let Some(&hop_idx) = hop_idxs.iter().find(|&&h| registry.hop(h).urn == client_id) {
                if let Some(tag) = iface.attr("vlan_tag").and_then(|v| v.parse::<u16>().ok()) {
                    registry.hop_mut(hop_idx).manifest_tag = Some(tag);
                }
                if let Some(range) = iface.attr("vlan_range") {
                    if let Ok(set) = crate::vlan::TagSet::parse(range) {
                        registry.hop_mut(hop_idx).manifest_range = Some(set);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeAggregateClient;
    use crate::vlan::TagSet;

    fn setup() -> (Registry, AggIdx) {
        let mut reg = Registry::new();
        let a = reg.get_or_create_aggregate("urn:a", None);
        reg.aggregate_mut(a).url = Some("https://a.example/".to_string());
        let p = reg.get_or_create_path("link1");
        reg.add_hop(p, a, "urn:hopA", TagSet::parse("100-110").unwrap(), None);
        (reg, a)
    }

    #[test]
    fn prepare_submission_picks_a_tag() {
        let (mut reg, a) = setup();
        prepare_submission(&mut reg, a).unwrap();
        let hop = reg.hop(reg.aggregate(a).hops[0]);
        assert_eq!(hop.suggested, Some(100));
    }

    #[test]
    fn full_reservation_round_trip_via_fake_client() {
        let (mut reg, a) = setup();
        prepare_submission(&mut reg, a).unwrap();
        let sub = build_submission(&reg, a);
        let client = FakeAggregateClient::new().with_assignment("urn:hopA", 100);
        let outcome = run_submission(&client, &sub, "slice-cred");
        let transition = apply_outcome(&mut reg, a, outcome, LOCAL_RETRY_CAP);
        assert!(matches!(transition, Transition::Reserved));
        assert_eq!(reg.hop(reg.aggregate(a).hops[0]).manifest_tag, Some(100));
        assert!(reg.aggregate(a).is_reserved());
    }

    #[test]
    fn vlan_rejection_retries_then_escalates() {
        let (mut reg, a) = setup();
        reg.hop_mut(reg.aggregate(a).hops[0]).requested = TagSet::single(100);
        prepare_submission(&mut reg, a).unwrap();
        let outcome = SubmissionOutcome::VlanUnavailable { hops: vec!["urn:hopA".into()], tags: vec![100] };
        let transition = apply_outcome(&mut reg, a, outcome, LOCAL_RETRY_CAP);
        match transition {
            Transition::Escalate { hop_urn, source } => {
                assert_eq!(hop_urn, "urn:hopA");
                assert!(matches!(source, AggregateError::VlanUnavailable { .. }));
            }
            other => panic!("expected Escalate, got {:?}", other),
        }
    }
}

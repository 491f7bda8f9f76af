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

//! Drives the per-aggregate FSMs under the dependency DAG: a round is the maximal set of
//! currently-`Ready` aggregates, submitted concurrently one OS thread per aggregate, joined
//! before the next round is computed. Uses `std::thread::spawn` plus a completion channel, with
//! a single coordinating thread applying results between rounds, rather than reaching for an
//! async runtime.

use crate::amclient::AggregateClient;
use crate::error::{AggregateError, Error};
use crate::fsm::{self, Transition};
use crate::model::{AggIdx, FsmState, Registry};
use log::{debug, info, warn};
use std::sync::{mpsc, Arc};
use std::thread;

/// Why the launcher stopped before every aggregate reached `Reserved`.
#[derive(Debug)]
pub enum LauncherSignal {
    /// A path-level VLAN conflict exhausted local retries at `hop_urn`; the outer loop must
    /// re-invoke PCS excluding it.
    Escalate {
        /// Offending hop URN.
        hop_urn: String,
        /// The rejection that triggered the escalation.
        source: AggregateError,
    },
    /// An aggregate failed in a way no retry can fix; the outer loop must tear down and surface
    /// this error.
    Fatal(Error),
}

/// The "last completed" aggregate, tracked for use as the combined-manifest template (section
/// 4.7), plus the reservation order observed (useful for tests asserting ordering invariants).
#[derive(Debug, Default)]
pub struct LauncherReport {
    /// Aggregate indices in the order they reached `Reserved`, oldest first.
    pub completion_order: Vec<AggIdx>,
}

impl LauncherReport {
    /// The last aggregate to complete, if any did.
    pub fn last_completed(&self) -> Option<AggIdx> {
        self.completion_order.last().copied()
    }
}

/// Run every aggregate in `registry` to completion (all `Reserved`) or until a fatal/escalation
/// signal fires. `client` is shared across the round's worker threads.
pub fn run<C>(
    registry: &mut Registry,
    client: Arc<C>,
    slice_cred: &str,
    local_retry_cap: u32,
) -> Result<LauncherReport, LauncherSignal>
where
    C: AggregateClient + 'static,
{
    let mut report = LauncherReport::default();

    loop {
        let total = registry.aggregate_indices().count();
        let reserved = registry
            .aggregate_indices()
            .filter(|&i| registry.aggregate(i).is_reserved())
            .count();
        if reserved == total {
            return Ok(report);
        }

        let mut ready: Vec<AggIdx> = registry
            .aggregate_indices()
            .filter(|&i| {
                matches!(registry.aggregate(i).state, FsmState::Ready)
                    && registry
                        .aggregate(i)
                        .depends_on
                        .iter()
                        .all(|&d| registry.aggregate(d).is_reserved())
            })
            .collect();
        ready.sort_by_key(|&i| registry.aggregate(i).urn.clone());

        if ready.is_empty() {
            return Err(LauncherSignal::Fatal(Error::AggregateFatal {
                urn: "<scheduler>".to_string(),
                source: AggregateError::Malformed(
                    "no aggregate is ready but not every aggregate is reserved (dependency deadlock)"
                        .to_string(),
                ),
            }));
        }

        debug!("launcher round: {} aggregate(s) ready", ready.len());
        let (tx, rx) = mpsc::channel();
        let mut handles = Vec::with_capacity(ready.len());

        for &agg_idx in &ready {
            if let Err(e) = fsm::prepare_submission(registry, agg_idx) {
                return Err(LauncherSignal::Fatal(e));
            }
            registry.aggregate_mut(agg_idx).state = FsmState::Submitting;
            registry.aggregate_mut(agg_idx).attempts += 1;
            let sub = fsm::build_submission(registry, agg_idx);
            let client = Arc::clone(&client);
            let tx = tx.clone();
            let slice_cred = slice_cred.to_string();
            handles.push(thread::spawn(move || {
                let outcome = fsm::run_submission(client.as_ref(), &sub, &slice_cred);
                tx.send((agg_idx, outcome)).expect("launcher receiver outlives its senders");
            }));
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(ready.len());
        for handle in handles {
            handle.join().expect("FSM submission thread panicked");
        }
        for _ in 0..ready.len() {
            outcomes.push(rx.recv().expect("every spawned thread sends exactly one outcome"));
        }
        outcomes.sort_by_key(|(idx, _)| registry.aggregate(*idx).urn.clone());

        let mut fatal = None;
        let mut escalate = None;
        for (agg_idx, outcome) in outcomes {
            match fsm::apply_outcome(registry, agg_idx, outcome, local_retry_cap) {
                Transition::Reserved => {
                    info!("aggregate {} reached RESERVED", registry.aggregate(agg_idx).urn);
                    report.completion_order.push(agg_idx);
                }
                Transition::LocalRetry => {
                    debug!("aggregate {} retrying locally", registry.aggregate(agg_idx).urn);
                }
                Transition::Escalate { hop_urn, source } => {
                    warn!("escalating hop {} to outer loop", hop_urn);
                    escalate.get_or_insert((hop_urn, source));
                }
                Transition::Fatal(err) => {
                    let urn = registry.aggregate(agg_idx).urn.clone();
                    fatal.get_or_insert(Error::AggregateFatal { urn, source: err });
                }
            }
        }

        if let Some(err) = fatal {
            return Err(LauncherSignal::Fatal(err));
        }
        if let Some((hop_urn, source)) = escalate {
            return Err(LauncherSignal::Escalate { hop_urn, source });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeAggregateClient;
    use crate::vlan::TagSet;

    #[test]
    fn two_independent_aggregates_both_reserve() {
        let mut reg = Registry::new();
        let a = reg.get_or_create_aggregate("urn:a", None);
        reg.aggregate_mut(a).url = Some("https://a/".to_string());
        let b = reg.get_or_create_aggregate("urn:b", None);
        reg.aggregate_mut(b).url = Some("https://b/".to_string());
        let p1 = reg.get_or_create_path("link1");
        reg.add_hop(p1, a, "urn:hopA", TagSet::parse("100-110").unwrap(), None);
        let p2 = reg.get_or_create_path("link2");
        reg.add_hop(p2, b, "urn:hopB", TagSet::parse("200-210").unwrap(), None);

        let client = Arc::new(FakeAggregateClient::new());
        let report = run(&mut reg, client, "slice-cred", fsm::LOCAL_RETRY_CAP).unwrap();
        assert_eq!(report.completion_order.len(), 2);
        assert!(reg.aggregate(a).is_reserved());
        assert!(reg.aggregate(b).is_reserved());
    }

    #[test]
    fn dependent_aggregate_waits_for_its_dependency() {
        let mut reg = Registry::new();
        let a = reg.get_or_create_aggregate("urn:a", None);
        reg.aggregate_mut(a).url = Some("https://a/".to_string());
        let b = reg.get_or_create_aggregate("urn:b", None);
        reg.aggregate_mut(b).url = Some("https://b/".to_string());
        reg.add_dependency(b, a).unwrap();
        let p1 = reg.get_or_create_path("link1");
        let hop_a = reg.add_hop(p1, a, "urn:hopA", TagSet::single(100), None);
        let hop_b = reg.add_hop(p1, b, "urn:hopB", TagSet::universe(), None);
        reg.hop_mut(hop_b).import_from = Some(hop_a);

        let client = Arc::new(FakeAggregateClient::new());
        let report = run(&mut reg, client, "slice-cred", fsm::LOCAL_RETRY_CAP).unwrap();
        assert_eq!(report.completion_order, vec![a, b]);
        assert_eq!(reg.hop(hop_b).manifest_tag, reg.hop(hop_a).manifest_tag);
    }

    #[test]
    fn exhausted_retries_escalate() {
        let mut reg = Registry::new();
        let a = reg.get_or_create_aggregate("urn:a", None);
        reg.aggregate_mut(a).url = Some("https://a/".to_string());
        let p1 = reg.get_or_create_path("link1");
        reg.add_hop(p1, a, "urn:hopA", TagSet::parse("100-101").unwrap(), None);

        let client = Arc::new(
            FakeAggregateClient::new().with_rejection("urn:hopA", vec![100, 101]),
        );
        let err = run(&mut reg, client, "slice-cred", 1).unwrap_err();
        assert!(matches!(err, LauncherSignal::Escalate { .. }));
    }
}

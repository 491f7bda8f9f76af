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

//! Black-box coverage of the six end-to-end stitching scenarios, driving `stitch()` through only
//! the public API against in-memory fake PCS/aggregate clients.

use std::sync::Arc;

use stitcher::config::Config;
use stitcher::error::Error;
use stitcher::pcs::{PcsResponse, WorkflowDependency, WorkflowMap};
use stitcher::testutil::{FakeAggregateClient, FakePcs};
use stitcher::xmldoc::{Element, XmlDoc};

fn single_aggregate_request() -> XmlDoc {
    XmlDoc::parse(
        br#"<rspec>
             <node id="n0" component_manager_id="urn:agg"/>
             <node id="n1" component_manager_id="urn:agg"/>
             <link id="l0" type="vlan"><interface_ref client_id="n0"/><interface_ref client_id="n1"/></link>
           </rspec>"#,
    )
    .unwrap()
}

fn two_aggregate_request() -> XmlDoc {
    XmlDoc::parse(
        br#"<rspec>
             <node id="n0" component_manager_id="urn:aggA"/>
             <node id="n1" component_manager_id="urn:aggB"/>
             <link id="link1" type="vlan"><interface_ref client_id="n0"/><interface_ref client_id="n1"/></link>
           </rspec>"#,
    )
    .unwrap()
}

fn two_hop_workflow() -> WorkflowMap {
    let mut wf = WorkflowMap::new();
    wf.insert(
        "link1".to_string(),
        vec![WorkflowDependency {
            hop_urn: "urn:hopA".to_string(),
            aggregate_url: "https://aggA/".to_string(),
            aggregate_urn: "urn:aggA".to_string(),
            import_vlans: false,
            dependencies: vec![WorkflowDependency {
                hop_urn: "urn:hopB".to_string(),
                aggregate_url: "https://aggB/".to_string(),
                aggregate_urn: "urn:aggB".to_string(),
                import_vlans: true,
                dependencies: Vec::new(),
            }],
        }],
    );
    wf
}

/// S1: a request whose only link sits entirely within one aggregate skips PCS altogether.
#[test]
fn s1_single_aggregate_skips_pcs() {
    let doc = single_aggregate_request();
    let pcs = FakePcs::new();
    let agg = Arc::new(FakeAggregateClient::new());
    let cfg = Config::default();
    let result = stitcher::stitch(&doc, "urn:slice", "cred", &pcs, agg, &cfg).unwrap();
    assert_eq!(pcs.call_count(), 0);
    assert_eq!(result.reserved.len(), 1);
}

/// S2: a two-aggregate link with no VLAN conflicts reserves cleanly on the first PCS cycle.
#[test]
fn s2_two_aggregate_happy_path() {
    let doc = two_aggregate_request();
    let pcs = FakePcs::new().with_response(Ok(PcsResponse {
        rspec: XmlDoc::new(Element::new("rspec")),
        workflow: two_hop_workflow(),
    }));
    let agg = Arc::new(
        FakeAggregateClient::new()
            .with_assignment("urn:hopA", 100)
            .with_assignment("urn:hopB", 100),
    );
    let cfg = Config { max_scs_calls: 5, ..Config::default() };
    let result = stitcher::stitch(&doc, "urn:slice", "cred", &pcs, agg, &cfg).unwrap();
    assert_eq!(result.reserved.len(), 2);
    let link = result.manifest.root.child_named("link").unwrap();
    assert_eq!(link.children_named("interface_ref").count(), 2);
}

/// S3: a rejected tag at one hop is absorbed by a local retry, with no second PCS call.
#[test]
fn s3_vlan_conflict_then_local_retry() {
    let doc = two_aggregate_request();
    let pcs = FakePcs::new().with_response(Ok(PcsResponse {
        rspec: XmlDoc::new(Element::new("rspec")),
        workflow: two_hop_workflow(),
    }));
    let agg = Arc::new(FakeAggregateClient::new().with_rejection("urn:hopA", vec![1]));
    let cfg = Config { max_scs_calls: 5, ..Config::default() };
    let result = stitcher::stitch(&doc, "urn:slice", "cred", &pcs, agg, &cfg).unwrap();
    assert_eq!(result.reserved.len(), 2);
    assert_eq!(pcs.call_count(), 1);
}

/// S4: local retries exhaust at one hop, forcing escalation; the outer loop re-invokes PCS, which
/// routes the link around the exhausted aggregate entirely.
#[test]
fn s4_exhausted_aggregate_triggers_pcs_reinvocation_via_new_aggregate() {
    let doc = two_aggregate_request();
    let mut reinvoked_workflow = WorkflowMap::new();
    reinvoked_workflow.insert(
        "link1".to_string(),
        vec![WorkflowDependency {
            hop_urn: "urn:hopC".to_string(),
            aggregate_url: "https://aggC/".to_string(),
            aggregate_urn: "urn:aggC".to_string(),
            import_vlans: false,
            dependencies: Vec::new(),
        }],
    );
    let pcs = FakePcs::new()
        .with_response(Ok(PcsResponse {
            rspec: XmlDoc::new(Element::new("rspec")),
            workflow: two_hop_workflow(),
        }))
        .with_response(Ok(PcsResponse {
            rspec: XmlDoc::new(Element::new("rspec")),
            workflow: reinvoked_workflow,
        }));
    let agg = Arc::new(FakeAggregateClient::new().with_rejection("urn:hopA", (1..=4094).collect()));
    let cfg = Config { max_scs_calls: 3, ..Config::default() };
    let result = stitcher::stitch(&doc, "urn:slice", "cred", &pcs, agg, &cfg).unwrap();
    assert_eq!(pcs.call_count(), 2);
    assert_eq!(result.reserved, vec![("https://aggC/".to_string(), "urn:aggC".to_string())]);
}

/// S5: every candidate tag is rejected and the PCS call budget is too tight to recover; the
/// failure must surface rather than loop or panic.
#[test]
fn s5_budget_exhaustion_surfaces_root_cause() {
    let doc = two_aggregate_request();
    let pcs = FakePcs::new().with_response(Ok(PcsResponse {
        rspec: XmlDoc::new(Element::new("rspec")),
        workflow: two_hop_workflow(),
    }));
    let agg = Arc::new(FakeAggregateClient::new().with_rejection("urn:hopA", (1..=4094).collect()));
    let cfg = Config { max_scs_calls: 1, ..Config::default() };
    let err = stitcher::stitch(&doc, "urn:slice", "cred", &pcs, agg, &cfg).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("which caused stitching failure"), "message was: {}", message);
    assert!(message.contains("urn:hopA"), "message was: {}", message);
    assert!(message.to_lowercase().contains("vlan"), "message was: {}", message);
}

/// S6: a dependency cycle reported by PCS is fatal and must be caught before any aggregate is
/// contacted, let alone reserved against.
#[test]
fn s6_dependency_cycle_is_fatal_before_any_reservation() {
    let doc = two_aggregate_request();
    let mut wf = two_hop_workflow();
    wf.get_mut("link1").unwrap()[0].dependencies[0].dependencies.push(WorkflowDependency {
        hop_urn: "urn:hopA2".to_string(),
        aggregate_url: "https://aggA/".to_string(),
        aggregate_urn: "urn:aggA".to_string(),
        import_vlans: false,
        dependencies: Vec::new(),
    });
    let pcs = FakePcs::new().with_response(Ok(PcsResponse {
        rspec: XmlDoc::new(Element::new("rspec")),
        workflow: wf,
    }));
    let agg = Arc::new(FakeAggregateClient::new());
    let cfg = Config::default();
    let err = stitcher::stitch(&doc, "urn:slice", "cred", &pcs, agg.clone(), &cfg).unwrap_err();
    assert!(matches!(err, Error::DependencyCycle(_)));
    assert!(agg.reserved_slices().is_empty());
}

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

//! Combined-manifest construction (section 4.8): the core never authors a manifest from scratch,
//! it only splices aggregate-returned documents together. The last-completed aggregate's manifest
//! serves as the template document (so XML declarations/namespaces it carries survive
//! untouched); every other aggregate's hop elements are spliced into the matching `link`, creating
//! it if the template doesn't have it yet. Node ownership is structural (by `component_manager_id`
//! from the original request) rather than echoed back by any aggregate, so it is resolved directly
//! against the parsed request rather than against per-aggregate manifests.

use crate::error::Error;
use crate::launcher::LauncherReport;
use crate::model::Registry;
use crate::normalize::Request;
use crate::xmldoc::{Element, XmlDoc};

/// Build the combined manifest for a fully-reserved registry.
pub fn combine(registry: &Registry, report: &LauncherReport, req: &Request) -> Result<XmlDoc, Error> {
    let last = report
        .last_completed()
        .ok_or_else(|| Error::InputMalformed("no aggregate completed; nothing to combine".to_string()))?;

    let mut root = registry
        .aggregate(last)
        .manifest
        .as_ref()
        .map(|m| m.root.clone())
        .unwrap_or_else(|| Element::new("rspec"));

    for node in req.nodes.values() {
        root.push_child(
            Element::new("node")
                .with_attr("id", node.id.clone())
                .with_attr("component_manager_id", node.component_manager.clone()),
        );
    }

    for link in &req.links {
        let fake_ifaces: Vec<&String> = link
            .interface_refs
            .iter()
            .filter(|id| id.as_str() == crate::normalize::FIXED_ENDPOINT_INTERFACE)
            .collect();
        if link.properties.is_empty() && fake_ifaces.is_empty() {
            continue;
        }
        let out_link = find_or_create_link(&mut root, &link.id);
        for prop in &link.properties {
            let mut prop_el = Element::new("property")
                .with_attr("source_id", prop.source_id.clone())
                .with_attr("dest_id", prop.dest_id.clone());
            if let Some(capacity) = prop.capacity {
                prop_el.set_attr("capacity", capacity.to_string());
            }
            out_link.push_child(prop_el);
        }
        for iface in fake_ifaces {
            out_link.push_child(Element::new("interface_ref").with_attr("client_id", iface.clone()));
        }
    }

    for agg_idx in registry.aggregate_indices() {
        if agg_idx == last {
            continue;
        }
        let agg = registry.aggregate(agg_idx);
        if !agg.is_reserved() {
            continue;
        }
        for &hop_idx in &agg.hops {
            let hop = registry.hop(hop_idx);
            let path_id = registry.path(hop.path).id.clone();
            let link = find_or_create_link(&mut root, &path_id);
            let mut iface = Element::new("interface_ref").with_attr("client_id", hop.urn.clone());
            if let Some(tag) = hop.manifest_tag {
                iface.set_attr("vlan_tag", tag.to_string());
            }
            link.push_child(iface);
        }
    }

    Ok(XmlDoc::new(root))
}

fn find_or_create_link<'a>(root: &'a mut Element, link_id: &str) -> &'a mut Element {
    let exists = root.elements().any(|e| e.name == "link" && e.attr("id") == Some(link_id));
    if !exists {
        root.push_child(Element::new("link").with_attr("id", link_id.to_string()));
    }
    root.elements_mut().rev().find(|e| e.name == "link" && e.attr("id") == Some(link_id)).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AggIdx;
    use crate::vlan::TagSet;
    use crate::xmldoc::XmlDoc;
    use std::collections::BTreeMap;

    #[test]
    fn combines_two_aggregates_into_one_link() {
        let mut reg = Registry::new();
        let a = reg.get_or_create_aggregate("urn:a", None);
        let b = reg.get_or_create_aggregate("urn:b", None);
        let p = reg.get_or_create_path("link1");
        let hop_a = reg.add_hop(p, a, "urn:hopA", TagSet::single(100), None);
        let hop_b = reg.add_hop(p, b, "urn:hopB", TagSet::single(100), None);
        reg.hop_mut(hop_a).manifest_tag = Some(100);
        reg.hop_mut(hop_b).manifest_tag = Some(100);
        reg.aggregate_mut(a).manifest = Some(XmlDoc::parse(br#"<rspec><link id="link1"><interface_ref client_id="urn:hopA" vlan_tag="100"/></link></rspec>"#).unwrap());
        reg.aggregate_mut(a).state = crate::model::FsmState::Reserved;
        reg.aggregate_mut(b).state = crate::model::FsmState::Reserved;
        reg.aggregate_mut(b).manifest = Some(XmlDoc::parse(br#"<rspec><link id="link1"><interface_ref client_id="urn:hopB" vlan_tag="100"/></link></rspec>"#).unwrap());

        let report = LauncherReport { completion_order: vec![a as AggIdx, b as AggIdx] };
        let req = Request { nodes: BTreeMap::new(), links: Vec::new() };
        let combined = combine(&reg, &report, &req).unwrap();
        let link = combined.root.child_named("link").unwrap();
        assert_eq!(link.children_named("interface_ref").count(), 2);
    }

    #[test]
    fn combine_carries_request_capacity_properties_through_unchanged() {
        let mut reg = Registry::new();
        let a = reg.get_or_create_aggregate("urn:a", None);
        let p = reg.get_or_create_path("link1");
        let hop_a = reg.add_hop(p, a, "urn:hopA", TagSet::single(100), None);
        reg.hop_mut(hop_a).manifest_tag = Some(100);
        reg.aggregate_mut(a).manifest = Some(
            XmlDoc::parse(br#"<rspec><link id="link1"><interface_ref client_id="urn:hopA" vlan_tag="100"/></link></rspec>"#)
                .unwrap(),
        );
        reg.aggregate_mut(a).state = crate::model::FsmState::Reserved;

        let report = LauncherReport { completion_order: vec![a as AggIdx] };
        let req = Request {
            nodes: BTreeMap::new(),
            links: vec![crate::normalize::Link {
                id: "link1".to_string(),
                link_type: "vlan".to_string(),
                shared_vlan: false,
                interface_refs: vec!["n0".to_string(), "n1".to_string()],
                properties: vec![
                    crate::normalize::Property { source_id: "n0".to_string(), dest_id: "n1".to_string(), capacity: Some(1000) },
                    crate::normalize::Property { source_id: "n1".to_string(), dest_id: "n0".to_string(), capacity: Some(1000) },
                ],
            }],
        };
        let combined = combine(&reg, &report, &req).unwrap();
        let link = combined.root.child_named("link").unwrap();
        let props: Vec<&Element> = link.children_named("property").collect();
        assert_eq!(props.len(), 2);
        assert!(props.iter().all(|p| p.attr("capacity") == Some("1000")));
    }
}

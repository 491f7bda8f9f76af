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

//! Request pre-normalisation (section 4.9): decide whether PCS must be consulted at all, and
//! fill in the mirror/default capacity properties PCS and the aggregates expect to see on every
//! multi-aggregate vlan link.
//!
//! Schema validation of the request document itself is out of scope; this module assumes a
//! well-formed tree (`<rspec><node id=".." component_manager_id=".."/><link id=".." type="vlan">
//! <interface_ref client_id=".."/>...<property source_id=".." dest_id=".." capacity=".."/>
//! </link></rspec>`) and fails fast with `InputMalformed` on missing required attributes.

use crate::error::Error;
use crate::xmldoc::{Element, XmlDoc};
use std::collections::{BTreeMap, BTreeSet};

/// One node from the request: its id and the aggregate (`component_manager_id`) that owns it.
#[derive(Debug, Clone)]
pub struct Node {
    /// Node id.
    pub id: String,
    /// Owning aggregate URN.
    pub component_manager: String,
}

/// One capacity property attached to a link, in one direction.
#[derive(Debug, Clone)]
pub struct Property {
    /// Source node id.
    pub source_id: String,
    /// Destination node id.
    pub dest_id: String,
    /// Capacity in bits/sec, if the request specified one.
    pub capacity: Option<u64>,
}

/// One requested link: its interfaces (by node id, in request order) and any capacity
/// properties already present.
#[derive(Debug, Clone)]
pub struct Link {
    /// Link id.
    pub id: String,
    /// `"vlan"`, or any other value the core passes through without interpreting.
    pub link_type: String,
    /// True if the request marked this link as sharing a VLAN already established elsewhere,
    /// exempting it from the must-call-PCS check.
    pub shared_vlan: bool,
    /// Node ids of this link's `interface_ref` children, in order.
    pub interface_refs: Vec<String>,
    /// Capacity properties as given in the request, carried through unchanged so the combined
    /// manifest can splice them back in (section 4.8).
    pub properties: Vec<Property>,
}

/// Parse a link element's `<property>` children, failing fast if either endpoint id is missing.
fn parse_properties(link_el: &Element, link_id: &str) -> Result<Vec<Property>, Error> {
    link_el
        .children_named("property")
        .map(|prop_el| {
            let source_id = prop_el
                .attr("source_id")
                .ok_or_else(|| Error::InputMalformed(format!("link {} has a property with no source_id", link_id)))?
                .to_string();
            let dest_id = prop_el
                .attr("dest_id")
                .ok_or_else(|| Error::InputMalformed(format!("link {} has a property with no dest_id", link_id)))?
                .to_string();
            let capacity = prop_el.attr("capacity").and_then(|c| c.parse::<u64>().ok());
            Ok(Property { source_id, dest_id, capacity })
        })
        .collect()
}

/// A parsed, not-yet-normalised request.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Nodes by id.
    pub nodes: BTreeMap<String, Node>,
    /// Links in document order.
    pub links: Vec<Link>,
}

/// Parse the subset of the request document this module needs, failing fast on anything
/// malformed rather than silently guessing.
pub fn parse(doc: &XmlDoc) -> Result<Request, Error> {
    let mut nodes = BTreeMap::new();
    for el in doc.root.children_named("node") {
        let id = el
            .attr("id")
            .ok_or_else(|| Error::InputMalformed("node missing id".to_string()))?
            .to_string();
        let component_manager = el
            .attr("component_manager_id")
            .ok_or_else(|| Error::InputMalformed(format!("node {} missing component_manager_id", id)))?
            .to_string();
        nodes.insert(id.clone(), Node { id, component_manager });
    }

    let mut links = Vec::new();
    for el in doc.root.children_named("link") {
        let id = el
            .attr("id")
            .ok_or_else(|| Error::InputMalformed("link missing id".to_string()))?
            .to_string();
        let link_type = el.attr("type").unwrap_or("").to_string();
        let shared_vlan = el.attr("shared_vlan").map(|v| v == "true").unwrap_or(false);
        let interface_refs: Vec<String> = el
            .children_named("interface_ref")
            .map(|iface| {
                iface
                    .attr("client_id")
                    .map(str::to_string)
                    .ok_or_else(|| Error::InputMalformed(format!("link {} has an interface_ref with no client_id", id)))
            })
            .collect::<Result<_, _>>()?;
        let properties = parse_properties(el, &id)?;
        links.push(Link { id, link_type, shared_vlan, interface_refs, properties });
    }

    Ok(Request { nodes, links })
}

/// The synthetic terminal node's owning authority (section 4.9's `fixedEndpoint` feature): not a
/// real aggregate, so excluded from [`aggregates_for_link`]'s routing-relevant aggregate set.
pub const FIXED_ENDPOINT_URN: &str = "urn:publicid:IDN+fake+authority+am";
/// Node id (and `interface_ref` client id) of the synthetic terminal node.
pub const FIXED_ENDPOINT_INTERFACE: &str = "fake:if0";

/// The set of real aggregate URNs a link's interfaces resolve to. Excludes the synthetic
/// `fixedEndpoint` terminal node, which is not a reservable aggregate.
pub fn aggregates_for_link(req: &Request, link: &Link) -> Result<BTreeSet<String>, Error> {
    let aggs: BTreeSet<String> = link
        .interface_refs
        .iter()
        .map(|node_id| {
            req.nodes
                .get(node_id)
                .map(|n| n.component_manager.clone())
                .ok_or_else(|| Error::InputMalformed(format!("interface_ref references unknown node {}", node_id)))
        })
        .collect::<Result<_, _>>()?;
    Ok(aggs.into_iter().filter(|cm| cm != FIXED_ENDPOINT_URN).collect())
}

/// Insert a synthetic terminal node (component manager [`FIXED_ENDPOINT_URN`]) and wire it into
/// every link whose interfaces already resolve to exactly one real aggregate, so a
/// single-endpoint stitched link still carries a two-endpoint capacity property pair instead of
/// being passed to PCS/the aggregate with only one. A no-op if no link qualifies.
pub fn apply_fixed_endpoint(req: &mut Request, default_capacity: u64) {
    let candidates: Vec<usize> = req
        .links
        .iter()
        .enumerate()
        .filter_map(|(i, link)| {
            let aggs: BTreeSet<&str> = link
                .interface_refs
                .iter()
                .filter_map(|id| req.nodes.get(id).map(|n| n.component_manager.as_str()))
                .collect();
            (aggs.len() == 1).then_some(i)
        })
        .collect();
    if candidates.is_empty() {
        return;
    }
    req.nodes.entry(FIXED_ENDPOINT_INTERFACE.to_string()).or_insert_with(|| Node {
        id: FIXED_ENDPOINT_INTERFACE.to_string(),
        component_manager: FIXED_ENDPOINT_URN.to_string(),
    });
    for i in candidates {
        let link = &mut req.links[i];
        if link.interface_refs.iter().any(|id| id == FIXED_ENDPOINT_INTERFACE) {
            continue;
        }
        link.interface_refs.push(FIXED_ENDPOINT_INTERFACE.to_string());
        if link.properties.is_empty() {
            if let Some(real_id) = link.interface_refs.first().cloned() {
                link.properties.push(Property {
                    source_id: real_id.clone(),
                    dest_id: FIXED_ENDPOINT_INTERFACE.to_string(),
                    capacity: Some(default_capacity),
                });
                link.properties.push(Property {
                    source_id: FIXED_ENDPOINT_INTERFACE.to_string(),
                    dest_id: real_id,
                    capacity: Some(default_capacity),
                });
            }
        }
    }
}

/// True iff PCS must be invoked: at least one `vlan` link spans two or more aggregates and is
/// not marked `shared_vlan`.
pub fn must_call_pcs(req: &Request) -> Result<bool, Error> {
    for link in &req.links {
        if link.link_type != "vlan" || link.shared_vlan {
            continue;
        }
        if aggregates_for_link(req, link)?.len() >= 2 {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Ensure every multi-aggregate vlan link in `doc` carries exactly two capacity properties (one
/// per direction) between its two interfaces, synthesising the missing direction or a missing
/// capacity at `default_capacity`. Mutates `doc` in place. Fails with `InputMalformed` if a link
/// has more than two interfaces (ambiguous which pair a property names) or a property names a
/// node pair that is not this link's two interfaces.
pub fn normalize(doc: &mut XmlDoc, req: &Request, default_capacity: u64) -> Result<(), Error> {
    let link_els: Vec<&mut Element> = doc.root.elements_mut().filter(|e| e.name == "link").collect();
    for link_el in link_els {
        let id = link_el.attr("id").unwrap_or("").to_string();
        let req_link = req
            .links
            .iter()
            .find(|l| l.id == id)
            .ok_or_else(|| Error::InputMalformed(format!("link {} disappeared during normalisation", id)))?;
        if req_link.link_type != "vlan" || req_link.shared_vlan {
            continue;
        }
        let aggs = aggregates_for_link(req, req_link)?;
        if aggs.len() < 2 {
            continue;
        }
        if req_link.interface_refs.len() != 2 {
            return Err(Error::InputMalformed(format!(
                "link {} spans multiple aggregates but does not have exactly two interfaces",
                id
            )));
        }
        let (n0, n1) = (req_link.interface_refs[0].clone(), req_link.interface_refs[1].clone());

        let existing = &req_link.properties;
        for prop in existing {
            let pair_ok = (prop.source_id == n0 && prop.dest_id == n1) || (prop.source_id == n1 && prop.dest_id == n0);
            if !pair_ok {
                return Err(Error::InputMalformed(format!(
                    "link {} has a property ({} -> {}) not matching its two interfaces",
                    id, prop.source_id, prop.dest_id
                )));
            }
        }
        if existing.len() > 2 {
            return Err(Error::InputMalformed(format!(
                "link {} has more than two capacity properties",
                id
            )));
        }

        let has_forward = existing.iter().any(|p| p.source_id == n0 && p.dest_id == n1);
        let has_backward = existing.iter().any(|p| p.source_id == n1 && p.dest_id == n0);

        for prop_el in link_el.elements_mut().filter(|e| e.name == "property") {
            if prop_el.attr("capacity").is_none() {
                prop_el.set_attr("capacity", default_capacity.to_string());
            }
        }
        if !has_forward {
            link_el.push_child(
                Element::new("property")
                    .with_attr("source_id", n0.clone())
                    .with_attr("dest_id", n1.clone())
                    .with_attr("capacity", default_capacity.to_string()),
            );
        }
        if !has_backward {
            link_el.push_child(
                Element::new("property")
                    .with_attr("source_id", n1.clone())
                    .with_attr("dest_id", n0.clone())
                    .with_attr("capacity", default_capacity.to_string()),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(xml: &str) -> XmlDoc {
        XmlDoc::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn single_aggregate_link_does_not_require_pcs() {
        let d = doc(
            r#"<rspec>
                 <node id="n0" component_manager_id="urn:agg"/>
                 <node id="n1" component_manager_id="urn:agg"/>
                 <link id="l0" type="vlan"><interface_ref client_id="n0"/><interface_ref client_id="n1"/></link>
               </rspec>"#,
        );
        let req = parse(&d).unwrap();
        assert!(!must_call_pcs(&req).unwrap());
    }

    #[test]
    fn two_aggregate_link_requires_pcs() {
        let d = doc(
            r#"<rspec>
                 <node id="n0" component_manager_id="urn:aggA"/>
                 <node id="n1" component_manager_id="urn:aggB"/>
                 <link id="l0" type="vlan"><interface_ref client_id="n0"/><interface_ref client_id="n1"/></link>
               </rspec>"#,
        );
        let req = parse(&d).unwrap();
        assert!(must_call_pcs(&req).unwrap());
    }

    #[test]
    fn shared_vlan_marker_exempts_link() {
        let d = doc(
            r#"<rspec>
                 <node id="n0" component_manager_id="urn:aggA"/>
                 <node id="n1" component_manager_id="urn:aggB"/>
                 <link id="l0" type="vlan" shared_vlan="true"><interface_ref client_id="n0"/><interface_ref client_id="n1"/></link>
               </rspec>"#,
        );
        let req = parse(&d).unwrap();
        assert!(!must_call_pcs(&req).unwrap());
    }

    #[test]
    fn normalize_synthesises_missing_mirror_property() {
        let mut d = doc(
            r#"<rspec>
                 <node id="n0" component_manager_id="urn:aggA"/>
                 <node id="n1" component_manager_id="urn:aggB"/>
                 <link id="l0" type="vlan">
                   <interface_ref client_id="n0"/><interface_ref client_id="n1"/>
                   <property source_id="n0" dest_id="n1" capacity="1000"/>
                 </link>
               </rspec>"#,
        );
        let req = parse(&d).unwrap();
        normalize(&mut d, &req, 500).unwrap();
        let link = d.root.child_named("link").unwrap();
        let props: Vec<&Element> = link.children_named("property").collect();
        assert_eq!(props.len(), 2);
        let backward = props.iter().find(|p| p.attr("source_id") == Some("n1")).unwrap();
        assert_eq!(backward.attr("capacity"), Some("500"));
    }

    #[test]
    fn fixed_endpoint_wires_a_synthetic_terminal_into_single_aggregate_links() {
        let d = doc(
            r#"<rspec>
                 <node id="n0" component_manager_id="urn:agg"/>
                 <node id="n1" component_manager_id="urn:agg"/>
                 <link id="l0" type="vlan"><interface_ref client_id="n0"/><interface_ref client_id="n1"/></link>
               </rspec>"#,
        );
        let mut req = parse(&d).unwrap();
        apply_fixed_endpoint(&mut req, 500);

        assert!(req.nodes.contains_key(FIXED_ENDPOINT_INTERFACE));
        let link = &req.links[0];
        assert!(link.interface_refs.iter().any(|id| id == FIXED_ENDPOINT_INTERFACE));
        assert_eq!(link.properties.len(), 2);
        assert!(link.properties.iter().any(|p| p.dest_id == FIXED_ENDPOINT_INTERFACE && p.capacity == Some(500)));
        // Still resolves to one real aggregate, so PCS is not pulled in by the synthetic node.
        assert!(!must_call_pcs(&req).unwrap());
    }

    #[test]
    fn fixed_endpoint_leaves_multi_aggregate_links_untouched() {
        let d = doc(
            r#"<rspec>
                 <node id="n0" component_manager_id="urn:aggA"/>
                 <node id="n1" component_manager_id="urn:aggB"/>
                 <link id="l0" type="vlan"><interface_ref client_id="n0"/><interface_ref client_id="n1"/></link>
               </rspec>"#,
        );
        let mut req = parse(&d).unwrap();
        apply_fixed_endpoint(&mut req, 500);
        assert!(!req.nodes.contains_key(FIXED_ENDPOINT_INTERFACE));
        assert!(req.links[0].properties.is_empty());
    }

    #[test]
    fn contradictory_property_pair_is_fatal() {
        let mut d = doc(
            r#"<rspec>
                 <node id="n0" component_manager_id="urn:aggA"/>
                 <node id="n1" component_manager_id="urn:aggB"/>
                 <node id="n2" component_manager_id="urn:aggC"/>
                 <link id="l0" type="vlan">
                   <interface_ref client_id="n0"/><interface_ref client_id="n1"/>
                   <property source_id="n0" dest_id="n2" capacity="1000"/>
                 </link>
               </rspec>"#,
        );
        let req = parse(&d).unwrap();
        assert!(normalize(&mut d, &req, 500).is_err());
    }
}

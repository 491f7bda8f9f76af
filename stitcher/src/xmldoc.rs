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

//! A minimal, mutable XML element tree. The core never authors a document from scratch (the
//! request/manifest schema validator is out of scope); it only reads a tree produced externally
//! (the PCS response) and splices/mutates it (the combined manifest). `quick-xml` handles the
//! actual token stream; this module just gives that stream a DOM shape the rest of the crate can
//! walk and mutate.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;
use thiserror::Error;

/// Errors raised while parsing or serialising an [`XmlDoc`].
#[derive(Error, Debug, Clone)]
pub enum XmlError {
    /// The byte stream was not well-formed XML.
    #[error("malformed XML: {0}")]
    Malformed(String),
    /// Expected a single root element but found zero or more than one.
    #[error("document must have exactly one root element")]
    NoRoot,
}

/// One XML element: a tag name, its attributes (order-preserving), and ordered children which
/// are either nested elements or text nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Local tag name, including any namespace prefix as written (`"rspec"`, `"stitching"`...).
    pub name: String,
    /// Attributes in source order.
    pub attrs: Vec<(String, String)>,
    /// Child nodes.
    pub children: Vec<Node>,
}

/// A child of an [`Element`]: either another element or a text run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A nested element.
    Element(Element),
    /// A text run.
    Text(String),
}

impl Element {
    /// Construct an empty element with the given tag name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attrs: Vec::new(), children: Vec::new() }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Set (or overwrite) an attribute.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(existing) = self.attrs.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            self.attrs.push((key, value));
        }
    }

    /// Read an attribute value.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Append a child element, returning a mutable reference to it.
    pub fn push_child(&mut self, child: Element) -> &mut Element {
        self.children.push(Node::Element(child));
        match self.children.last_mut().unwrap() {
            Node::Element(e) => e,
            Node::Text(_) => unreachable!(),
        }
    }

    /// Iterate over direct child elements (skipping text nodes) with the given tag name.
    pub fn children_named<'a, 'b>(&'a self, name: &'b str) -> impl Iterator<Item = &'a Element> + 'b
    where
        'a: 'b,
    {
        self.children.iter().filter_map(move |n| match n {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Iterate over all direct child elements, regardless of name.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Mutable variant of [`Element::elements`].
    pub fn elements_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First direct child element with the given tag name.
    pub fn child_named(&self, name: &str) -> Option<&Element> {
        self.children_named(name).next()
    }
}

/// A parsed XML document: one root element plus the XML declaration, if present, carried through
/// unchanged on re-serialisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDoc {
    /// The single root element.
    pub root: Element,
}

impl XmlDoc {
    /// Wrap a root element as a document.
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    /// Parse a UTF-8 XML byte stream into a document tree.
    pub fn parse(bytes: &[u8]) -> Result<Self, XmlError> {
        let mut reader = Reader::from_reader(bytes);
        reader.trim_text(true);
        let mut buf = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event(&mut buf).map_err(|e| XmlError::Malformed(e.to_string()))? {
                Event::Start(ref e) => {
                    stack.push(element_from_start(e)?);
                }
                Event::Empty(ref e) => {
                    let el = element_from_start(e)?;
                    push_finished(&mut stack, &mut root, el)?;
                }
                Event::Text(ref t) => {
                    let text = t
                        .unescape_and_decode(&reader)
                        .map_err(|e| XmlError::Malformed(e.to_string()))?;
                    if !text.trim().is_empty() {
                        if let Some(top) = stack.last_mut() {
                            top.children.push(Node::Text(text));
                        }
                    }
                }
                Event::End(BytesEnd { .. }) => {
                    let el = stack.pop().ok_or_else(|| XmlError::Malformed("unbalanced tags".into()))?;
                    push_finished(&mut stack, &mut root, el)?;
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        root.map(XmlDoc::new).ok_or(XmlError::NoRoot)
    }

    /// Serialise back to a UTF-8 XML byte stream.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        write_element(&mut writer, &self.root);
        writer.into_inner().into_inner()
    }

    /// Serialise to a `String`; only valid for well-formed UTF-8 output, which is always the
    /// case here since every text node originated from `String`.
    pub fn to_string_pretty(&self) -> String {
        String::from_utf8(self.to_bytes()).expect("xml writer only emits valid UTF-8")
    }
}

fn element_from_start(e: &BytesStart) -> Result<Element, XmlError> {
    let name = String::from_utf8_lossy(e.name()).into_owned();
    let mut el = Element::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XmlError::Malformed(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key).into_owned();
        let value = attr
            .unescaped_value()
            .map_err(|err| XmlError::Malformed(err.to_string()))?;
        let value = String::from_utf8_lossy(&value).into_owned();
        el.attrs.push((key, value));
    }
    Ok(el)
}

fn push_finished(
    stack: &mut [Element],
    root: &mut Option<Element>,
    el: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None => {
            if root.is_some() {
                return Err(XmlError::Malformed("multiple root elements".into()));
            }
            *root = Some(el);
        }
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Cursor<Vec<u8>>>, el: &Element) {
    let mut start = BytesStart::borrowed_name(el.name.as_bytes());
    for (k, v) in &el.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if el.children.is_empty() {
        writer.write_event(Event::Empty(start)).expect("in-memory writer cannot fail");
    } else {
        writer.write_event(Event::Start(start)).expect("in-memory writer cannot fail");
        for child in &el.children {
            match child {
                Node::Element(e) => write_element(writer, e),
                Node::Text(t) => {
                    writer
                        .write_event(Event::Text(BytesText::from_plain_str(t)))
                        .expect("in-memory writer cannot fail");
                }
            }
        }
        writer
            .write_event(Event::End(BytesEnd::borrowed(el.name.as_bytes())))
            .expect("in-memory writer cannot fail");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_reserialize_roundtrip() {
        let xml = r#"<rspec><node id="a"><interface id="i1"/></node></rspec>"#;
        let doc = XmlDoc::parse(xml.as_bytes()).unwrap();
        assert_eq!(doc.root.name, "rspec");
        let node = doc.root.child_named("node").unwrap();
        assert_eq!(node.attr("id"), Some("a"));
        assert_eq!(node.child_named("interface").unwrap().attr("id"), Some("i1"));
    }

    #[test]
    fn mutate_and_serialize() {
        let mut root = Element::new("rspec");
        root.push_child(Element::new("node").with_attr("id", "x"));
        let doc = XmlDoc::new(root);
        let out = doc.to_string_pretty();
        assert!(out.contains("node"));
        assert!(out.contains("id=\"x\""));
    }
}

#![forbid(unsafe_code)]

//! Shared rendering for all canonicalization variants.
//!
//! The variants differ only in which namespace declarations an output
//! element carries and whether `xml:*` attributes are inherited by apex
//! elements of a document subset. Both decisions are delegated to a
//! [`NamespacePolicy`]; everything else (ordering, escaping, comments,
//! processing instructions) lives here.

use crate::escape;
use roxmltree::{Node, NodeType};
use stenhamra_core::{ns, Error};
use stenhamra_xml::qname::{PrefixTable, StartTag};
use stenhamra_xml::NodeSet;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Prefix → namespace URI. The default namespace uses the empty prefix.
pub type NsMap = BTreeMap<String, String>;

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// The prefix ("" for default namespace).
    pub prefix: String,
    /// The namespace URI ("" undeclares the default namespace).
    pub uri: String,
}

impl NsDecl {
    pub fn new(prefix: &str, uri: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
            uri: uri.to_owned(),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        if self.prefix.is_empty() {
            out.extend_from_slice(b" xmlns=\"");
        } else {
            out.extend_from_slice(b" xmlns:");
            out.extend_from_slice(self.prefix.as_bytes());
            out.extend_from_slice(b"=\"");
        }
        out.extend_from_slice(escape::escape_attr(&self.uri).as_bytes());
        out.push(b'"');
    }
}

impl Ord for NsDecl {
    fn cmp(&self, other: &Self) -> Ordering {
        // Default namespace first, then by prefix.
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.prefix.cmp(&other.prefix),
        }
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// Namespace URI ("" for no namespace).
    pub ns_uri: String,
    pub local_name: String,
    /// Name as written, `prefix:local` or `local`.
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    fn write(&self, out: &mut Vec<u8>) {
        out.push(b' ');
        out.extend_from_slice(self.qualified_name.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(escape::escape_attr(&self.value).as_bytes());
        out.push(b'"');
    }
}

impl Ord for Attr {
    fn cmp(&self, other: &Self) -> Ordering {
        // Unqualified attributes first, then by (namespace URI, local name).
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, true) => self.local_name.cmp(&other.local_name),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .ns_uri
                .cmp(&other.ns_uri)
                .then_with(|| self.local_name.cmp(&other.local_name)),
        }
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Variant-specific namespace and attribute decisions.
pub(crate) trait NamespacePolicy {
    /// Declarations to render on an output element, given what the nearest
    /// output ancestor has in effect. Returns the declarations and the map
    /// that output descendants inherit.
    fn declarations(
        &self,
        node: Node<'_, '_>,
        tag: &StartTag,
        rendered: &NsMap,
    ) -> (Vec<NsDecl>, NsMap);

    /// Local names of `xml:*` attributes an apex element of a document
    /// subset picks up from its ancestors.
    fn inherited_xml_attr(&self, _local: &str) -> bool {
        false
    }
}

/// Walk the document and produce canonical bytes.
pub(crate) fn render_document<P: NamespacePolicy>(
    doc: &roxmltree::Document<'_>,
    policy: &P,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    let mut renderer = Renderer {
        policy,
        with_comments,
        node_set,
        prefixes: PrefixTable::build(doc)?,
        out: Vec::new(),
    };
    renderer.process_node(doc.root(), &NsMap::new())?;
    Ok(renderer.out)
}

struct Renderer<'a, P> {
    policy: &'a P,
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    prefixes: PrefixTable,
    out: Vec<u8>,
}

impl<P: NamespacePolicy> Renderer<'_, P> {
    fn is_visible(&self, node: &Node<'_, '_>) -> bool {
        self.node_set.map_or(true, |set| set.contains(node))
    }

    fn process_node(&mut self, node: Node<'_, '_>, rendered: &NsMap) -> Result<(), Error> {
        match node.node_type() {
            NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, rendered)?;
                }
            }
            NodeType::Element => self.process_element(node, rendered)?,
            NodeType::Text => {
                if self.is_visible(&node) {
                    let text = node.text().unwrap_or("");
                    self.out
                        .extend_from_slice(escape::escape_text(text).as_bytes());
                }
            }
            NodeType::Comment => {
                if self.with_comments && self.is_visible(&node) {
                    let body = format!("<!--{}-->", node.text().unwrap_or(""));
                    self.write_top_level_aware(node, &body);
                }
            }
            NodeType::PI => {
                if self.is_visible(&node) {
                    if let Some(pi) = node.pi() {
                        let body = match pi.value.filter(|v| !v.is_empty()) {
                            Some(value) => {
                                format!("<?{} {}?>", pi.target, escape::escape_pi(value))
                            }
                            None => format!("<?{}?>", pi.target),
                        };
                        self.write_top_level_aware(node, &body);
                    }
                }
            }
        }
        Ok(())
    }

    /// Comments and PIs outside the document element are separated from
    /// it by a single line feed.
    fn write_top_level_aware(&mut self, node: Node<'_, '_>, body: &str) {
        let top_level = node
            .parent()
            .is_some_and(|p| p.node_type() == NodeType::Root);
        if top_level && node.prev_siblings().any(|s| s.is_element()) {
            self.out.push(b'\n');
        }
        self.out.extend_from_slice(body.as_bytes());
        if top_level && node.next_siblings().any(|s| s.is_element()) {
            self.out.push(b'\n');
        }
    }

    fn process_element(&mut self, node: Node<'_, '_>, rendered: &NsMap) -> Result<(), Error> {
        if !self.is_visible(&node) {
            // Output descendants still relate to the nearest output ancestor.
            for child in node.children() {
                self.process_node(child, rendered)?;
            }
            return Ok(());
        }

        let tag = self.prefixes.start_tag(node)?.clone();
        let (mut ns_decls, child_rendered) = self.policy.declarations(node, &tag, rendered);
        ns_decls.sort();

        let mut attrs = element_attrs(node, &tag);
        if self.node_set.is_some() {
            let parent_visible = node
                .parent()
                .is_some_and(|p| p.is_element() && self.is_visible(&p));
            if !parent_visible {
                self.inherit_xml_attrs(node, &mut attrs);
            }
        }
        attrs.sort();

        self.out.push(b'<');
        self.out.extend_from_slice(tag.name.as_bytes());
        for decl in &ns_decls {
            decl.write(&mut self.out);
        }
        for attr in &attrs {
            attr.write(&mut self.out);
        }
        self.out.push(b'>');

        for child in node.children() {
            self.process_node(child, &child_rendered)?;
        }

        self.out.extend_from_slice(b"</");
        self.out.extend_from_slice(tag.name.as_bytes());
        self.out.push(b'>');
        Ok(())
    }

    /// Nearest ancestor value wins; attributes already on the element stay.
    fn inherit_xml_attrs(&self, node: Node<'_, '_>, attrs: &mut Vec<Attr>) {
        let mut inherited: BTreeMap<&str, &str> = BTreeMap::new();
        for ancestor in node.ancestors().skip(1).filter(|n| n.is_element()) {
            for attr in ancestor.attributes() {
                if attr.namespace() == Some(ns::XML)
                    && self.policy.inherited_xml_attr(attr.name())
                {
                    inherited.entry(attr.name()).or_insert(attr.value());
                }
            }
        }
        for (local, value) in inherited {
            let present = attrs
                .iter()
                .any(|a| a.ns_uri == ns::XML && a.local_name == local);
            if !present {
                attrs.push(Attr {
                    ns_uri: ns::XML.to_owned(),
                    local_name: local.to_owned(),
                    qualified_name: format!("xml:{local}"),
                    value: value.to_owned(),
                });
            }
        }
    }
}

fn element_attrs(node: Node<'_, '_>, tag: &StartTag) -> Vec<Attr> {
    node.attributes()
        .enumerate()
        .map(|(i, attr)| Attr {
            ns_uri: attr.namespace().unwrap_or("").to_owned(),
            local_name: attr.name().to_owned(),
            qualified_name: tag
                .attributes
                .get(i)
                .cloned()
                .unwrap_or_else(|| attr.name().to_owned()),
            value: attr.value().to_owned(),
        })
        .collect()
}

/// In-scope namespaces of an element, excluding the `xml` prefix and an
/// undeclared (empty) default namespace.
pub(crate) fn inscope_namespaces(node: Node<'_, '_>) -> NsMap {
    let mut levels: Vec<Node<'_, '_>> = node.ancestors().filter(|n| n.is_element()).collect();
    levels.reverse();

    let mut result = NsMap::new();
    for level in levels {
        for decl in level.namespaces() {
            let prefix = decl.name().unwrap_or("");
            if prefix == "xml" {
                continue;
            }
            if decl.uri().is_empty() {
                result.remove(prefix);
            } else {
                result.insert(prefix.to_owned(), decl.uri().to_owned());
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ns_decl_order() {
        let mut decls = vec![
            NsDecl::new("b", "urn:b"),
            NsDecl::new("", "urn:d"),
            NsDecl::new("a", "urn:a"),
        ];
        decls.sort();
        let prefixes: Vec<_> = decls.iter().map(|d| d.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["", "a", "b"]);
    }

    #[test]
    fn test_attr_order() {
        let attr = |ns: &str, local: &str| Attr {
            ns_uri: ns.into(),
            local_name: local.into(),
            qualified_name: local.into(),
            value: String::new(),
        };
        let mut attrs = vec![attr("urn:b", "a"), attr("", "z"), attr("urn:a", "z"), attr("", "b")];
        attrs.sort();
        let keys: Vec<_> = attrs
            .iter()
            .map(|a| format!("{}|{}", a.ns_uri, a.local_name))
            .collect();
        assert_eq!(keys, vec!["|b", "|z", "urn:a|z", "urn:b|a"]);
    }

    #[test]
    fn test_inscope_namespaces() {
        let doc = stenhamra_xml::parse(
            r#"<r xmlns="urn:d" xmlns:p="urn:p"><s xmlns=""><t xmlns:p="urn:q"/></s></r>"#,
        )
        .unwrap();
        let t = doc.descendants().find(|n| n.has_tag_name("t")).unwrap();
        let map = inscope_namespaces(t);
        assert_eq!(map.get("p").map(String::as_str), Some("urn:q"));
        assert!(!map.contains_key(""));
        assert!(!map.contains_key("xml"));
    }
}

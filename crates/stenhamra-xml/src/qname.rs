#![forbid(unsafe_code)]

//! Qualified names as written in the source document.
//!
//! roxmltree exposes expanded names (namespace URI + local name) only.
//! Canonical XML must reproduce the prefixes the author wrote, and two
//! prefixes may be bound to the same URI, so the prefix cannot be derived
//! from the namespace. The text is parsed a second time with uppsala,
//! which keeps prefixes, and its elements are paired with roxmltree's in
//! document order.

use roxmltree::{Node, NodeId};
use stenhamra_core::{ns, Error};
use std::collections::HashMap;

/// Qualified names of an element and its (non-namespace) attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    /// Element name as written (`ds:Signature` or `Signature`).
    pub name: String,
    /// Attribute names as written, aligned with
    /// `roxmltree::Node::attributes()`.
    pub attributes: Vec<String>,
}

impl StartTag {
    /// Prefix of the element name, `""` when unprefixed.
    pub fn prefix(&self) -> &str {
        split_prefix(&self.name).0
    }

    /// Prefix of the i-th attribute, `None` when unprefixed.
    pub fn attribute_prefix(&self, index: usize) -> Option<&str> {
        let (prefix, _) = split_prefix(self.attributes.get(index)?);
        (!prefix.is_empty()).then_some(prefix)
    }
}

/// Split `p:local` into `("p", "local")`; unprefixed names give `("", name)`.
pub fn split_prefix(qname: &str) -> (&str, &str) {
    match qname.split_once(':') {
        Some((p, l)) => (p, l),
        None => ("", qname),
    }
}

/// Start tags of every element of a parsed document.
#[derive(Debug, Default)]
pub struct PrefixTable {
    tags: HashMap<NodeId, StartTag>,
}

/// Name parts of one uppsala element, owned so the uppsala tree can go.
struct WrittenElement {
    prefix: Option<String>,
    local: String,
    /// (namespace URI, local name, prefix) per attribute.
    attributes: Vec<(String, String, Option<String>)>,
}

impl PrefixTable {
    /// Recover the written names for every element of `doc`.
    ///
    /// Fails when the two parsers disagree on the element structure
    /// (e.g. elements produced by entity expansion), since prefixes
    /// would otherwise be guessed.
    pub fn build(doc: &roxmltree::Document<'_>) -> Result<Self, Error> {
        let written = written_elements(doc.input_text())?;
        let elements: Vec<Node<'_, '_>> = doc.descendants().filter(|n| n.is_element()).collect();
        if elements.len() != written.len() {
            return Err(Error::Canonicalization(format!(
                "element structure differs between parsers ({} vs {} elements)",
                elements.len(),
                written.len()
            )));
        }

        let mut tags = HashMap::with_capacity(elements.len());
        for (node, w) in elements.into_iter().zip(written) {
            if node.tag_name().name() != w.local {
                return Err(Error::Canonicalization(format!(
                    "element <{}> does not line up with source <{}>",
                    node.tag_name().name(),
                    w.local
                )));
            }
            let name = qualify(w.prefix.as_deref(), &w.local);
            let mut attributes = Vec::new();
            for attr in node.attributes() {
                let uri = attr.namespace().unwrap_or("");
                let (_, _, prefix) = w
                    .attributes
                    .iter()
                    .find(|(a_uri, a_local, _)| a_uri == uri && a_local == attr.name())
                    .ok_or_else(|| {
                        Error::Canonicalization(format!(
                            "attribute {} of <{}> missing from source",
                            attr.name(),
                            node.tag_name().name()
                        ))
                    })?;
                attributes.push(qualify(prefix.as_deref(), attr.name()));
            }
            tags.insert(node.id(), StartTag { name, attributes });
        }
        Ok(Self { tags })
    }

    /// Start tag of an element of the document the table was built from.
    pub fn start_tag(&self, node: Node<'_, '_>) -> Result<&StartTag, Error> {
        self.tags.get(&node.id()).ok_or_else(|| {
            Error::Canonicalization(format!("no start tag for <{}>", node.tag_name().name()))
        })
    }
}

fn qualify(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}:{local}"),
        _ => local.to_owned(),
    }
}

fn written_elements(text: &str) -> Result<Vec<WrittenElement>, Error> {
    let doc = uppsala::parse(text).map_err(|e| Error::XmlParse(e.to_string()))?;
    let mut out = Vec::new();
    for id in doc.descendants(doc.root()) {
        let Some(elem) = doc.element(id) else {
            continue;
        };
        let attributes = elem
            .attributes
            .iter()
            .map(|attr| {
                let uri = attr.name.namespace_uri.as_deref().unwrap_or("");
                let prefix = if uri == ns::XML {
                    Some("xml".to_owned())
                } else {
                    attr.name.prefix.as_deref().map(str::to_owned)
                };
                (uri.to_owned(), attr.name.local_name.to_string(), prefix)
            })
            .collect();
        out.push(WrittenElement {
            prefix: elem.name.prefix.as_deref().map(str::to_owned),
            local: elem.name.local_name.to_string(),
            attributes,
        });
    }
    Ok(out)
}

#![forbid(unsafe_code)]

//! XML document wrapper over roxmltree with ID attribute registration.

use stenhamra_core::Error;
use std::collections::HashMap;

/// Default attribute names treated as element IDs.
pub const DEFAULT_ID_ATTRS: [&str; 3] = ["Id", "ID", "id"];

/// An owned XML document: the text plus the ID attribute names in effect.
///
/// To work with the parsed tree, call [`XmlDocument::parse_doc`] which
/// returns a `roxmltree::Document` borrowing from the text. Well-formedness
/// is checked there.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    text: String,
    /// Additional ID attribute names to register (beyond the default `Id`, `ID`, `id`).
    extra_id_attrs: Vec<String>,
}

impl XmlDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            extra_id_attrs: Vec::new(),
        }
    }

    /// Get the raw XML text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Register additional ID attribute names (e.g., `"wsu:Id"`).
    pub fn add_id_attr(&mut self, name: &str) {
        self.extra_id_attrs.push(name.to_owned());
    }

    /// Parse the document and return a temporary `roxmltree::Document`.
    ///
    /// This re-parses the XML from the stored text.  Call it once at the top
    /// of a processing pipeline and pass the resulting document down.
    pub fn parse_doc(&self) -> Result<roxmltree::Document<'_>, Error> {
        crate::parse(&self.text)
    }

    /// Build the ID → NodeId mapping for a parsed document.
    pub fn build_id_map(&self, doc: &roxmltree::Document<'_>) -> HashMap<String, roxmltree::NodeId> {
        let extra: Vec<&str> = self.extra_id_attrs.iter().map(String::as_str).collect();
        build_id_map(doc, &extra)
    }
}

/// Build an ID → NodeId map from the default ID attribute names plus `extra`.
///
/// Attribute names may be given with a prefix (`wsu:Id`); only the local
/// part is compared. When an ID value occurs twice, the first element in
/// document order keeps it.
pub fn build_id_map(
    doc: &roxmltree::Document<'_>,
    extra: &[&str],
) -> HashMap<String, roxmltree::NodeId> {
    let names: Vec<&str> = DEFAULT_ID_ATTRS
        .iter()
        .copied()
        .chain(extra.iter().map(|n| n.rsplit(':').next().unwrap_or(n)))
        .collect();

    let mut map = HashMap::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        for attr in node.attributes() {
            if names.contains(&attr.name()) {
                map.entry(attr.value().to_owned()).or_insert(node.id());
            }
        }
    }
    map
}

/// Find the first descendant element (document order) with the given
/// namespace and local name.
pub fn find_element<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    ns_uri: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    doc.descendants().find(|n| is_element_named(*n, ns_uri, local_name))
}

/// Find the first child element with the given namespace and local name.
pub fn find_child_element<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    ns_uri: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    parent
        .children()
        .find(|n| is_element_named(*n, ns_uri, local_name))
}

/// Find all child elements with the given namespace and local name.
pub fn find_child_elements<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    ns_uri: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'input>> {
    parent
        .children()
        .filter(|n| is_element_named(*n, ns_uri, local_name))
        .collect()
}

/// Check an element's expanded name.
pub fn is_element_named(node: roxmltree::Node<'_, '_>, ns_uri: &str, local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node.tag_name().namespace().unwrap_or("") == ns_uri
}

/// Text content of an element with all whitespace removed (base64 payloads).
pub fn compact_text(node: roxmltree::Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .flat_map(|t| t.chars())
        .filter(|c| !c.is_whitespace())
        .collect()
}

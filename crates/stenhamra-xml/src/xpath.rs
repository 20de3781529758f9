#![forbid(unsafe_code)]

//! Minimal XPointer/XPath subset for XML-DSig reference URIs.
//!
//! Only supports the patterns actually used by XML-DSig references:
//! - Same-document URI references: `#id-value`
//! - `#xpointer(/)`: the whole document, comments included
//! - `#xpointer(id('...'))`: an element by registered ID, comments included
//! - The ancestor-or-self axis (needed for the enveloped transform)

use stenhamra_core::Error;
use std::collections::HashMap;

/// A parsed same-document reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameDocumentRef<'a> {
    /// `URI=""`: the document without comments.
    WholeDocument,
    /// `#xpointer(/)`: the document with comments.
    XPointerRoot,
    /// `#id`: the identified subtree without comments.
    Id(&'a str),
    /// `#xpointer(id('id'))`: the identified subtree with comments.
    XPointerId(&'a str),
}

impl SameDocumentRef<'_> {
    /// Whether comment nodes stay in the selected node set.
    pub fn keeps_comments(&self) -> bool {
        matches!(self, Self::XPointerRoot | Self::XPointerId(_))
    }
}

/// Classify a reference URI; `None` means it is not a same-document reference.
pub fn classify(uri: &str) -> Option<SameDocumentRef<'_>> {
    if uri.is_empty() {
        return Some(SameDocumentRef::WholeDocument);
    }
    let fragment = parse_same_document_ref(uri)?;
    if fragment == "xpointer(/)" {
        return Some(SameDocumentRef::XPointerRoot);
    }
    if let Some(id) = parse_xpointer_id(fragment) {
        return Some(SameDocumentRef::XPointerId(id));
    }
    Some(SameDocumentRef::Id(fragment))
}

/// Parse a same-document reference (e.g., `#foo` → `foo`).
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    uri.strip_prefix('#')
}

/// Parse an `xpointer(id('...'))` expression and return the ID value.
/// Both quote styles are accepted.
pub fn parse_xpointer_id(expr: &str) -> Option<&str> {
    let inner = expr.strip_prefix("xpointer(id(")?.strip_suffix("))")?;
    inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
}

/// Resolve an ID value in a parsed document using a pre-built ID map.
pub fn resolve_id<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    id_map: &HashMap<String, roxmltree::NodeId>,
    id: &str,
) -> Result<roxmltree::Node<'a, 'input>, Error> {
    id_map
        .get(id)
        .and_then(|nid| doc.get_node(*nid))
        .ok_or_else(|| Error::InvalidUri(format!("ID not found: {id}")))
}

/// Check if `ancestor` is an ancestor-or-self of `node`.
pub fn is_ancestor_or_self(
    ancestor: roxmltree::Node<'_, '_>,
    node: roxmltree::Node<'_, '_>,
) -> bool {
    node.ancestors().any(|n| n.id() == ancestor.id())
}

#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.1 (C14N 1.1).
//!
//! Algorithm URI: `http://www.w3.org/2006/12/xml-c14n11`
//! With comments: `http://www.w3.org/2006/12/xml-c14n11#WithComments`
//!
//! Identical to C14N 1.0 except that `xml:id` is not inherited by apex
//! elements of a document subset. Inherited `xml:base` values are copied
//! as-is, without relative URI joining.

use crate::inclusive::Inclusive;
use crate::render;
use stenhamra_core::Error;
use stenhamra_xml::NodeSet;

/// Canonicalize using Inclusive C14N 1.1.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    let policy = Inclusive {
        inherit_xml_id: false,
    };
    render::render_document(doc, &policy, with_comments, node_set)
}

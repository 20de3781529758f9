#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 (C14N 1.0).
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! Every output element carries the in-scope namespaces that differ from
//! those of its nearest output ancestor. Apex elements of a document subset
//! inherit all `xml:*` attributes of their ancestors.

use crate::render::{self, NamespacePolicy, NsDecl, NsMap};
use roxmltree::Node;
use stenhamra_core::Error;
use stenhamra_xml::qname::StartTag;
use stenhamra_xml::NodeSet;

/// Canonicalize a document using Inclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    let policy = Inclusive {
        inherit_xml_id: true,
    };
    render::render_document(doc, &policy, with_comments, node_set)
}

pub(crate) struct Inclusive {
    pub(crate) inherit_xml_id: bool,
}

impl NamespacePolicy for Inclusive {
    fn declarations(
        &self,
        node: Node<'_, '_>,
        _tag: &StartTag,
        rendered: &NsMap,
    ) -> (Vec<NsDecl>, NsMap) {
        let current = render::inscope_namespaces(node);
        let mut decls: Vec<NsDecl> = current
            .iter()
            .filter(|(prefix, uri)| rendered.get(*prefix) != Some(*uri))
            .map(|(prefix, uri)| NsDecl::new(prefix, uri))
            .collect();

        let inherited_default = rendered.get("").is_some_and(|uri| !uri.is_empty());
        if inherited_default && !current.contains_key("") {
            decls.push(NsDecl::new("", ""));
        }
        (decls, current)
    }

    fn inherited_xml_attr(&self, local: &str) -> bool {
        self.inherit_xml_id || local != "id"
    }
}

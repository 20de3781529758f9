#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! Only "visibly utilized" namespace declarations are output: the prefix of
//! the element name (the default namespace for unprefixed elements), the
//! prefixes of its attributes, and the InclusiveNamespaces PrefixList, for
//! which `#default` names the default namespace.

use crate::render::{self, NamespacePolicy, NsDecl, NsMap};
use roxmltree::Node;
use stenhamra_core::Error;
use stenhamra_xml::qname::StartTag;
use stenhamra_xml::NodeSet;
use std::collections::BTreeSet;

/// Canonicalize using Exclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let policy = Exclusive {
        inclusive_prefixes: inclusive_prefixes
            .iter()
            .map(|p| if p == "#default" { String::new() } else { p.clone() })
            .collect(),
    };
    render::render_document(doc, &policy, with_comments, node_set)
}

struct Exclusive {
    inclusive_prefixes: BTreeSet<String>,
}

impl NamespacePolicy for Exclusive {
    fn declarations(
        &self,
        node: Node<'_, '_>,
        tag: &StartTag,
        rendered: &NsMap,
    ) -> (Vec<NsDecl>, NsMap) {
        let mut utilized: BTreeSet<&str> = self.inclusive_prefixes.iter().map(String::as_str).collect();
        utilized.insert(tag.prefix());
        for i in 0..tag.attributes.len() {
            if let Some(prefix) = tag.attribute_prefix(i) {
                utilized.insert(prefix);
            }
        }
        utilized.remove("xml");

        let inscope = render::inscope_namespaces(node);
        let mut decls = Vec::new();
        let mut child_rendered = rendered.clone();
        for prefix in utilized {
            match inscope.get(prefix) {
                Some(uri) => {
                    if rendered.get(prefix) != Some(uri) {
                        decls.push(NsDecl::new(prefix, uri));
                        child_rendered.insert(prefix.to_owned(), uri.clone());
                    }
                }
                None if prefix.is_empty() => {
                    if rendered.get("").is_some_and(|uri| !uri.is_empty()) {
                        decls.push(NsDecl::new("", ""));
                        child_rendered.remove("");
                    }
                }
                None => {}
            }
        }
        (decls, child_rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exc(xml: &str, subtree: Option<&str>, prefixes: &[&str]) -> String {
        let doc = stenhamra_xml::parse(xml).unwrap();
        let set = subtree.map(|name| {
            let node = doc
                .descendants()
                .find(|n| n.is_element() && n.tag_name().name() == name)
                .unwrap();
            NodeSet::tree_without_comments(node)
        });
        let prefixes: Vec<String> = prefixes.iter().map(|p| p.to_string()).collect();
        String::from_utf8(canonicalize(&doc, false, set.as_ref(), &prefixes).unwrap()).unwrap()
    }

    #[test]
    fn test_written_prefix_kept_when_uris_coincide() {
        let xml = r#"<a:r xmlns:a="urn:x" xmlns:b="urn:x"><b:s a:k="1"/></a:r>"#;
        assert_eq!(
            exc(xml, Some("s"), &[]),
            r#"<b:s xmlns:a="urn:x" xmlns:b="urn:x" a:k="1"></b:s>"#
        );
    }

    #[test]
    fn test_unused_namespaces_dropped() {
        let xml = r#"<r xmlns:a="urn:a" xmlns:u="urn:unused"><a:s><t/></a:s></r>"#;
        assert_eq!(
            exc(xml, Some("s"), &[]),
            r#"<a:s xmlns:a="urn:a"><t></t></a:s>"#
        );
    }

    #[test]
    fn test_declared_where_first_used() {
        let xml = r#"<r xmlns:a="urn:a" xmlns:b="urn:b"><s b:k="v"><a:t/></s></r>"#;
        assert_eq!(
            exc(xml, None, &[]),
            r#"<r><s xmlns:b="urn:b" b:k="v"><a:t xmlns:a="urn:a"></a:t></s></r>"#
        );
    }

    #[test]
    fn test_inclusive_prefix_list() {
        let xml = r#"<r xmlns="urn:d" xmlns:u="urn:u"><s/></r>"#;
        assert_eq!(
            exc(xml, Some("s"), &["u"]),
            r#"<s xmlns="urn:d" xmlns:u="urn:u"></s>"#
        );
        assert_eq!(
            exc(r#"<p:r xmlns:p="urn:p" xmlns="urn:d"><p:s/></p:r>"#, Some("s"), &["#default"]),
            r#"<p:s xmlns="urn:d" xmlns:p="urn:p"></p:s>"#
        );
    }

    #[test]
    fn test_default_namespace_undeclared() {
        let xml = r#"<r xmlns="urn:d"><s xmlns=""/></r>"#;
        assert_eq!(exc(xml, None, &[]), r#"<r xmlns="urn:d"><s xmlns=""></s></r>"#);
    }

    #[test]
    fn test_no_xml_attr_inheritance() {
        let xml = r#"<r xml:lang="en"><s/></r>"#;
        assert_eq!(exc(xml, Some("s"), &[]), "<s></s>");
    }
}

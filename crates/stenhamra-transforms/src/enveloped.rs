#![forbid(unsafe_code)]

//! Enveloped signature transform and the XPath filters that express it.
//!
//! Removes `<ds:Signature>` subtrees from the node set. The general XPath
//! transform is not supported; only the two filter expressions that
//! signers use to exclude signatures are recognised.

use crate::pipeline::{Transform, TransformData};
use roxmltree::{Document, Node, NodeId};
use std::sync::Arc;
use stenhamra_core::{algorithm, ns, Error};
use stenhamra_xml::document::{find_child_element, is_element_named};
use stenhamra_xml::NodeSet;

/// A `<ds:Signature>` element and the text of the document holding it.
///
/// Node ids only mean something within one document, so the text is kept
/// to reject inputs that came from elsewhere.
#[derive(Debug, Clone)]
pub struct EnclosingSignature {
    node: NodeId,
    document: Arc<str>,
}

impl EnclosingSignature {
    pub fn new(node: NodeId, document: impl Into<Arc<str>>) -> Self {
        Self {
            node,
            document: document.into(),
        }
    }

    /// Find the signature in `doc`, which was parsed from `text`.
    fn locate<'a, 'i>(&self, text: &str, doc: &'a Document<'i>) -> Result<Node<'a, 'i>, Error> {
        if *self.document != *text {
            return Err(Error::Transform(
                "enveloped-signature input is not the signature's document".into(),
            ));
        }
        doc.get_node(self.node)
            .filter(|n| is_element_named(*n, ns::DSIG, ns::node::SIGNATURE))
            .ok_or_else(|| {
                Error::Transform("input does not contain the enveloping signature".into())
            })
    }
}

/// The enveloped signature transform: removes the enclosing `<Signature>`
/// element and its descendants from the node set.
pub struct EnvelopedSignatureTransform {
    signature: Option<EnclosingSignature>,
}

impl EnvelopedSignatureTransform {
    pub fn new(signature: Option<EnclosingSignature>) -> Self {
        Self { signature }
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let enclosing = self.signature.as_ref().ok_or_else(|| {
            Error::Transform("enveloped-signature transform outside a signature".into())
        })?;
        let (xml_text, node_set) = input.into_xml()?;
        let node_set = {
            let doc = stenhamra_xml::parse(&xml_text)?;
            let signature = enclosing.locate(&xml_text, &doc)?;
            let mut set = node_set.unwrap_or_else(|| NodeSet::all(&doc));
            set.remove_subtree(signature);
            set
        };
        Ok(TransformData::Xml {
            xml_text,
            node_set: Some(node_set),
        })
    }
}

/// Which signatures an XPath filter removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum XPathFilter {
    /// `not(ancestor-or-self::ds:Signature)`
    AllSignatures,
    /// `count(ancestor-or-self::ds:Signature | here()/ancestor::ds:Signature[1])
    ///  > count(ancestor-or-self::ds:Signature)`
    EnclosingSignature,
}

/// XPath filtering restricted to signature-exclusion expressions.
pub struct EnvelopedXPathTransform {
    filter: XPathFilter,
    signature: Option<EnclosingSignature>,
}

impl EnvelopedXPathTransform {
    /// Read the `<ds:XPath>` child of a transform element.
    pub fn from_element(
        transform: Node<'_, '_>,
        signature: Option<EnclosingSignature>,
    ) -> Result<Self, Error> {
        let xpath = find_child_element(transform, ns::DSIG, ns::node::XPATH)
            .ok_or_else(|| Error::MissingElement("XPath".into()))?;
        let expr = xpath.text().unwrap_or("");
        let is_dsig = |prefix: &str| xpath.lookup_namespace_uri(Some(prefix)) == Some(ns::DSIG);
        let filter = parse_filter(expr, is_dsig).ok_or_else(|| {
            Error::UnsupportedAlgorithm(format!("XPath expression: {}", expr.trim()))
        })?;
        Ok(Self { filter, signature })
    }
}

fn parse_filter(expr: &str, is_dsig_prefix: impl Fn(&str) -> bool) -> Option<XPathFilter> {
    let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
    let (filter, prefix) = if let Some(rest) = compact.strip_prefix("not(ancestor-or-self::") {
        let prefix = rest.strip_suffix(":Signature)")?;
        (XPathFilter::AllSignatures, prefix.to_owned())
    } else {
        let rest = compact.strip_prefix("count(ancestor-or-self::")?;
        let (prefix, _) = rest.split_once(':')?;
        let expected = format!(
            "count(ancestor-or-self::{p}:Signature|here()/ancestor::{p}:Signature[1])>count(ancestor-or-self::{p}:Signature)",
            p = prefix
        );
        if compact != expected {
            return None;
        }
        (XPathFilter::EnclosingSignature, prefix.to_owned())
    };
    is_dsig_prefix(&prefix).then_some(filter)
}

impl Transform for EnvelopedXPathTransform {
    fn uri(&self) -> &str {
        algorithm::XPATH
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        if self.filter == XPathFilter::EnclosingSignature {
            return EnvelopedSignatureTransform::new(self.signature.clone()).execute(input);
        }
        let (xml_text, node_set) = input.into_xml()?;
        let node_set = {
            let doc = stenhamra_xml::parse(&xml_text)?;
            let mut set = node_set.unwrap_or_else(|| NodeSet::all(&doc));
            for sig in doc
                .descendants()
                .filter(|n| is_element_named(*n, ns::DSIG, ns::node::SIGNATURE))
            {
                set.remove_subtree(sig);
            }
            set
        };
        Ok(TransformData::Xml {
            xml_text,
            node_set: Some(node_set),
        })
    }
}

#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use crate::base64_transform::Base64DecodeTransform;
use crate::enveloped::{EnclosingSignature, EnvelopedSignatureTransform, EnvelopedXPathTransform};
use roxmltree::Node;
use stenhamra_c14n::C14nMode;
use stenhamra_core::{algorithm, ns, Error};
use stenhamra_xml::NodeSet;

/// Data flowing through the transform pipeline.
#[derive(Debug, Clone)]
pub enum TransformData {
    /// XML node set (for XML-aware transforms like C14N). `node_set: None`
    /// selects every node of `xml_text`, comments included.
    Xml {
        xml_text: String,
        node_set: Option<NodeSet>,
    },
    /// Raw binary data.
    Binary(Vec<u8>),
}

impl TransformData {
    /// Convert to binary. Node sets are canonicalized with inclusive C14N
    /// 1.0 without comments.
    pub fn to_binary(&self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Binary(data) => Ok(data.clone()),
            TransformData::Xml { xml_text, node_set } => {
                stenhamra_c14n::canonicalize(xml_text, C14nMode::Inclusive, node_set.as_ref(), &[])
            }
        }
    }

    /// Convert to a node set, parsing octets as an XML document.
    pub fn into_xml(self) -> Result<(String, Option<NodeSet>), Error> {
        match self {
            TransformData::Xml { xml_text, node_set } => Ok((xml_text, node_set)),
            TransformData::Binary(data) => {
                let text = String::from_utf8(data)
                    .map_err(|e| Error::Transform(format!("octet stream is not UTF-8 XML: {e}")))?;
                Ok((text, None))
            }
        }
    }
}

/// Trait for individual transforms.
pub trait Transform: Send + Sync {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    /// Execute the transform on the given data.
    fn execute(&self, input: TransformData) -> Result<TransformData, Error>;
}

/// A pipeline of transforms executed in sequence.
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
        }
    }

    /// Build the pipeline declared by a `<ds:Transforms>` element.
    ///
    /// `signature` is the enclosing `<ds:Signature>` in the document the
    /// reference data comes from, when there is one.
    pub fn from_element(
        transforms: Option<Node<'_, '_>>,
        signature: Option<&EnclosingSignature>,
    ) -> Result<Self, Error> {
        let mut pipeline = Self::new();
        let Some(transforms) = transforms else {
            return Ok(pipeline);
        };
        for node in transforms
            .children()
            .filter(|n| stenhamra_xml::document::is_element_named(*n, ns::DSIG, ns::node::TRANSFORM))
        {
            let uri = node
                .attribute(ns::attr::ALGORITHM)
                .ok_or_else(|| Error::MissingAttribute("Algorithm on Transform".into()))?;
            pipeline.push(transform_from_element(uri, node, signature)?);
        }
        Ok(pipeline)
    }

    /// Add a transform to the pipeline.
    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Execute all transforms in order.
    pub fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let mut data = input;
        for transform in &self.transforms {
            log::trace!("applying transform {}", transform.uri());
            data = transform.execute(data)?;
        }
        Ok(data)
    }

    /// Algorithm URIs in execution order.
    pub fn uris(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.uri()).collect()
    }

    /// Number of transforms in the pipeline.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Check if pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn transform_from_element(
    uri: &str,
    node: Node<'_, '_>,
    signature: Option<&EnclosingSignature>,
) -> Result<Box<dyn Transform>, Error> {
    if let Some(mode) = C14nMode::from_uri(uri) {
        let prefixes = if mode.is_exclusive() {
            read_inclusive_prefixes(node)
        } else {
            Vec::new()
        };
        return Ok(Box::new(C14nTransform::new(mode, prefixes)));
    }
    match uri {
        algorithm::ENVELOPED_SIGNATURE => {
            Ok(Box::new(EnvelopedSignatureTransform::new(signature.cloned())))
        }
        algorithm::BASE64 => Ok(Box::new(Base64DecodeTransform)),
        algorithm::XPATH => Ok(Box::new(EnvelopedXPathTransform::from_element(
            node,
            signature.cloned(),
        )?)),
        _ => Err(Error::UnsupportedAlgorithm(format!("transform: {uri}"))),
    }
}

/// Read `<ec:InclusiveNamespaces PrefixList="...">` under a C14N method or
/// transform element.
pub fn read_inclusive_prefixes(node: Node<'_, '_>) -> Vec<String> {
    stenhamra_xml::document::find_child_element(node, ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES)
        .and_then(|n| n.attribute(ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

// ── C14N Transform ───────────────────────────────────────────────────

/// A canonicalization transform.
pub struct C14nTransform {
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl C14nTransform {
    pub fn new(mode: C14nMode, inclusive_prefixes: Vec<String>) -> Self {
        Self {
            mode,
            inclusive_prefixes,
        }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let (xml_text, node_set) = input.into_xml()?;
        let bytes = stenhamra_c14n::canonicalize(
            &xml_text,
            self.mode,
            node_set.as_ref(),
            &self.inclusive_prefixes,
        )?;
        Ok(TransformData::Binary(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<r xmlns:ds="http://www.w3.org/2000/09/xmldsig#" xmlns:u="urn:u"><!--c--><a>1</a><ds:Transforms><ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/><ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"><ec:InclusiveNamespaces xmlns:ec="http://www.w3.org/2001/10/xml-exc-c14n#" PrefixList="u #default"/></ds:Transform></ds:Transforms></r>"#;

    #[test]
    fn test_pipeline_from_element() {
        let doc = stenhamra_xml::parse(DOC).unwrap();
        let transforms = stenhamra_xml::document::find_element(&doc, ns::DSIG, ns::node::TRANSFORMS);
        let pipeline = TransformPipeline::from_element(transforms, None).unwrap();
        assert_eq!(
            pipeline.uris(),
            vec![algorithm::ENVELOPED_SIGNATURE, algorithm::EXC_C14N]
        );
        let tf = doc
            .descendants()
            .find(|n| n.attribute(ns::attr::ALGORITHM) == Some(algorithm::EXC_C14N))
            .unwrap();
        assert_eq!(read_inclusive_prefixes(tf), vec!["u", "#default"]);
    }

    #[test]
    fn test_unsupported_transform() {
        let xml = r#"<ds:Transforms xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:Transform Algorithm="http://www.w3.org/TR/1999/REC-xslt-19991116"/></ds:Transforms>"#;
        let doc = stenhamra_xml::parse(xml).unwrap();
        let result = TransformPipeline::from_element(Some(doc.root_element()), None);
        assert!(matches!(result, Err(Error::UnsupportedAlgorithm(_))));
    }

    #[test]
    fn test_default_conversion_strips_comments() {
        let data = TransformData::Xml {
            xml_text: "<r><!--c--><a>1</a></r>".into(),
            node_set: None,
        };
        assert_eq!(data.to_binary().unwrap(), b"<r><a>1</a></r>");
    }

    #[test]
    fn test_c14n_transform_keeps_comments_when_asked() {
        let t = C14nTransform::new(C14nMode::InclusiveWithComments, Vec::new());
        let out = t
            .execute(TransformData::Binary(b"<r><!--c--></r>".to_vec()))
            .unwrap();
        assert!(matches!(out, TransformData::Binary(ref b) if b == b"<r><!--c--></r>"));
    }
}

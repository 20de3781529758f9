#![forbid(unsafe_code)]

//! Parsed view of a `<ds:Signature>` element.

use base64::Engine;
use roxmltree::Node;
use stenhamra_c14n::C14nMode;
use stenhamra_core::{ns, Error};
use stenhamra_transforms::pipeline::read_inclusive_prefixes;
use stenhamra_xml::document::{compact_text, find_child_element, find_child_elements};

/// A `<ds:Signature>` element.
#[derive(Debug)]
pub struct Signature<'a, 'input> {
    pub node: Node<'a, 'input>,
    pub id: Option<&'a str>,
    pub signed_info: SignedInfo<'a, 'input>,
    pub key_info: Option<Node<'a, 'input>>,
    /// Decoded `SignatureValue`; `None` when the element is absent.
    pub signature_value: Option<Vec<u8>>,
}

/// A `<ds:SignedInfo>` element.
#[derive(Debug)]
pub struct SignedInfo<'a, 'input> {
    pub node: Node<'a, 'input>,
    pub c14n_mode: C14nMode,
    pub inclusive_prefixes: Vec<String>,
    pub signature_method: &'a str,
    /// `HMACOutputLength` in bits.
    pub hmac_output_length: Option<usize>,
    pub references: Vec<Reference<'a, 'input>>,
}

/// A `<ds:Reference>` element.
#[derive(Debug)]
pub struct Reference<'a, 'input> {
    pub node: Node<'a, 'input>,
    pub uri: Option<&'a str>,
    pub id: Option<&'a str>,
    pub ref_type: Option<&'a str>,
    pub transforms: Option<Node<'a, 'input>>,
    pub digest_method: &'a str,
    pub digest_value: Vec<u8>,
}

impl<'a, 'input> Signature<'a, 'input> {
    pub fn parse(node: Node<'a, 'input>) -> Result<Self, Error> {
        let signed_info = find_child_element(node, ns::DSIG, ns::node::SIGNED_INFO)
            .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
        let signature_value = find_child_element(node, ns::DSIG, ns::node::SIGNATURE_VALUE)
            .map(|n| decode_base64(n, "SignatureValue"))
            .transpose()?;
        Ok(Self {
            node,
            id: node.attribute(ns::attr::ID),
            signed_info: SignedInfo::parse(signed_info)?,
            key_info: find_child_element(node, ns::DSIG, ns::node::KEY_INFO),
            signature_value,
        })
    }
}

impl<'a, 'input> SignedInfo<'a, 'input> {
    pub fn parse(node: Node<'a, 'input>) -> Result<Self, Error> {
        let c14n_method = find_child_element(node, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
            .ok_or_else(|| Error::MissingElement("CanonicalizationMethod".into()))?;
        let c14n_uri = c14n_method
            .attribute(ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingAttribute("Algorithm on CanonicalizationMethod".into()))?;
        let c14n_mode = C14nMode::require(c14n_uri)?;
        let inclusive_prefixes = if c14n_mode.is_exclusive() {
            read_inclusive_prefixes(c14n_method)
        } else {
            Vec::new()
        };

        let sig_method = find_child_element(node, ns::DSIG, ns::node::SIGNATURE_METHOD)
            .ok_or_else(|| Error::MissingElement("SignatureMethod".into()))?;
        let signature_method = sig_method
            .attribute(ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingAttribute("Algorithm on SignatureMethod".into()))?;
        let hmac_output_length = find_child_element(sig_method, ns::DSIG, ns::node::HMAC_OUTPUT_LENGTH)
            .map(|n| {
                let text = n.text().unwrap_or("").trim();
                text.parse::<usize>()
                    .map_err(|_| Error::XmlStructure(format!("HMACOutputLength: {text:?}")))
            })
            .transpose()?;

        let references = find_child_elements(node, ns::DSIG, ns::node::REFERENCE)
            .into_iter()
            .map(Reference::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            node,
            c14n_mode,
            inclusive_prefixes,
            signature_method,
            hmac_output_length,
            references,
        })
    }
}

impl<'a, 'input> Reference<'a, 'input> {
    pub fn parse(node: Node<'a, 'input>) -> Result<Self, Error> {
        let digest_method = find_child_element(node, ns::DSIG, ns::node::DIGEST_METHOD)
            .ok_or_else(|| Error::MissingElement("DigestMethod".into()))?
            .attribute(ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingAttribute("Algorithm on DigestMethod".into()))?;
        let digest_value = find_child_element(node, ns::DSIG, ns::node::DIGEST_VALUE)
            .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
        Ok(Self {
            node,
            uri: node.attribute(ns::attr::URI),
            id: node.attribute(ns::attr::ID),
            ref_type: node.attribute(ns::attr::TYPE),
            transforms: find_child_element(node, ns::DSIG, ns::node::TRANSFORMS),
            digest_method,
            digest_value: decode_base64(digest_value, "DigestValue")?,
        })
    }

    /// The reference URI, with an absent attribute read as `""`.
    pub fn uri_or_empty(&self) -> &'a str {
        self.uri.unwrap_or("")
    }

    /// Whether `Type` declares the target to be a `ds:Manifest`.
    pub fn declares_manifest(&self) -> bool {
        self.ref_type == Some(stenhamra_core::algorithm::MANIFEST_TYPE)
    }
}

fn decode_base64(node: Node<'_, '_>, what: &str) -> Result<Vec<u8>, Error> {
    base64::engine::general_purpose::STANDARD
        .decode(compact_text(node))
        .map_err(|e| Error::Base64(format!("{what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stenhamra_core::algorithm;

    const SIG: &str = r##"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#" Id="s1">
  <ds:SignedInfo>
    <ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#">
      <ec:InclusiveNamespaces xmlns:ec="http://www.w3.org/2001/10/xml-exc-c14n#" PrefixList="a b"/>
    </ds:CanonicalizationMethod>
    <ds:SignatureMethod Algorithm="http://www.w3.org/2000/09/xmldsig#hmac-sha1">
      <ds:HMACOutputLength>128</ds:HMACOutputLength>
    </ds:SignatureMethod>
    <ds:Reference URI="#obj" Type="http://www.w3.org/2000/09/xmldsig#Manifest">
      <ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>
      <ds:DigestValue>AAEC
        Aw==</ds:DigestValue>
    </ds:Reference>
    <ds:Reference>
      <ds:Transforms><ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/></ds:Transforms>
      <ds:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1"/>
      <ds:DigestValue></ds:DigestValue>
    </ds:Reference>
  </ds:SignedInfo>
  <ds:SignatureValue>/w==</ds:SignatureValue>
</ds:Signature>"##;

    #[test]
    fn test_parse_signature() {
        let doc = stenhamra_xml::parse(SIG).unwrap();
        let sig = Signature::parse(doc.root_element()).unwrap();
        assert_eq!(sig.id, Some("s1"));
        assert_eq!(sig.signature_value.as_deref(), Some(&[0xff][..]));
        assert!(sig.key_info.is_none());

        let si = &sig.signed_info;
        assert_eq!(si.c14n_mode, C14nMode::Exclusive);
        assert_eq!(si.inclusive_prefixes, vec!["a", "b"]);
        assert_eq!(si.signature_method, algorithm::HMAC_SHA1);
        assert_eq!(si.hmac_output_length, Some(128));
        assert_eq!(si.references.len(), 2);

        let first = &si.references[0];
        assert_eq!(first.uri, Some("#obj"));
        assert!(first.declares_manifest());
        assert_eq!(first.digest_value, vec![0, 1, 2, 3]);
        assert!(first.transforms.is_none());

        let second = &si.references[1];
        assert_eq!(second.uri, None);
        assert_eq!(second.uri_or_empty(), "");
        assert!(second.digest_value.is_empty());
        assert!(second.transforms.is_some());
    }

    #[test]
    fn test_missing_parts() {
        let xml = r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"/>"#;
        let doc = stenhamra_xml::parse(xml).unwrap();
        assert!(matches!(
            Signature::parse(doc.root_element()),
            Err(Error::MissingElement(_))
        ));

        let xml = r#"<ds:SignedInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:CanonicalizationMethod/></ds:SignedInfo>"#;
        let doc = stenhamra_xml::parse(xml).unwrap();
        assert!(matches!(
            SignedInfo::parse(doc.root_element()),
            Err(Error::MissingAttribute(_))
        ));
    }

    #[test]
    fn test_bad_digest_value() {
        let xml = r#"<ds:Reference xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1"/><ds:DigestValue>!!</ds:DigestValue></ds:Reference>"#;
        let doc = stenhamra_xml::parse(xml).unwrap();
        assert!(matches!(
            Reference::parse(doc.root_element()),
            Err(Error::Base64(_))
        ));
    }

    #[test]
    fn test_unknown_c14n_method() {
        let xml = r#"<ds:SignedInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:CanonicalizationMethod Algorithm="urn:nope"/></ds:SignedInfo>"#;
        let doc = stenhamra_xml::parse(xml).unwrap();
        assert!(matches!(
            SignedInfo::parse(doc.root_element()),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }
}

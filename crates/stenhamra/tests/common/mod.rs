//! Helpers for building signed documents at test time.

#![allow(dead_code)]

use base64::Engine;
use rsa::pkcs1v15::SigningKey;
use pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use signature::{SignatureEncoding, Signer};
use stenhamra::c14n::C14nMode;
use stenhamra::core::ns;
use stenhamra::xml::{document, NodeSet};

pub const RSA_KEY_PEM: &str = include_str!("../../testdata/rsa-key.pem");
pub const RSA_CERT_DER: &[u8] = include_bytes!("../../testdata/rsa-cert.der");
pub const CA_CERT_DER: &[u8] = include_bytes!("../../testdata/ca-cert.der");
pub const OTHER_RSA_KEY_VALUE: &str = include_str!("../../testdata/other-rsa-keyvalue.xml");

pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const MANIFEST_TYPE: &str = "http://www.w3.org/2000/09/xmldsig#Manifest";

pub fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

pub fn sha256_b64(data: &[u8]) -> String {
    b64(&Sha256::digest(data))
}

/// `<ds:KeyInfo>` with the signing certificate and its issuer.
pub fn key_info_with_chain() -> String {
    format!(
        "<ds:KeyInfo><ds:KeyName>signer</ds:KeyName><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
        b64(CA_CERT_DER),
        b64(RSA_CERT_DER)
    )
}

pub fn reference(uri: &str, transforms: &str, digest: &str) -> String {
    let transforms = if transforms.is_empty() {
        String::new()
    } else {
        format!("<ds:Transforms>{transforms}</ds:Transforms>")
    };
    format!(
        r#"<ds:Reference URI="{uri}">{transforms}<ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue>{digest}</ds:DigestValue></ds:Reference>"#
    )
}

pub fn enveloped() -> &'static str {
    r#"<ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/><ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>"#
}

/// A `<ds:Signature>` with RSA-SHA256 over exclusive C14N, with `@SIG@`
/// standing in for the signature value.
pub fn signature_template(references: &str, key_info: &str) -> String {
    format!(
        r#"<ds:Signature xmlns:ds="{DSIG_NS}"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/><ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>{references}</ds:SignedInfo><ds:SignatureValue>@SIG@</ds:SignatureValue>{key_info}</ds:Signature>"#
    )
}

/// Replace `@SIG@` with an RSA-SHA256 signature over the canonical
/// SignedInfo.
pub fn sign_rsa(xml: &str) -> String {
    let doc = stenhamra::xml::parse(xml).unwrap();
    let signed_info = document::find_element(&doc, ns::DSIG, ns::node::SIGNED_INFO).unwrap();
    let octets = stenhamra::c14n::canonicalize_doc(
        &doc,
        C14nMode::Exclusive,
        Some(&NodeSet::tree_without_comments(signed_info)),
        &[],
    )
    .unwrap();
    let key = RsaPrivateKey::from_pkcs8_pem(RSA_KEY_PEM).unwrap();
    let signer = SigningKey::<Sha256>::new(key);
    let signature = signer.sign(&octets);
    xml.replace("@SIG@", &b64(&signature.to_vec()))
}

/// An enveloped whole-document signature with the certificate chain
/// embedded.
pub fn enveloped_document() -> String {
    let content = "<invoice><amount currency=\"SEK\">100</amount><!-- note --></invoice>";
    let digest = sha256_b64(b"<invoice><amount currency=\"SEK\">100</amount></invoice>");
    let sig = signature_template(&reference("", enveloped(), &digest), &key_info_with_chain());
    sign_rsa(&content.replace("</invoice>", &format!("{sig}</invoice>")))
}

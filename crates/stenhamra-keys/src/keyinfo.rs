#![forbid(unsafe_code)]

//! KeyInfo processing: reads `<ds:KeyInfo>` and extracts the verification key.
//!
//! An absent or unusable key is `Ok(None)`. Key material that is present
//! but cannot be decoded is `Error::KeyInfo`, so callers can tell a
//! corrupt document from one that simply carries no key.

use crate::key::{Key, KeySource};
use crate::loader;
use base64::Engine;
use roxmltree::Node;
use stenhamra_core::{algorithm, ns, Error};
use stenhamra_crypto::VerifyingKey;
use stenhamra_xml::document::{compact_text, find_child_element, is_element_named};

/// Precedence between certificate and raw key forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfoPolicy {
    /// Consult `X509Data` before `KeyValue`/`DEREncodedKeyValue`.
    pub prefer_certificate_over_key: bool,
}

impl Default for KeyInfoPolicy {
    fn default() -> Self {
        Self {
            prefer_certificate_over_key: true,
        }
    }
}

/// Extract the verification key from a `<KeyInfo>` element.
///
/// Children are examined in document order within each form; the first
/// form (per `policy`) that yields a key wins. `KeyName` is attached to the
/// returned key but never selects one.
pub fn extract_key(key_info: Node<'_, '_>, policy: &KeyInfoPolicy) -> Result<Option<Key>, Error> {
    let name = find_child_element(key_info, ns::DSIG, ns::node::KEY_NAME)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned);

    let found = if policy.prefer_certificate_over_key {
        match certificate_key(key_info)? {
            Some(key) => Some(key),
            None => raw_key(key_info)?,
        }
    } else {
        match raw_key(key_info)? {
            Some(key) => Some(key),
            None => certificate_key(key_info)?,
        }
    };

    match found {
        Some(key) => {
            log::debug!("KeyInfo yielded {:?} key from {:?}", key.data, key.source);
            Ok(Some(match name {
                Some(n) => key.with_name(n),
                None => key,
            }))
        }
        None => {
            log::debug!("KeyInfo carries no usable key");
            Ok(None)
        }
    }
}

// ── X509Data ─────────────────────────────────────────────────────────

fn certificate_key(key_info: Node<'_, '_>) -> Result<Option<Key>, Error> {
    for x509_data in key_info
        .children()
        .filter(|n| is_element_named(*n, ns::DSIG, ns::node::X509_DATA))
    {
        let mut certs = Vec::new();
        for cert_node in x509_data
            .children()
            .filter(|n| is_element_named(*n, ns::DSIG, ns::node::X509_CERTIFICATE))
        {
            let der_bytes = decode_base64(cert_node, "X509Certificate")?;
            let cert = parse_certificate(&der_bytes)?;
            certs.push((cert, der_bytes));
        }
        if certs.is_empty() {
            continue;
        }

        let leaf = find_leaf_cert(&certs);
        match loader::load_x509_cert_der(&certs[leaf].1) {
            Ok(key) => {
                let mut chain = vec![certs[leaf].1.clone()];
                chain.extend(
                    certs
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != leaf)
                        .map(|(_, (_, der_bytes))| der_bytes.clone()),
                );
                let mut key = key.with_chain(chain);
                key.source = KeySource::X509Certificate;
                return Ok(Some(key));
            }
            Err(Error::UnsupportedAlgorithm(e)) => {
                log::warn!("ignoring X509Certificate with unsupported {e}");
            }
            Err(e) => return Err(Error::KeyInfo(format!("X509Certificate key: {e}"))),
        }
    }
    Ok(None)
}

fn parse_certificate(der_bytes: &[u8]) -> Result<x509_cert::Certificate, Error> {
    use der::Decode;
    x509_cert::Certificate::from_der(der_bytes)
        .map_err(|e| Error::KeyInfo(format!("malformed X509Certificate: {e}")))
}

/// Pick the end-entity certificate: the one whose subject issues none of
/// the others. Falls back to the first certificate.
fn find_leaf_cert(certs: &[(x509_cert::Certificate, Vec<u8>)]) -> usize {
    if certs.len() <= 1 {
        return 0;
    }
    let issues_another = |i: usize| {
        let subject = &certs[i].0.tbs_certificate.subject;
        certs
            .iter()
            .enumerate()
            .any(|(j, (other, _))| j != i && &other.tbs_certificate.issuer == subject)
    };
    (0..certs.len()).find(|&i| !issues_another(i)).unwrap_or(0)
}

// ── KeyValue / DEREncodedKeyValue ───────────────────────────────────

fn raw_key(key_info: Node<'_, '_>) -> Result<Option<Key>, Error> {
    for child in key_info.children().filter(|n| n.is_element()) {
        if is_element_named(child, ns::DSIG, ns::node::KEY_VALUE) {
            if let Some(data) = parse_key_value(child)? {
                return Ok(Some(Key::new(data, KeySource::KeyValue)));
            }
        } else if is_element_named(child, ns::DSIG11, ns::node::DER_ENCODED_KEY_VALUE) {
            let der_bytes = decode_base64(child, "DEREncodedKeyValue")?;
            let data = loader::public_key_from_spki(&der_bytes)
                .map_err(|e| Error::KeyInfo(format!("DEREncodedKeyValue: {e}")))?
                .ok_or_else(|| {
                    Error::KeyInfo("DEREncodedKeyValue is not a supported public key".into())
                })?;
            return Ok(Some(Key::new(data, KeySource::DerEncodedKeyValue)));
        }
    }
    Ok(None)
}

/// Parse the single key child of `<KeyValue>`. Unknown key types are skipped.
fn parse_key_value(key_value: Node<'_, '_>) -> Result<Option<VerifyingKey>, Error> {
    let Some(inner) = key_value.children().find(|n| n.is_element()) else {
        return Ok(None);
    };
    if is_element_named(inner, ns::DSIG, ns::node::RSA_KEY_VALUE) {
        parse_rsa_key_value(inner).map(Some)
    } else if is_element_named(inner, ns::DSIG, ns::node::DSA_KEY_VALUE) {
        parse_dsa_key_value(inner).map(Some)
    } else if is_element_named(inner, ns::DSIG11, ns::node::EC_KEY_VALUE) {
        parse_ec_key_value(inner)
    } else {
        log::warn!(
            "ignoring unsupported KeyValue child {{{}}}{}",
            inner.tag_name().namespace().unwrap_or(""),
            inner.tag_name().name()
        );
        Ok(None)
    }
}

/// `<RSAKeyValue><Modulus/><Exponent/></RSAKeyValue>`
pub fn parse_rsa_key_value(rsa_kv: Node<'_, '_>) -> Result<VerifyingKey, Error> {
    let n = rsa::BigUint::from_bytes_be(&child_bytes(rsa_kv, ns::DSIG, ns::node::RSA_MODULUS)?);
    let e = rsa::BigUint::from_bytes_be(&child_bytes(rsa_kv, ns::DSIG, ns::node::RSA_EXPONENT)?);
    let public = rsa::RsaPublicKey::new(n, e)
        .map_err(|err| Error::KeyInfo(format!("invalid RSA public key: {err}")))?;
    Ok(VerifyingKey::Rsa(public))
}

/// `<DSAKeyValue>` with domain parameters P, Q, G and public value Y.
pub fn parse_dsa_key_value(dsa_kv: Node<'_, '_>) -> Result<VerifyingKey, Error> {
    let value = |name: &str| -> Result<dsa::BigUint, Error> {
        Ok(dsa::BigUint::from_bytes_be(&child_bytes(dsa_kv, ns::DSIG, name)?))
    };
    let components = dsa::Components::from_components(
        value(ns::node::DSA_P)?,
        value(ns::node::DSA_Q)?,
        value(ns::node::DSA_G)?,
    )
    .map_err(|e| Error::KeyInfo(format!("invalid DSA components: {e}")))?;
    let vk = dsa::VerifyingKey::from_components(components, value(ns::node::DSA_Y)?)
        .map_err(|e| Error::KeyInfo(format!("invalid DSA public key: {e}")))?;
    Ok(VerifyingKey::Dsa(vk))
}

/// `<dsig11:ECKeyValue>` with a `NamedCurve` and an uncompressed point.
/// Curves other than P-256 and P-384 are skipped.
pub fn parse_ec_key_value(ec_kv: Node<'_, '_>) -> Result<Option<VerifyingKey>, Error> {
    let curve = find_child_element(ec_kv, ns::DSIG11, ns::node::NAMED_CURVE)
        .and_then(|n| n.attribute(ns::attr::URI))
        .ok_or_else(|| Error::KeyInfo("ECKeyValue without NamedCurve URI".into()))?;
    let point = child_bytes(ec_kv, ns::DSIG11, ns::node::PUBLIC_KEY)?;

    match curve {
        algorithm::CURVE_P256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
            .map(|vk| Some(VerifyingKey::EcP256(vk)))
            .map_err(|e| Error::KeyInfo(format!("invalid P-256 point: {e}"))),
        algorithm::CURVE_P384 => p384::ecdsa::VerifyingKey::from_sec1_bytes(&point)
            .map(|vk| Some(VerifyingKey::EcP384(vk)))
            .map_err(|e| Error::KeyInfo(format!("invalid P-384 point: {e}"))),
        other => {
            log::warn!("ignoring ECKeyValue on unsupported curve {other}");
            Ok(None)
        }
    }
}

fn child_bytes(parent: Node<'_, '_>, ns_uri: &str, local: &str) -> Result<Vec<u8>, Error> {
    let child = find_child_element(parent, ns_uri, local).ok_or_else(|| {
        Error::KeyInfo(format!("{} without {local}", parent.tag_name().name()))
    })?;
    decode_base64(child, local)
}

fn decode_base64(node: Node<'_, '_>, what: &str) -> Result<Vec<u8>, Error> {
    let text = compact_text(node);
    if text.is_empty() {
        return Err(Error::KeyInfo(format!("empty {what}")));
    }
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| Error::KeyInfo(format!("{what} is not valid base64: {e}")))
}

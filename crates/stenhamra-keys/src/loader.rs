#![forbid(unsafe_code)]

//! Key loading from PEM, DER, X.509 certificates and raw HMAC secrets.
//!
//! Only public halves are kept: a private key file yields the matching
//! public key for verification.

use crate::key::{Key, KeySource};
use der::asn1::ObjectIdentifier;
use stenhamra_core::Error;
use stenhamra_crypto::VerifyingKey;

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const DSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10040.4.1");
const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// Load the public key of a DER-encoded X.509 certificate.
///
/// The certificate itself becomes the key's one-element chain.
pub fn load_x509_cert_der(data: &[u8]) -> Result<Key, Error> {
    use der::{Decode, Encode};

    let cert = x509_cert::Certificate::from_der(data)
        .map_err(|e| Error::Key(format!("failed to parse X.509 certificate: {e}")))?;
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Key(format!("failed to encode SPKI: {e}")))?;

    let public = public_key_from_spki(&spki_der)?.ok_or_else(|| {
        Error::UnsupportedAlgorithm("public key algorithm in X.509 certificate".into())
    })?;
    Ok(Key::new(public, KeySource::External).with_chain(vec![data.to_vec()]))
}

/// Load the public key of a PEM-encoded X.509 certificate.
pub fn load_x509_cert_pem(pem_data: &[u8]) -> Result<Key, Error> {
    let (label, der_bytes) = decode_pem(pem_data)?;
    if label != "CERTIFICATE" {
        return Err(Error::Key(format!(
            "expected CERTIFICATE PEM label, got: {label}"
        )));
    }
    load_x509_cert_der(&der_bytes)
}

/// Load a key from raw SubjectPublicKeyInfo DER bytes.
pub fn load_spki_der(spki_der: &[u8]) -> Result<Key, Error> {
    public_key_from_spki(spki_der)?
        .map(|public| Key::new(public, KeySource::External))
        .ok_or_else(|| Error::UnsupportedAlgorithm("public key algorithm in SPKI DER".into()))
}

/// Parse SPKI DER as RSA, EC P-256, EC P-384 or DSA.
///
/// `Ok(None)` means the algorithm (or curve) is not one we verify with.
/// A supported algorithm whose key bytes do not decode is `Error::Key`.
pub(crate) fn public_key_from_spki(spki_der: &[u8]) -> Result<Option<VerifyingKey>, Error> {
    use der::Decode;
    use spki::DecodePublicKey;

    let spki_ref = spki::SubjectPublicKeyInfoRef::from_der(spki_der)
        .map_err(|e| Error::Key(format!("malformed SubjectPublicKeyInfo: {e}")))?;
    let corrupt = |kind: &str, e: &dyn std::fmt::Display| {
        Error::Key(format!("corrupt {kind} public key: {e}"))
    };

    let oid = spki_ref.algorithm.oid;
    let key = if oid == RSA_ENCRYPTION {
        rsa::RsaPublicKey::from_public_key_der(spki_der)
            .map(VerifyingKey::Rsa)
            .map_err(|e| corrupt("RSA", &e))?
    } else if oid == EC_PUBLIC_KEY {
        let curve = spki_ref
            .algorithm
            .parameters_oid()
            .map_err(|e| corrupt("EC", &e))?;
        if curve == SECP256R1 {
            p256::ecdsa::VerifyingKey::from_public_key_der(spki_der)
                .map(VerifyingKey::EcP256)
                .map_err(|e| corrupt("P-256", &e))?
        } else if curve == SECP384R1 {
            p384::ecdsa::VerifyingKey::from_public_key_der(spki_der)
                .map(VerifyingKey::EcP384)
                .map_err(|e| corrupt("P-384", &e))?
        } else {
            log::debug!("unsupported EC curve {curve}");
            return Ok(None);
        }
    } else if oid == DSA {
        dsa::VerifyingKey::try_from(spki_ref)
            .map(VerifyingKey::Dsa)
            .map_err(|e| corrupt("DSA", &e))?
    } else {
        log::debug!("unsupported public key algorithm {oid}");
        return Ok(None);
    };
    Ok(Some(key))
}

/// Load the public half of a PKCS#8 or PKCS#1 private key (DER).
pub fn load_private_key_der(der_bytes: &[u8]) -> Result<Key, Error> {
    use pkcs1::DecodeRsaPrivateKey;
    use pkcs8::DecodePrivateKey;

    let public = if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_der(der_bytes) {
        VerifyingKey::Rsa(pk.to_public_key())
    } else if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs1_der(der_bytes) {
        VerifyingKey::Rsa(pk.to_public_key())
    } else if let Ok(sk) = p256::ecdsa::SigningKey::from_pkcs8_der(der_bytes) {
        VerifyingKey::EcP256(*sk.verifying_key())
    } else if let Ok(sk) = p384::ecdsa::SigningKey::from_pkcs8_der(der_bytes) {
        VerifyingKey::EcP384(*sk.verifying_key())
    } else if let Ok(sk) = dsa::SigningKey::from_pkcs8_der(der_bytes) {
        VerifyingKey::Dsa(sk.verifying_key().clone())
    } else {
        return Err(Error::Key("unsupported private key format".into()));
    };
    Ok(Key::new(public, KeySource::External))
}

/// Load a key from PEM data, dispatching on the PEM label.
pub fn load_pem(pem_data: &[u8]) -> Result<Key, Error> {
    let (label, der_bytes) = decode_pem(pem_data)?;
    match label.as_str() {
        "CERTIFICATE" => load_x509_cert_der(&der_bytes),
        "PUBLIC KEY" => load_spki_der(&der_bytes),
        "RSA PUBLIC KEY" => {
            use pkcs1::DecodeRsaPublicKey;
            let pk = rsa::RsaPublicKey::from_pkcs1_der(&der_bytes)
                .map_err(|e| Error::Key(format!("failed to parse RSA public key: {e}")))?;
            Ok(Key::new(VerifyingKey::Rsa(pk), KeySource::External))
        }
        "PRIVATE KEY" | "RSA PRIVATE KEY" => load_private_key_der(&der_bytes),
        other => Err(Error::Key(format!("unsupported PEM label: {other}"))),
    }
}

/// Load a verification key from a file, auto-detecting PEM or DER.
pub fn load_key_file(path: &std::path::Path) -> Result<Key, Error> {
    let data = std::fs::read(path)?;
    if data.starts_with(b"-----BEGIN") {
        return load_pem(&data);
    }
    load_spki_der(&data)
        .or_else(|_| load_x509_cert_der(&data))
        .or_else(|_| load_private_key_der(&data))
        .map_err(|_| {
            Error::Key(format!(
                "unable to auto-detect key format from file: {}",
                path.display()
            ))
        })
}

/// Load an X.509 certificate file (PEM or DER).
pub fn load_cert_file(path: &std::path::Path) -> Result<Key, Error> {
    let data = std::fs::read(path)?;
    if data.starts_with(b"-----BEGIN") {
        load_x509_cert_pem(&data)
    } else {
        load_x509_cert_der(&data)
    }
}

/// Use raw bytes as an HMAC secret.
pub fn load_hmac_key(data: &[u8]) -> Key {
    Key::new(VerifyingKey::Hmac(data.to_vec()), KeySource::External)
}

fn decode_pem(pem_data: &[u8]) -> Result<(String, Vec<u8>), Error> {
    let text = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))?;
    let (label, der_bytes) = pem_rfc7468::decode_vec(text.trim().as_bytes())
        .map_err(|e| Error::Key(format!("failed to decode PEM: {e}")))?;
    Ok((label.to_owned(), der_bytes))
}

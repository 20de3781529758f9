#![forbid(unsafe_code)]

//! Key types and data structures.

use stenhamra_crypto::VerifyingKey;

/// Where a key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Supplied by the caller, not read from the document.
    External,
    /// `X509Data/X509Certificate`.
    X509Certificate,
    /// `KeyValue` (RSA, DSA or EC).
    KeyValue,
    /// `dsig11:DEREncodedKeyValue`.
    DerEncodedKeyValue,
}

/// A verification key with its provenance.
#[derive(Debug, Clone)]
pub struct Key {
    /// `KeyName` from the KeyInfo, if any. Informational only.
    pub name: Option<String>,
    /// The key material.
    pub data: VerifyingKey,
    pub source: KeySource,
    /// DER certificates the key was taken from; the end-entity
    /// certificate comes first.
    pub x509_chain: Vec<Vec<u8>>,
}

impl Key {
    pub fn new(data: VerifyingKey, source: KeySource) -> Self {
        Self {
            name: None,
            data,
            source,
            x509_chain: Vec::new(),
        }
    }

    /// Set the key name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_chain(mut self, chain: Vec<Vec<u8>>) -> Self {
        self.x509_chain = chain;
        self
    }

    /// Key material for the signature codec.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.data
    }

    /// Get the RSA public key if this is an RSA key.
    pub fn rsa_public_key(&self) -> Option<&rsa::RsaPublicKey> {
        match &self.data {
            VerifyingKey::Rsa(public) => Some(public),
            _ => None,
        }
    }
}

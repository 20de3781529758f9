#![forbid(unsafe_code)]

//! Signature verification algorithms (RSA, RSA-PSS, ECDSA, DSA, HMAC).
//!
//! ECDSA and DSA signature values use the XML-DSig `r || s` encoding with
//! both halves left-padded to the group size.

use digest::Digest;
use signature::hazmat::PrehashVerifier;
use stenhamra_core::{algorithm, Error};

/// Public key material (or shared secret, for HMAC) used to check a
/// `SignatureValue`.
#[derive(Clone)]
pub enum VerifyingKey {
    Rsa(rsa::RsaPublicKey),
    EcP256(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::VerifyingKey),
    Dsa(dsa::VerifyingKey),
    Hmac(Vec<u8>),
}

impl VerifyingKey {
    /// Short human-readable key type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "RSA",
            Self::EcP256(_) => "EC P-256",
            Self::EcP384(_) => "EC P-384",
            Self::Dsa(_) => "DSA",
            Self::Hmac(_) => "HMAC",
        }
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hmac(k) => write!(f, "HMAC key ({} bytes)", k.len()),
            other => write!(f, "{} public key", other.kind()),
        }
    }
}

/// Trait for signature verification algorithms.
pub trait SignatureAlgorithm: Send + Sync {
    fn uri(&self) -> &'static str;

    /// `Ok(false)` when the signature does not match; `Err` when the key
    /// does not fit the algorithm or the signature value is malformed.
    fn verify(&self, key: &VerifyingKey, data: &[u8], signature: &[u8]) -> Result<bool, Error>;
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    from_uri_with_hmac_length(uri, None)
}

/// Like [`from_uri`], with the `HMACOutputLength` (in bits) applied to
/// HMAC algorithms.
pub fn from_uri_with_hmac_length(
    uri: &str,
    hmac_output_bits: Option<usize>,
) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    let rsa = |uri: &'static str, hash: HashType| -> Box<dyn SignatureAlgorithm> {
        Box::new(RsaPkcs1v15 { uri, hash })
    };
    let pss = |uri: &'static str, hash: HashType| -> Box<dyn SignatureAlgorithm> {
        Box::new(RsaPss { uri, hash })
    };
    let ecdsa = |uri: &'static str, hash: HashType| -> Box<dyn SignatureAlgorithm> {
        Box::new(Ecdsa { uri, hash })
    };
    let hmac = |uri: &'static str, hash: HashType| -> Box<dyn SignatureAlgorithm> {
        Box::new(HmacVerify {
            uri,
            hash,
            output_bits: hmac_output_bits,
        })
    };

    Ok(match uri {
        algorithm::RSA_SHA1 => rsa(algorithm::RSA_SHA1, HashType::Sha1),
        algorithm::RSA_SHA224 => rsa(algorithm::RSA_SHA224, HashType::Sha224),
        algorithm::RSA_SHA256 => rsa(algorithm::RSA_SHA256, HashType::Sha256),
        algorithm::RSA_SHA384 => rsa(algorithm::RSA_SHA384, HashType::Sha384),
        algorithm::RSA_SHA512 => rsa(algorithm::RSA_SHA512, HashType::Sha512),

        algorithm::RSA_PSS_SHA1 => pss(algorithm::RSA_PSS_SHA1, HashType::Sha1),
        algorithm::RSA_PSS_SHA224 => pss(algorithm::RSA_PSS_SHA224, HashType::Sha224),
        algorithm::RSA_PSS_SHA256 => pss(algorithm::RSA_PSS_SHA256, HashType::Sha256),
        algorithm::RSA_PSS_SHA384 => pss(algorithm::RSA_PSS_SHA384, HashType::Sha384),
        algorithm::RSA_PSS_SHA512 => pss(algorithm::RSA_PSS_SHA512, HashType::Sha512),

        algorithm::ECDSA_SHA1 => ecdsa(algorithm::ECDSA_SHA1, HashType::Sha1),
        algorithm::ECDSA_SHA224 => ecdsa(algorithm::ECDSA_SHA224, HashType::Sha224),
        algorithm::ECDSA_SHA256 => ecdsa(algorithm::ECDSA_SHA256, HashType::Sha256),
        algorithm::ECDSA_SHA384 => ecdsa(algorithm::ECDSA_SHA384, HashType::Sha384),
        algorithm::ECDSA_SHA512 => ecdsa(algorithm::ECDSA_SHA512, HashType::Sha512),

        algorithm::DSA_SHA1 => Box::new(Dsa {
            uri: algorithm::DSA_SHA1,
            hash: HashType::Sha1,
        }),
        algorithm::DSA_SHA256 => Box::new(Dsa {
            uri: algorithm::DSA_SHA256,
            hash: HashType::Sha256,
        }),

        algorithm::HMAC_SHA1 => hmac(algorithm::HMAC_SHA1, HashType::Sha1),
        algorithm::HMAC_SHA224 => hmac(algorithm::HMAC_SHA224, HashType::Sha224),
        algorithm::HMAC_SHA256 => hmac(algorithm::HMAC_SHA256, HashType::Sha256),
        algorithm::HMAC_SHA384 => hmac(algorithm::HMAC_SHA384, HashType::Sha384),
        algorithm::HMAC_SHA512 => hmac(algorithm::HMAC_SHA512, HashType::Sha512),

        _ => return Err(Error::UnsupportedAlgorithm(format!("signature algorithm: {uri}"))),
    })
}

/// All signature method URIs understood by [`from_uri`].
pub const SUPPORTED: &[&str] = &[
    algorithm::RSA_SHA1,
    algorithm::RSA_SHA224,
    algorithm::RSA_SHA256,
    algorithm::RSA_SHA384,
    algorithm::RSA_SHA512,
    algorithm::RSA_PSS_SHA1,
    algorithm::RSA_PSS_SHA224,
    algorithm::RSA_PSS_SHA256,
    algorithm::RSA_PSS_SHA384,
    algorithm::RSA_PSS_SHA512,
    algorithm::ECDSA_SHA1,
    algorithm::ECDSA_SHA224,
    algorithm::ECDSA_SHA256,
    algorithm::ECDSA_SHA384,
    algorithm::ECDSA_SHA512,
    algorithm::DSA_SHA1,
    algorithm::DSA_SHA256,
    algorithm::HMAC_SHA1,
    algorithm::HMAC_SHA224,
    algorithm::HMAC_SHA256,
    algorithm::HMAC_SHA384,
    algorithm::HMAC_SHA512,
];

#[derive(Debug, Clone, Copy)]
enum HashType {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashType {
    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => sha1::Sha1::digest(data).to_vec(),
            Self::Sha224 => sha2::Sha224::digest(data).to_vec(),
            Self::Sha256 => sha2::Sha256::digest(data).to_vec(),
            Self::Sha384 => sha2::Sha384::digest(data).to_vec(),
            Self::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }

    fn output_bits(self) -> usize {
        match self {
            Self::Sha1 => 160,
            Self::Sha224 => 224,
            Self::Sha256 => 256,
            Self::Sha384 => 384,
            Self::Sha512 => 512,
        }
    }
}

fn key_mismatch(uri: &str, key: &VerifyingKey) -> Error {
    Error::Key(format!("{} key cannot verify {uri}", key.kind()))
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 {
    uri: &'static str,
    hash: HashType,
}

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn verify(&self, key: &VerifyingKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let VerifyingKey::Rsa(public_key) = key else {
            return Err(key_mismatch(self.uri, key));
        };
        let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes)
            .map_err(|e| Error::Crypto(format!("invalid RSA signature: {e}")))?;
        macro_rules! do_verify {
            ($hasher:ty) => {{
                let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key.clone());
                Ok(vk.verify(data, &sig).is_ok())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_verify!(sha1::Sha1),
            HashType::Sha224 => do_verify!(sha2::Sha224),
            HashType::Sha256 => do_verify!(sha2::Sha256),
            HashType::Sha384 => do_verify!(sha2::Sha384),
            HashType::Sha512 => do_verify!(sha2::Sha512),
        }
    }
}

// ── RSA-PSS ──────────────────────────────────────────────────────────

struct RsaPss {
    uri: &'static str,
    hash: HashType,
}

impl SignatureAlgorithm for RsaPss {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn verify(&self, key: &VerifyingKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let VerifyingKey::Rsa(public_key) = key else {
            return Err(key_mismatch(self.uri, key));
        };
        let sig = rsa::pss::Signature::try_from(sig_bytes)
            .map_err(|e| Error::Crypto(format!("invalid RSA-PSS signature: {e}")))?;
        macro_rules! do_verify {
            ($hasher:ty) => {{
                let vk = rsa::pss::VerifyingKey::<$hasher>::new(public_key.clone());
                Ok(vk.verify(data, &sig).is_ok())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_verify!(sha1::Sha1),
            HashType::Sha224 => do_verify!(sha2::Sha224),
            HashType::Sha256 => do_verify!(sha2::Sha256),
            HashType::Sha384 => do_verify!(sha2::Sha384),
            HashType::Sha512 => do_verify!(sha2::Sha512),
        }
    }
}

// ── ECDSA ────────────────────────────────────────────────────────────

/// The curve comes from the key; the hash comes from the algorithm URI.
struct Ecdsa {
    uri: &'static str,
    hash: HashType,
}

/// Split an XML-DSig `r || s` value into equal halves of `scalar_len` bytes.
fn split_rs(rs: &[u8], scalar_len: usize, what: &str) -> Result<(Vec<u8>, Vec<u8>), Error> {
    if rs.len() != 2 * scalar_len {
        return Err(Error::Crypto(format!(
            "{what} signature must be {} bytes, got {}",
            2 * scalar_len,
            rs.len()
        )));
    }
    let (r, s) = rs.split_at(scalar_len);
    Ok((r.to_vec(), s.to_vec()))
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-256.
pub fn xmldsig_to_p256(rs: &[u8]) -> Result<p256::ecdsa::Signature, Error> {
    let (r, s) = split_rs(rs, 32, "P-256")?;
    p256::ecdsa::Signature::from_scalars(
        *p256::FieldBytes::from_slice(&r),
        *p256::FieldBytes::from_slice(&s),
    )
    .map_err(|e| Error::Crypto(format!("invalid P-256 signature: {e}")))
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-384.
pub fn xmldsig_to_p384(rs: &[u8]) -> Result<p384::ecdsa::Signature, Error> {
    let (r, s) = split_rs(rs, 48, "P-384")?;
    p384::ecdsa::Signature::from_scalars(
        *p384::FieldBytes::from_slice(&r),
        *p384::FieldBytes::from_slice(&s),
    )
    .map_err(|e| Error::Crypto(format!("invalid P-384 signature: {e}")))
}

impl SignatureAlgorithm for Ecdsa {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn verify(&self, key: &VerifyingKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let prehash = self.hash.digest(data);
        match key {
            VerifyingKey::EcP256(vk) => {
                let sig = xmldsig_to_p256(sig_bytes)?;
                Ok(vk.verify_prehash(&prehash, &sig).is_ok())
            }
            VerifyingKey::EcP384(vk) => {
                let sig = xmldsig_to_p384(sig_bytes)?;
                Ok(vk.verify_prehash(&prehash, &sig).is_ok())
            }
            other => Err(key_mismatch(self.uri, other)),
        }
    }
}

// ── DSA ──────────────────────────────────────────────────────────────

struct Dsa {
    uri: &'static str,
    hash: HashType,
}

impl SignatureAlgorithm for Dsa {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn verify(&self, key: &VerifyingKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let VerifyingKey::Dsa(vk) = key else {
            return Err(key_mismatch(self.uri, key));
        };
        // r and s are each as wide as the subgroup order q.
        let q_len = vk.components().q().bits().div_ceil(8);
        let (r, s) = split_rs(sig_bytes, q_len, "DSA")?;
        let sig = dsa::Signature::from_components(
            dsa::BigUint::from_bytes_be(&r),
            dsa::BigUint::from_bytes_be(&s),
        )
        .map_err(|e| Error::Crypto(format!("invalid DSA signature: {e}")))?;
        let prehash = self.hash.digest(data);
        Ok(vk.verify_prehash(&prehash, &sig).is_ok())
    }
}

// ── HMAC ─────────────────────────────────────────────────────────────

struct HmacVerify {
    uri: &'static str,
    hash: HashType,
    /// `HMACOutputLength` in bits; `None` means the full MAC.
    output_bits: Option<usize>,
}

impl HmacVerify {
    /// Truncation below half the hash size (and below 80 bits) is refused.
    fn min_output_bits(&self) -> usize {
        (self.hash.output_bits() / 2).max(80)
    }
}

impl SignatureAlgorithm for HmacVerify {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn verify(&self, key: &VerifyingKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let VerifyingKey::Hmac(secret) = key else {
            return Err(key_mismatch(self.uri, key));
        };
        let mac = compute_hmac(self.hash, secret, data)?;
        let expected = match self.output_bits {
            None => &mac[..],
            Some(bits) => {
                if bits < self.min_output_bits() || bits > self.hash.output_bits() || bits % 8 != 0 {
                    return Err(Error::Crypto(format!(
                        "HMACOutputLength {bits} not accepted for {}",
                        self.uri
                    )));
                }
                &mac[..bits / 8]
            }
        };
        Ok(crate::constant_time_eq(expected, sig_bytes))
    }
}

fn compute_hmac(hash: HashType, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    use hmac::{Hmac, Mac};
    macro_rules! hmac_compute {
        ($hasher:ty) => {{
            let mut mac = <Hmac<$hasher>>::new_from_slice(key)
                .map_err(|e| Error::Key(format!("HMAC key: {e}")))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }};
    }
    match hash {
        HashType::Sha1 => hmac_compute!(sha1::Sha1),
        HashType::Sha224 => hmac_compute!(sha2::Sha224),
        HashType::Sha256 => hmac_compute!(sha2::Sha256),
        HashType::Sha384 => hmac_compute!(sha2::Sha384),
        HashType::Sha512 => hmac_compute!(sha2::Sha512),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signature::hazmat::PrehashSigner;

    #[test]
    fn test_rsa_pkcs1v15_roundtrip() {
        use signature::{SignatureEncoding, Signer};
        let mut rng = rand::thread_rng();
        let private = rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let signer = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(private.clone());
        let sig = signer.sign(b"signed info").to_vec();

        let key = VerifyingKey::Rsa(private.to_public_key());
        let alg = from_uri(algorithm::RSA_SHA256).unwrap();
        assert!(alg.verify(&key, b"signed info", &sig).unwrap());
        assert!(!alg.verify(&key, b"signed inf0", &sig).unwrap());

        // Same key, wrong hash in the URI.
        let sha1 = from_uri(algorithm::RSA_SHA1).unwrap();
        assert!(!sha1.verify(&key, b"signed info", &sig).unwrap());
    }

    #[test]
    fn test_ecdsa_uses_declared_hash() {
        let sk = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let prehash = HashType::Sha384.digest(b"payload");
        let sig: p256::ecdsa::Signature = sk.sign_prehash(&prehash).unwrap();
        let sig_bytes = sig.to_bytes().to_vec();
        let key = VerifyingKey::EcP256(*sk.verifying_key());

        let alg = from_uri(algorithm::ECDSA_SHA384).unwrap();
        assert!(alg.verify(&key, b"payload", &sig_bytes).unwrap());
        let wrong = from_uri(algorithm::ECDSA_SHA256).unwrap();
        assert!(!wrong.verify(&key, b"payload", &sig_bytes).unwrap());
        assert!(matches!(
            alg.verify(&key, b"payload", &sig_bytes[..63]),
            Err(Error::Crypto(_))
        ));
    }

    #[test]
    fn test_ecdsa_p384() {
        let sk = p384::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let prehash = HashType::Sha512.digest(b"payload");
        let sig: p384::ecdsa::Signature = sk.sign_prehash(&prehash).unwrap();
        let key = VerifyingKey::EcP384(*sk.verifying_key());
        let alg = from_uri(algorithm::ECDSA_SHA512).unwrap();
        assert!(alg.verify(&key, b"payload", &sig.to_bytes()).unwrap());
    }

    #[test]
    #[allow(deprecated)]
    fn test_dsa_roundtrip() {
        let mut rng = rand::thread_rng();
        let components = dsa::Components::generate(&mut rng, dsa::KeySize::DSA_1024_160);
        let sk = dsa::SigningKey::generate(&mut rng, components);
        let prehash = HashType::Sha1.digest(b"payload");
        let sig: dsa::Signature = sk.sign_prehash(&prehash).unwrap();

        let pad = |n: &dsa::BigUint| {
            let bytes = n.to_bytes_be();
            let mut out = vec![0u8; 20 - bytes.len()];
            out.extend_from_slice(&bytes);
            out
        };
        let mut rs = pad(sig.r());
        rs.extend(pad(sig.s()));

        let key = VerifyingKey::Dsa(sk.verifying_key().clone());
        let alg = from_uri(algorithm::DSA_SHA1).unwrap();
        assert!(alg.verify(&key, b"payload", &rs).unwrap());
        assert!(!alg.verify(&key, b"payl0ad", &rs).unwrap());
    }

    #[test]
    fn test_hmac_rfc4231_case2() {
        let key = VerifyingKey::Hmac(b"Jefe".to_vec());
        let data = b"what do ya want for nothing?";
        let mac = hex::decode("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
            .unwrap();
        let alg = from_uri(algorithm::HMAC_SHA256).unwrap();
        assert!(alg.verify(&key, data, &mac).unwrap());
        assert!(!alg.verify(&key, data, &mac[..16]).unwrap());

        let truncated = from_uri_with_hmac_length(algorithm::HMAC_SHA256, Some(128)).unwrap();
        assert!(truncated.verify(&key, data, &mac[..16]).unwrap());
        assert!(!truncated.verify(&key, data, &mac).unwrap());
    }

    #[test]
    fn test_hmac_output_length_minimum() {
        let key = VerifyingKey::Hmac(b"secret".to_vec());
        let alg = from_uri_with_hmac_length(algorithm::HMAC_SHA1, Some(40)).unwrap();
        assert!(matches!(alg.verify(&key, b"x", &[0; 5]), Err(Error::Crypto(_))));
    }

    #[test]
    fn test_key_mismatch_and_unsupported() {
        let alg = from_uri(algorithm::RSA_SHA256).unwrap();
        let key = VerifyingKey::Hmac(vec![1, 2, 3]);
        assert!(matches!(alg.verify(&key, b"", &[]), Err(Error::Key(_))));
        assert!(matches!(
            from_uri("http://example.org/no-such-alg"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
        assert_eq!(SUPPORTED.len(), 22);
        for uri in SUPPORTED {
            assert_eq!(from_uri(uri).unwrap().uri(), *uri);
        }
    }
}

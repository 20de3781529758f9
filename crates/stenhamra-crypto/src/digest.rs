#![forbid(unsafe_code)]

//! Digest (hash) algorithm implementations.

use digest::Digest;
use stenhamra_core::{algorithm, Error};

/// Trait for digest algorithms.
pub trait DigestAlgorithm: Send {
    /// Feed data into the hash.
    fn update(&mut self, data: &[u8]);
    /// Finalize and return the hash value.
    fn finalize(self: Box<Self>) -> Vec<u8>;
    /// Algorithm URI.
    fn uri(&self) -> &'static str;
}

/// Create a digest algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn DigestAlgorithm>, Error> {
    match uri {
        algorithm::SHA1 => Ok(Box::new(Sha1Digest::new())),
        algorithm::SHA224 => Ok(Box::new(Sha224Digest::new())),
        algorithm::SHA256 => Ok(Box::new(Sha256Digest::new())),
        algorithm::SHA384 => Ok(Box::new(Sha384Digest::new())),
        algorithm::SHA512 => Ok(Box::new(Sha512Digest::new())),
        algorithm::SHA3_224 => Ok(Box::new(Sha3_224Digest::new())),
        algorithm::SHA3_256 => Ok(Box::new(Sha3_256Digest::new())),
        algorithm::SHA3_384 => Ok(Box::new(Sha3_384Digest::new())),
        algorithm::SHA3_512 => Ok(Box::new(Sha3_512Digest::new())),
        _ => Err(Error::UnsupportedAlgorithm(format!(
            "digest algorithm: {uri}"
        ))),
    }
}

/// Compute a digest in one shot.
pub fn digest(uri: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut hasher = from_uri(uri)?;
    hasher.update(data);
    Ok(hasher.finalize())
}

/// All digest URIs understood by [`from_uri`].
pub const SUPPORTED: &[&str] = &[
    algorithm::SHA1,
    algorithm::SHA224,
    algorithm::SHA256,
    algorithm::SHA384,
    algorithm::SHA512,
    algorithm::SHA3_224,
    algorithm::SHA3_256,
    algorithm::SHA3_384,
    algorithm::SHA3_512,
];

// ── Concrete implementations ─────────────────────────────────────────

macro_rules! impl_digest {
    ($name:ident, $hasher:ty, $uri:expr) => {
        struct $name {
            inner: $hasher,
        }

        impl $name {
            fn new() -> Self {
                Self {
                    inner: <$hasher>::new(),
                }
            }
        }

        impl DigestAlgorithm for $name {
            fn update(&mut self, data: &[u8]) {
                Digest::update(&mut self.inner, data);
            }

            fn finalize(self: Box<Self>) -> Vec<u8> {
                Digest::finalize(self.inner).to_vec()
            }

            fn uri(&self) -> &'static str {
                $uri
            }
        }
    };
}

impl_digest!(Sha1Digest, sha1::Sha1, algorithm::SHA1);
impl_digest!(Sha224Digest, sha2::Sha224, algorithm::SHA224);
impl_digest!(Sha256Digest, sha2::Sha256, algorithm::SHA256);
impl_digest!(Sha384Digest, sha2::Sha384, algorithm::SHA384);
impl_digest!(Sha512Digest, sha2::Sha512, algorithm::SHA512);
impl_digest!(Sha3_224Digest, sha3::Sha3_224, algorithm::SHA3_224);
impl_digest!(Sha3_256Digest, sha3::Sha3_256, algorithm::SHA3_256);
impl_digest!(Sha3_384Digest, sha3::Sha3_384, algorithm::SHA3_384);
impl_digest!(Sha3_512Digest, sha3::Sha3_512, algorithm::SHA3_512);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(
            hex::encode(digest(algorithm::SHA256, b"abc").unwrap()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            hex::encode(digest(algorithm::SHA1, b"abc").unwrap()),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            hex::encode(digest(algorithm::SHA3_256, b"abc").unwrap()),
            "3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532"
        );
    }

    #[test]
    fn test_output_lengths() {
        let lens: Vec<usize> = SUPPORTED
            .iter()
            .map(|uri| digest(uri, b"").unwrap().len())
            .collect();
        assert_eq!(lens, vec![20, 28, 32, 48, 64, 28, 32, 48, 64]);
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut hasher = from_uri(algorithm::SHA384).unwrap();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.uri(), algorithm::SHA384);
        assert_eq!(hasher.finalize(), digest(algorithm::SHA384, b"hello world").unwrap());
    }

    #[test]
    fn test_unsupported() {
        assert!(matches!(
            digest("http://www.w3.org/2001/04/xmldsig-more#md5", b""),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }
}

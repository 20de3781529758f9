#![forbid(unsafe_code)]

/// Errors produced by the Stenhamra verification engine.
///
/// Signature-level outcomes (digest mismatch, bad signature value, missing
/// key) are not errors; they are reported through the verification result.
/// The variants here are the conditions that stop a step from producing an
/// answer at all.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("no Signature element found: {0}")]
    SignatureNotFound(String),

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("corrupt KeyInfo: {0}")]
    KeyInfo(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("resource resolution failed: {0}")]
    Resolution(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for errors that come from fetching a referenced resource.
    ///
    /// These fail the reference that triggered them; they do not abort
    /// verification of the remaining references.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Error::Resolution(_) | Error::InvalidUri(_) | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_classification() {
        assert!(Error::Resolution("gone".into()).is_resolution());
        assert!(Error::InvalidUri("#nope".into()).is_resolution());
        assert!(!Error::Canonicalization("bad".into()).is_resolution());
        assert!(!Error::UnsupportedAlgorithm("md2".into()).is_resolution());
    }

    #[test]
    fn test_display() {
        let e = Error::KeyInfo("X509Certificate: bad DER".into());
        assert_eq!(e.to_string(), "corrupt KeyInfo: X509Certificate: bad DER");
    }
}

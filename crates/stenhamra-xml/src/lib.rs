#![forbid(unsafe_code)]

//! XML document abstraction for the Stenhamra verification engine.
//!
//! Provides helpers over `roxmltree`, plus the `NodeSet` type needed for
//! canonicalization and signature transforms.

pub mod document;
pub mod nodeset;
pub mod qname;
pub mod xpath;

pub use document::XmlDocument;
pub use nodeset::NodeSet;

/// Return roxmltree parsing options that allow DTD.
///
/// DTD is allowed because roxmltree does not expand external entities or
/// perform entity substitution beyond internal entity declarations, so it
/// is safe. Many published XML-DSig test vectors carry an internal subset.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}

/// Parse XML text with [`parsing_options`].
pub fn parse(text: &str) -> Result<roxmltree::Document<'_>, stenhamra_core::Error> {
    roxmltree::Document::parse_with_options(text, parsing_options())
        .map_err(|e| stenhamra_core::Error::XmlParse(e.to_string()))
}

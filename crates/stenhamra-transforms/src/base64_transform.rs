#![forbid(unsafe_code)]

//! Base64 decode transform.

use crate::pipeline::{Transform, TransformData};
use stenhamra_core::{algorithm, Error};

/// Base64 decode transform.
///
/// A node-set input is first reduced to the string value of its text
/// nodes, in document order.
pub struct Base64DecodeTransform;

impl Transform for Base64DecodeTransform {
    fn uri(&self) -> &str {
        algorithm::BASE64
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        use base64::Engine;
        let engine = base64::engine::general_purpose::STANDARD;

        let text = match input {
            TransformData::Binary(data) => String::from_utf8(data)
                .map_err(|e| Error::Transform(format!("base64 input not UTF-8: {e}")))?,
            TransformData::Xml { xml_text, node_set } => {
                let doc = stenhamra_xml::parse(&xml_text)?;
                doc.descendants()
                    .filter(|n| n.is_text())
                    .filter(|n| node_set.as_ref().map_or(true, |set| set.contains(n)))
                    .filter_map(|n| n.text())
                    .collect()
            }
        };

        let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();

        let decoded = engine
            .decode(&cleaned)
            .map_err(|e| Error::Base64(format!("decode error: {e}")))?;

        Ok(TransformData::Binary(decoded))
    }
}

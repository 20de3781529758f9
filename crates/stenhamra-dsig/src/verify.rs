#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Processing order:
//! 1. Parse the document and locate the first `<ds:Signature>`
//! 2. Resolve the verification key (external key, then `<KeyInfo>`)
//! 3. For each `<Reference>`: resolve URI, run transforms, compute digest, compare
//! 4. Canonicalize `<SignedInfo>` and verify `<SignatureValue>`

use crate::context::DsigContext;
use crate::model::Signature;
use crate::reference::{verify_reference, ReferenceEnv, ReferenceReport, VisitedManifests};
use std::fmt;
use stenhamra_core::{ns, Error};
use stenhamra_keys::{Key, KeySource};
use stenhamra_transforms::EnclosingSignature;
use stenhamra_xml::document::find_element;
use stenhamra_xml::NodeSet;

/// Why no verdict could be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndeterminateReason {
    /// Neither the caller nor the document supplied a usable key.
    NoKey,
    /// The document's KeyInfo carries key material that does not decode.
    CorruptKeyInfo(String),
}

impl fmt::Display for IndeterminateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoKey => write!(f, "no verification key available"),
            Self::CorruptKeyInfo(detail) => write!(f, "corrupt KeyInfo: {detail}"),
        }
    }
}

/// Result of signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// Signature is valid.
    Valid,
    /// Signature is invalid.
    Invalid { reason: String },
    /// No verdict; never to be treated as valid.
    Indeterminate(IndeterminateReason),
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid)
    }
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "OK"),
            Self::Invalid { reason } => write!(f, "INVALID: {reason}"),
            Self::Indeterminate(reason) => write!(f, "INDETERMINATE: {reason}"),
        }
    }
}

/// The verdict together with per-reference diagnostics.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub result: VerifyResult,
    /// `Id` of the verified `<ds:Signature>`.
    pub signature_id: Option<String>,
    /// Where the key came from, when one was found.
    pub key_source: Option<KeySource>,
    pub key_name: Option<String>,
    /// One entry per `SignedInfo` reference, in document order.
    pub references: Vec<ReferenceReport>,
    /// Outcome of the `SignatureValue` check, when it was performed.
    pub signature_value_valid: Option<bool>,
}

/// Verify a signed XML document.
pub fn verify(ctx: &DsigContext, xml: &str) -> Result<VerifyResult, Error> {
    Ok(verify_with_report(ctx, xml)?.result)
}

/// Verify a signed XML document and report on every reference.
pub fn verify_with_report(ctx: &DsigContext, xml: &str) -> Result<VerifyReport, Error> {
    let document = ctx.document(xml);
    let doc = document.parse_doc()?;
    let id_map = document.build_id_map(&doc);

    let sig_node = find_element(&doc, ns::DSIG, ns::node::SIGNATURE)
        .ok_or_else(|| Error::SignatureNotFound("no ds:Signature element in document".into()))?;
    let signature = Signature::parse(sig_node)?;

    let mut report = VerifyReport {
        result: VerifyResult::Valid,
        signature_id: signature.id.map(str::to_owned),
        key_source: None,
        key_name: None,
        references: Vec::new(),
        signature_value_valid: None,
    };

    let key = match resolve_key(ctx, &signature) {
        Ok(Some(key)) => key,
        Ok(None) => {
            log::debug!("no key for signature");
            report.result = VerifyResult::Indeterminate(IndeterminateReason::NoKey);
            return Ok(report);
        }
        Err(Error::KeyInfo(detail)) => {
            log::warn!("corrupt KeyInfo: {detail}");
            report.result =
                VerifyResult::Indeterminate(IndeterminateReason::CorruptKeyInfo(detail));
            return Ok(report);
        }
        Err(e) => return Err(e),
    };
    report.key_source = Some(key.source);
    report.key_name = key.name.clone();

    let visited = VisitedManifests::default();
    let enclosing = EnclosingSignature::new(sig_node.id(), doc.input_text());
    let env = ReferenceEnv::new(ctx, &doc, &id_map, &enclosing, &visited);
    for reference in &signature.signed_info.references {
        report.references.push(verify_reference(reference, &env)?);
    }
    let failed_reference = report.references.iter().find(|r| !r.is_valid());

    let Some(signature_value) = signature.signature_value.as_deref() else {
        report.result = VerifyResult::Invalid {
            reason: match failed_reference {
                Some(r) => format!("reference failed: {}", r.describe()),
                None => "missing SignatureValue".into(),
            },
        };
        return Ok(report);
    };

    let signed_info = &signature.signed_info;
    let c14n_signed_info = stenhamra_c14n::canonicalize_doc(
        &doc,
        signed_info.c14n_mode,
        Some(&NodeSet::tree_without_comments(signed_info.node)),
        &signed_info.inclusive_prefixes,
    )?;
    if ctx.debug {
        log::debug!(
            "pre-signature data ({} bytes):\n{}",
            c14n_signed_info.len(),
            String::from_utf8_lossy(&c14n_signed_info)
        );
    }

    let algorithm = stenhamra_crypto::sign::from_uri_with_hmac_length(
        signed_info.signature_method,
        signed_info.hmac_output_length,
    )?;
    // A malformed value or a key unfit for the method is a failed check,
    // not a fatal error.
    let signature_check =
        match algorithm.verify(key.verifying_key(), &c14n_signed_info, signature_value) {
            Ok(valid) => Ok(valid),
            Err(e @ (Error::Crypto(_) | Error::Key(_))) => {
                log::debug!("SignatureValue rejected: {e}");
                Err(e)
            }
            Err(e) => return Err(e),
        };
    report.signature_value_valid = Some(matches!(signature_check, Ok(true)));

    report.result = match (failed_reference, signature_check) {
        (Some(r), _) => VerifyResult::Invalid {
            reason: format!("reference failed: {}", r.describe()),
        },
        (None, Ok(false)) => VerifyResult::Invalid {
            reason: "signature value verification failed".into(),
        },
        (None, Err(e)) => VerifyResult::Invalid {
            reason: format!("signature value rejected: {e}"),
        },
        (None, Ok(true)) => VerifyResult::Valid,
    };
    log::debug!("signature verification result: {}", report.result);
    Ok(report)
}

/// A caller-supplied key wins over the document's KeyInfo.
fn resolve_key(ctx: &DsigContext, signature: &Signature<'_, '_>) -> Result<Option<Key>, Error> {
    if let Some(key) = ctx.external_key() {
        log::debug!("using external {:?}", key.data);
        return Ok(Some(key.clone()));
    }
    match signature.key_info {
        Some(key_info) => stenhamra_keys::extract_key(key_info, &ctx.key_info_policy()),
        None => Ok(None),
    }
}

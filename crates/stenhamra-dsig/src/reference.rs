#![forbid(unsafe_code)]

//! Reference processing: resolve, transform, digest, compare.

use crate::context::DsigContext;
use crate::manifest::{self, ManifestOutcome};
use crate::model::Reference;
use roxmltree::{Document, NodeId};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use stenhamra_core::Error;
use stenhamra_crypto::{constant_time_eq, digest};
use stenhamra_transforms::{
    Deadline, EnclosingSignature, ResolveContext, TransformData, TransformPipeline,
};

/// `(document, URI)` pairs of the manifests currently being expanded.
pub type VisitedManifests = RefCell<HashSet<(String, String)>>;

/// Why a reference did or did not verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceStatus {
    Valid,
    /// The computed digest differs from `DigestValue`.
    DigestMismatch,
    /// The URI could not be resolved.
    ResolutionFailed(String),
    /// A transform could not be applied to the resolved data.
    TransformFailed(String),
    /// The digest matched but the manifest it covers did not verify.
    ManifestInvalid(String),
}

/// Verification outcome for one `<ds:Reference>`.
#[derive(Debug, Clone)]
pub struct ReferenceReport {
    pub uri: Option<String>,
    pub id: Option<String>,
    pub status: ReferenceStatus,
    /// Reports for the references of a followed manifest.
    pub manifest: Vec<ReferenceReport>,
}

impl ReferenceReport {
    fn new(reference: &Reference<'_, '_>, status: ReferenceStatus) -> Self {
        Self {
            uri: reference.uri.map(str::to_owned),
            id: reference.id.map(str::to_owned),
            status,
            manifest: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == ReferenceStatus::Valid
    }

    /// One-line description of a failure.
    pub fn describe(&self) -> String {
        let uri = self.uri.as_deref().unwrap_or("");
        match &self.status {
            ReferenceStatus::Valid => format!("URI=\"{uri}\": valid"),
            ReferenceStatus::DigestMismatch => format!("URI=\"{uri}\": digest mismatch"),
            ReferenceStatus::ResolutionFailed(e) => format!("URI=\"{uri}\": {e}"),
            ReferenceStatus::TransformFailed(e) => format!("URI=\"{uri}\": {e}"),
            ReferenceStatus::ManifestInvalid(e) => format!("URI=\"{uri}\": manifest invalid: {e}"),
        }
    }
}

/// Where a reference is being verified from.
pub struct ReferenceEnv<'a, 'input> {
    pub(crate) ctx: &'a DsigContext,
    /// Document same-document URIs resolve against.
    pub(crate) doc: &'a Document<'input>,
    pub(crate) id_map: &'a HashMap<String, NodeId>,
    /// The enclosing signature, when `doc` is the signature document.
    pub(crate) signature: Option<&'a EnclosingSignature>,
    /// Identity of `doc` in the visited set; empty for the signature document.
    pub(crate) label: &'a str,
    pub(crate) depth: usize,
    pub(crate) visited: &'a VisitedManifests,
}

impl<'a, 'input> ReferenceEnv<'a, 'input> {
    /// Environment for the references of a signature's `SignedInfo`.
    pub fn new(
        ctx: &'a DsigContext,
        doc: &'a Document<'input>,
        id_map: &'a HashMap<String, NodeId>,
        signature: &'a EnclosingSignature,
        visited: &'a VisitedManifests,
    ) -> Self {
        Self {
            ctx,
            doc,
            id_map,
            signature: Some(signature),
            label: "",
            depth: 0,
            visited,
        }
    }

    fn resolve(&self, uri: &str) -> Result<TransformData, Error> {
        let rctx = ResolveContext {
            doc: self.doc,
            id_map: self.id_map,
            base_dir: self.ctx.base_dir.as_deref(),
            deadline: Deadline::start(self.ctx.resolve_timeout, self.ctx.cancel_flag()),
        };
        self.ctx.resolvers().resolve(uri, &rctx)
    }
}

/// Verify one reference.
///
/// Resolution and transform failures are recorded in the report.
/// Unsupported digest or transform algorithms are returned as errors.
pub fn verify_reference(
    reference: &Reference<'_, '_>,
    env: &ReferenceEnv<'_, '_>,
) -> Result<ReferenceReport, Error> {
    let uri = reference.uri_or_empty();
    let pipeline = TransformPipeline::from_element(reference.transforms, env.signature)?;
    let mut hasher = digest::from_uri(reference.digest_method)?;

    let data = match env.resolve(uri) {
        Ok(data) => data,
        Err(e) if e.is_resolution() => {
            log::debug!("reference URI=\"{uri}\" failed to resolve: {e}");
            return Ok(ReferenceReport::new(
                reference,
                ReferenceStatus::ResolutionFailed(e.to_string()),
            ));
        }
        Err(e) => return Err(e),
    };

    let octets = match pipeline.execute(data).and_then(|d| d.to_binary()) {
        Ok(octets) => octets,
        Err(e @ Error::UnsupportedAlgorithm(_)) => return Err(e),
        Err(e) => {
            log::debug!("reference URI=\"{uri}\" transform failed: {e}");
            return Ok(ReferenceReport::new(
                reference,
                ReferenceStatus::TransformFailed(e.to_string()),
            ));
        }
    };

    if env.ctx.debug {
        log::debug!(
            "pre-digest data for URI=\"{uri}\" ({} bytes):\n{}",
            octets.len(),
            String::from_utf8_lossy(&octets)
        );
    }

    hasher.update(&octets);
    let computed = hasher.finalize();
    if !constant_time_eq(&computed, &reference.digest_value) {
        log::debug!("reference URI=\"{uri}\": digest mismatch");
        return Ok(ReferenceReport::new(reference, ReferenceStatus::DigestMismatch));
    }

    if !env.ctx.follow_nested_manifests {
        if reference.declares_manifest() {
            log::warn!("reference URI=\"{uri}\" covers a Manifest; its references are not followed");
        }
        return Ok(ReferenceReport::new(reference, ReferenceStatus::Valid));
    }

    let report = match manifest::expand(reference, &octets, env)? {
        ManifestOutcome::NotManifest => ReferenceReport::new(reference, ReferenceStatus::Valid),
        ManifestOutcome::Rejected(reason) => {
            ReferenceReport::new(reference, ReferenceStatus::ManifestInvalid(reason))
        }
        ManifestOutcome::Verified(inner) => {
            let status = match inner.iter().find(|r| !r.is_valid()) {
                Some(failed) => ReferenceStatus::ManifestInvalid(failed.describe()),
                None => ReferenceStatus::Valid,
            };
            ReferenceReport {
                manifest: inner,
                ..ReferenceReport::new(reference, status)
            }
        }
    };
    Ok(report)
}

#![forbid(unsafe_code)]

//! Nested `ds:Manifest` expansion.
//!
//! A manifest reached through a matching reference has its own references
//! verified. Expansion is bounded by the context's depth limit, and a
//! manifest that is already being expanded further up is not entered
//! again.

use crate::model::Reference;
use crate::reference::{verify_reference, ReferenceEnv, ReferenceReport};
use roxmltree::Node;
use stenhamra_core::{ns, Error};
use stenhamra_xml::document::{find_child_elements, is_element_named};
use stenhamra_xml::xpath::{self, SameDocumentRef};

/// Result of looking for a manifest behind a reference.
#[derive(Debug)]
pub(crate) enum ManifestOutcome {
    /// The reference does not cover a `ds:Manifest`.
    NotManifest,
    /// The manifest could not be expanded.
    Rejected(String),
    /// One report per manifest reference.
    Verified(Vec<ReferenceReport>),
}

fn is_manifest(node: Node<'_, '_>) -> bool {
    is_element_named(node, ns::DSIG, ns::node::MANIFEST)
}

/// Expand the manifest a verified reference points at, if there is one.
///
/// `octets` is the transformed reference data; it is parsed when the
/// reference points outside the current document.
pub(crate) fn expand(
    reference: &Reference<'_, '_>,
    octets: &[u8],
    env: &ReferenceEnv<'_, '_>,
) -> Result<ManifestOutcome, Error> {
    let uri = reference.uri_or_empty();

    let in_document = match xpath::classify(uri) {
        Some(SameDocumentRef::Id(id)) | Some(SameDocumentRef::XPointerId(id)) => {
            xpath::resolve_id(env.doc, env.id_map, id).ok()
        }
        Some(SameDocumentRef::WholeDocument) | Some(SameDocumentRef::XPointerRoot) => {
            Some(env.doc.root_element())
        }
        None => None,
    };

    if let Some(node) = in_document {
        if !is_manifest(node) {
            return Ok(not_a_manifest(reference));
        }
        return enter(uri, env, |visited_env| {
            let child = ReferenceEnv {
                depth: env.depth + 1,
                ..*visited_env
            };
            verify_manifest_references(node, &child)
        });
    }

    if xpath::classify(uri).is_some() {
        return Ok(not_a_manifest(reference));
    }

    let Ok(text) = std::str::from_utf8(octets) else {
        return Ok(not_a_manifest(reference));
    };
    let document = env.ctx.document(text);
    let Ok(doc) = document.parse_doc() else {
        return Ok(not_a_manifest(reference));
    };
    if !is_manifest(doc.root_element()) {
        return Ok(not_a_manifest(reference));
    }
    let id_map = document.build_id_map(&doc);
    enter(uri, env, |_| {
        let child = ReferenceEnv {
            ctx: env.ctx,
            doc: &doc,
            id_map: &id_map,
            signature: None,
            label: uri,
            depth: env.depth + 1,
            visited: env.visited,
        };
        verify_manifest_references(doc.root_element(), &child)
    })
}

fn not_a_manifest(reference: &Reference<'_, '_>) -> ManifestOutcome {
    if reference.declares_manifest() {
        ManifestOutcome::Rejected("Type declares a Manifest but the content is not one".into())
    } else {
        ManifestOutcome::NotManifest
    }
}

/// Run `f` with `(env.label, uri)` marked as being expanded.
fn enter<'a, 'input>(
    uri: &str,
    env: &ReferenceEnv<'a, 'input>,
    f: impl FnOnce(&ReferenceEnv<'a, 'input>) -> Result<ManifestOutcome, Error>,
) -> Result<ManifestOutcome, Error> {
    let max = env.ctx.max_manifest_depth;
    if env.depth + 1 > max {
        log::warn!("manifest URI=\"{uri}\" exceeds the nesting limit of {max}");
        return Ok(ManifestOutcome::Rejected(format!(
            "manifest nesting exceeds {max} levels"
        )));
    }
    let key = (env.label.to_owned(), uri.to_owned());
    if !env.visited.borrow_mut().insert(key.clone()) {
        log::warn!("manifest URI=\"{uri}\" refers back to itself");
        return Ok(ManifestOutcome::Rejected(format!(
            "manifest URI=\"{uri}\" is already being expanded"
        )));
    }
    log::debug!("expanding manifest URI=\"{uri}\" at depth {}", env.depth + 1);
    let outcome = f(env);
    env.visited.borrow_mut().remove(&key);
    outcome
}

fn verify_manifest_references(
    manifest: Node<'_, '_>,
    env: &ReferenceEnv<'_, '_>,
) -> Result<ManifestOutcome, Error> {
    let mut reports = Vec::new();
    for node in find_child_elements(manifest, ns::DSIG, ns::node::REFERENCE) {
        let reference = match Reference::parse(node) {
            Ok(reference) => reference,
            Err(e @ Error::UnsupportedAlgorithm(_)) => return Err(e),
            Err(e) => return Ok(ManifestOutcome::Rejected(format!("malformed Reference: {e}"))),
        };
        reports.push(verify_reference(&reference, env)?);
    }
    Ok(ManifestOutcome::Verified(reports))
}

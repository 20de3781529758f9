#![forbid(unsafe_code)]

//! DSig context: resolvers, keys and policy for signature verification.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use stenhamra_keys::{Key, KeyInfoPolicy};
use stenhamra_transforms::{ResolverChain, ResourceResolver, SameDocumentResolver};
use stenhamra_xml::XmlDocument;

/// Default bound on nested manifest expansion.
pub const DEFAULT_MAX_MANIFEST_DEPTH: usize = 10;

/// Context for XML-DSig verification.
///
/// A context is read-only during verification and may be shared between
/// threads.
pub struct DsigContext {
    resolvers: ResolverChain,
    external_key: Option<Key>,
    cancel: Option<Arc<AtomicBool>>,
    /// Verify the references inside `ds:Manifest` content.
    pub follow_nested_manifests: bool,
    /// Take the key from `X509Data` before `KeyValue`.
    pub prefer_certificate_over_key: bool,
    /// Nesting limit for manifest expansion.
    pub max_manifest_depth: usize,
    /// Time limit for each resource resolution.
    pub resolve_timeout: Option<Duration>,
    /// Additional ID attribute names to register.
    pub id_attrs: Vec<String>,
    /// Base directory for resolving relative external URI references.
    pub base_dir: Option<PathBuf>,
    /// Debug mode: log pre-digest and pre-signature data.
    pub debug: bool,
}

impl DsigContext {
    /// A context that resolves same-document references only.
    pub fn new() -> Self {
        let mut resolvers = ResolverChain::new();
        resolvers.add_resolver(Box::new(SameDocumentResolver));
        Self {
            resolvers,
            external_key: None,
            cancel: None,
            follow_nested_manifests: false,
            prefer_certificate_over_key: true,
            max_manifest_depth: DEFAULT_MAX_MANIFEST_DEPTH,
            resolve_timeout: None,
            id_attrs: Vec::new(),
            base_dir: None,
            debug: false,
        }
    }

    /// Append a resolver after the ones already registered.
    pub fn add_resolver(&mut self, resolver: Box<dyn ResourceResolver>) {
        self.resolvers.add_resolver(resolver);
    }

    pub fn resolvers(&self) -> &ResolverChain {
        &self.resolvers
    }

    /// Use this key instead of the document's KeyInfo.
    pub fn set_external_key(&mut self, key: Key) {
        self.external_key = Some(key);
    }

    pub fn external_key(&self) -> Option<&Key> {
        self.external_key.as_ref()
    }

    /// Add an ID attribute name to register during processing.
    pub fn add_id_attr(&mut self, name: &str) {
        self.id_attrs.push(name.to_owned());
    }

    /// Share a flag that aborts pending resolutions once set.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    pub(crate) fn cancel_flag(&self) -> Option<Arc<AtomicBool>> {
        self.cancel.clone()
    }

    /// Wrap `text` with this context's ID attribute names registered.
    pub fn document(&self, text: &str) -> XmlDocument {
        let mut document = XmlDocument::new(text);
        for name in &self.id_attrs {
            document.add_id_attr(name);
        }
        document
    }

    pub(crate) fn key_info_policy(&self) -> KeyInfoPolicy {
        KeyInfoPolicy {
            prefer_certificate_over_key: self.prefer_certificate_over_key,
        }
    }
}

impl Default for DsigContext {
    fn default() -> Self {
        Self::new()
    }
}

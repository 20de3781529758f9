#![forbid(unsafe_code)]

//! Resource resolution for reference URIs.
//!
//! A [`ResolverChain`] holds resolvers in registration order. Each URI is
//! offered to the resolvers in turn and the first one whose predicate
//! claims it produces the data.

use crate::pipeline::TransformData;
use roxmltree::{Document, NodeId};
use stenhamra_core::Error;
use stenhamra_xml::xpath::{self, SameDocumentRef};
use stenhamra_xml::NodeSet;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time limit and cancellation for one resolution.
///
/// Checks are cooperative: resolvers call [`Deadline::check`] between I/O
/// steps, so a single blocked read is not interrupted.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    expires_at: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self::default()
    }

    /// Start the clock now.
    pub fn start(timeout: Option<Duration>, cancel: Option<Arc<AtomicBool>>) -> Self {
        Self {
            expires_at: timeout.map(|t| Instant::now() + t),
            cancel,
        }
    }

    /// Fail when cancelled or past the time limit.
    pub fn check(&self) -> Result<(), Error> {
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return Err(Error::Resolution("cancelled".into()));
        }
        if self.expires_at.is_some_and(|at| Instant::now() >= at) {
            return Err(Error::Resolution("timed out".into()));
        }
        Ok(())
    }
}

/// What a resolver may consult while resolving a URI.
pub struct ResolveContext<'a, 'input> {
    /// The document the reference appears in.
    pub doc: &'a Document<'input>,
    /// ID values registered for `doc`.
    pub id_map: &'a HashMap<String, NodeId>,
    /// Directory relative references resolve against.
    pub base_dir: Option<&'a Path>,
    pub deadline: Deadline,
}

/// A strategy for turning a reference URI into data.
pub trait ResourceResolver: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &str;

    /// Whether this resolver handles `uri`.
    fn can_resolve(&self, uri: &str, ctx: &ResolveContext<'_, '_>) -> bool;

    /// Produce the data `uri` refers to.
    fn resolve(&self, uri: &str, ctx: &ResolveContext<'_, '_>) -> Result<TransformData, Error>;
}

/// Ordered list of resolvers; the first match wins.
#[derive(Default)]
pub struct ResolverChain {
    resolvers: Vec<Box<dyn ResourceResolver>>,
}

impl ResolverChain {
    /// An empty chain. Nothing resolves until resolvers are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolver; earlier resolvers take precedence.
    pub fn add_resolver(&mut self, resolver: Box<dyn ResourceResolver>) {
        self.resolvers.push(resolver);
    }

    /// Names of the registered resolvers, in order.
    pub fn names(&self) -> Vec<&str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Resolve `uri` with the first resolver that claims it.
    pub fn resolve(&self, uri: &str, ctx: &ResolveContext<'_, '_>) -> Result<TransformData, Error> {
        ctx.deadline.check()?;
        let resolver = self
            .resolvers
            .iter()
            .find(|r| r.can_resolve(uri, ctx))
            .ok_or_else(|| Error::Resolution(format!("no resolver for URI \"{uri}\"")))?;
        log::debug!("resolving \"{uri}\" with {}", resolver.name());
        let data = resolver.resolve(uri, ctx)?;
        ctx.deadline.check()?;
        Ok(data)
    }
}

// ── Same document ────────────────────────────────────────────────────

/// Resolves `""`, `#id`, `#xpointer(/)` and `#xpointer(id('x'))` against
/// the current document.
pub struct SameDocumentResolver;

impl ResourceResolver for SameDocumentResolver {
    fn name(&self) -> &str {
        "same-document"
    }

    fn can_resolve(&self, uri: &str, _ctx: &ResolveContext<'_, '_>) -> bool {
        xpath::classify(uri).is_some()
    }

    fn resolve(&self, uri: &str, ctx: &ResolveContext<'_, '_>) -> Result<TransformData, Error> {
        let reference = xpath::classify(uri)
            .ok_or_else(|| Error::InvalidUri(format!("not a same-document reference: {uri}")))?;
        let node_set = match reference {
            SameDocumentRef::WholeDocument => NodeSet::all_without_comments(ctx.doc),
            SameDocumentRef::XPointerRoot => NodeSet::all(ctx.doc),
            SameDocumentRef::Id(id) => {
                NodeSet::tree_without_comments(xpath::resolve_id(ctx.doc, ctx.id_map, id)?)
            }
            SameDocumentRef::XPointerId(id) => {
                NodeSet::tree_with_comments(xpath::resolve_id(ctx.doc, ctx.id_map, id)?)
            }
        };
        Ok(TransformData::Xml {
            xml_text: ctx.doc.input_text().to_owned(),
            node_set: Some(node_set),
        })
    }
}

// ── Filesystem ───────────────────────────────────────────────────────

/// Reads `file:` URIs and relative paths from the filesystem.
///
/// Relative paths resolve against the resolver's own base directory when
/// one is set, otherwise against the context's.
#[derive(Debug, Clone, Default)]
pub struct FileResolver {
    base_dir: Option<PathBuf>,
}

impl FileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn path_for(&self, uri: &str, ctx: &ResolveContext<'_, '_>) -> PathBuf {
        let path = match uri.strip_prefix("file://") {
            Some(rest) => rest,
            None => uri.strip_prefix("file:").unwrap_or(uri),
        };
        let path = Path::new(path);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.base_dir.as_deref().or(ctx.base_dir) {
            Some(base) => base.join(path),
            None => path.to_path_buf(),
        }
    }
}

/// URI scheme, if the reference has one (`scheme:` with a letter first).
fn scheme(uri: &str) -> Option<&str> {
    let (scheme, _) = uri.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    (first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')))
    .then_some(scheme)
}

impl ResourceResolver for FileResolver {
    fn name(&self) -> &str {
        "file"
    }

    fn can_resolve(&self, uri: &str, _ctx: &ResolveContext<'_, '_>) -> bool {
        if uri.is_empty() || uri.starts_with('#') {
            return false;
        }
        match scheme(uri) {
            Some(s) => s.eq_ignore_ascii_case("file"),
            None => true,
        }
    }

    fn resolve(&self, uri: &str, ctx: &ResolveContext<'_, '_>) -> Result<TransformData, Error> {
        let path = self.path_for(uri, ctx);
        let data = read_with_deadline(&path, &ctx.deadline)?;
        Ok(TransformData::Binary(data))
    }
}

const READ_CHUNK: usize = 64 * 1024;

/// Read a file in chunks, checking the deadline before each one.
fn read_with_deadline(path: &Path, deadline: &Deadline) -> Result<Vec<u8>, Error> {
    use std::io::Read;

    let cannot_read = |e: std::io::Error| {
        Error::Resolution(format!("cannot read {}: {e}", path.display()))
    };
    deadline.check()?;
    let mut file = std::fs::File::open(path).map_err(cannot_read)?;
    let mut data = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        deadline.check()?;
        let n = match file.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(cannot_read(e)),
        };
        data.extend_from_slice(&chunk[..n]);
    }
    Ok(data)
}

// ── Offline table ────────────────────────────────────────────────────

/// Serves fixed payloads for literal URI strings.
#[derive(Debug, Clone, Default)]
pub struct OfflineResolver {
    entries: HashMap<String, Vec<u8>>,
}

impl OfflineResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `uri` to `data`, replacing any earlier entry.
    pub fn add(&mut self, uri: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.entries.insert(uri.into(), data.into());
    }

    /// Map `uri` to the contents of a file, read now.
    pub fn add_file(&mut self, uri: impl Into<String>, path: impl AsRef<Path>) -> Result<(), Error> {
        let data = std::fs::read(path.as_ref())?;
        self.add(uri, data);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResourceResolver for OfflineResolver {
    fn name(&self) -> &str {
        "offline"
    }

    fn can_resolve(&self, uri: &str, _ctx: &ResolveContext<'_, '_>) -> bool {
        self.entries.contains_key(uri)
    }

    fn resolve(&self, uri: &str, _ctx: &ResolveContext<'_, '_>) -> Result<TransformData, Error> {
        self.entries
            .get(uri)
            .map(|data| TransformData::Binary(data.clone()))
            .ok_or_else(|| Error::Resolution(format!("no offline entry for \"{uri}\"")))
    }
}

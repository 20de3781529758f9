#![forbid(unsafe_code)]

//! Transform pipeline and resource resolution for Stenhamra.
//!
//! Implements the transform chain model from XML-DSig: each reference
//! names a resource, which a [`ResolverChain`] turns into data, and a
//! sequence of transforms that are applied to it in order.

pub mod base64_transform;
pub mod enveloped;
pub mod pipeline;
pub mod resolver;

pub use enveloped::EnclosingSignature;
pub use pipeline::{C14nTransform, Transform, TransformData, TransformPipeline};
pub use resolver::{
    Deadline, FileResolver, OfflineResolver, ResolveContext, ResolverChain, ResourceResolver,
    SameDocumentResolver,
};

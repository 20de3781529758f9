#![forbid(unsafe_code)]

//! XML Digital Signature (XML-DSig) verification.
//!
//! [`verify`] and [`verify_with_report`] check the first `<ds:Signature>`
//! of a document; [`verify_batch`] runs many documents on worker threads.

pub mod batch;
pub mod context;
mod manifest;
pub mod model;
pub mod reference;
pub mod verify;

pub use batch::{verify_batch, BatchEntry, BatchInput, BatchOptions, BatchOutcome};
pub use context::DsigContext;
pub use reference::{ReferenceReport, ReferenceStatus};
pub use verify::{verify, verify_with_report, IndeterminateReason, VerifyReport, VerifyResult};

#![forbid(unsafe_code)]

//! Stenhamra: XML digital-signature verification.
//!
//! ```no_run
//! use stenhamra::{verify, DsigContext, VerifyResult};
//!
//! let xml = std::fs::read_to_string("signed.xml")?;
//! let ctx = DsigContext::new();
//! match verify(&ctx, &xml)? {
//!     VerifyResult::Valid => println!("OK"),
//!     other => println!("{other}"),
//! }
//! # Ok::<(), stenhamra::Error>(())
//! ```

pub use stenhamra_c14n as c14n;
pub use stenhamra_core as core;
pub use stenhamra_crypto as crypto;
pub use stenhamra_dsig as dsig;
pub use stenhamra_keys as keys;
pub use stenhamra_transforms as transforms;
pub use stenhamra_xml as xml;

pub use stenhamra_core::{Error, Result};
pub use stenhamra_dsig::{
    verify, verify_batch, verify_with_report, BatchInput, BatchOptions, DsigContext,
    IndeterminateReason, ReferenceStatus, VerifyReport, VerifyResult,
};
pub use stenhamra_transforms::{FileResolver, OfflineResolver, ResourceResolver};

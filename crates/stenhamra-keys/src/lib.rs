#![forbid(unsafe_code)]

//! Key handling for the Stenhamra signature verifier.
//!
//! Loads verification keys from PEM, DER and X.509 certificates, and
//! extracts the signing key from a `<ds:KeyInfo>` element.

pub mod key;
pub mod keyinfo;
pub mod loader;

pub use key::{Key, KeySource};
pub use keyinfo::{extract_key, KeyInfoPolicy};

#![forbid(unsafe_code)]

//! Core types for the Stenhamra XML-DSig verification engine.
//!
//! Holds the shared error taxonomy, algorithm URIs and namespace constants
//! used by every other crate in the workspace.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};

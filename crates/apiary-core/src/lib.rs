//! Core algebra for the apiary OpenAPI aggregator.
//!
//! This crate is I/O-free. It defines version identifiers and their
//! resolution rules, content digests, immutable content revisions, the
//! structural OpenAPI merge operator, and the collator that folds per-service
//! revisions into a single document per version.

pub mod canonical;
pub mod collate;
pub mod digest;
pub mod errors;
pub mod exclude;
pub mod merge;
pub mod revision;
pub mod version;

pub use collate::Collator;
pub use errors::{CollateError, VersionError};
pub use exclude::ExcludePatterns;
pub use revision::{ContentRevision, ServiceRevisions};
pub use version::{Stability, Version, VersionSet, PIVOT_DATE};

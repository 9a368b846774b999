//! Storage for apiary: the contract plus memory, disk, and S3 backends.

pub mod backend;
pub mod layout;
mod store;

use async_trait::async_trait;
use time::OffsetDateTime;

use apiary_core::{CollateError, Version, VersionError};

pub use backend::{ObjectBackend, ObjectEntry};
pub use store::Store;

/// Errors surfaced by a storage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested collated version is not present.
    #[error("no matching version")]
    NoMatchingVersion,

    /// A version string failed to parse. During key hydration this indicates
    /// a corrupt store.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Collation aborted; the previously collated set remains in place.
    #[error(transparent)]
    Collate(#[from] CollateError),

    /// Underlying backend failure.
    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Durable, content-addressed revision store plus the collated-version store.
///
/// `notify_version` is an idempotent upsert keyed by
/// `(service, version, digest)`. `collate_versions` atomically publishes a
/// fresh collated set: concurrent readers observe either the previous set or
/// the next one, never a mixture.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Record the set of versions a service currently advertises. Intended
    /// as the hook for future sunset bookkeeping; no pruning happens today.
    async fn notify_versions(
        &self,
        service: &str,
        versions: &[String],
        scrape_time: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// True iff `(service, version, digest)` is already persisted.
    async fn has_version(
        &self,
        service: &str,
        version: &Version,
        digest: &str,
    ) -> Result<bool, StoreError>;

    /// Store one fetched document. Recomputes the digest and no-ops when the
    /// same `(service, version, digest)` already exists.
    async fn notify_version(
        &self,
        service: &str,
        version: &Version,
        body: &[u8],
        scrape_time: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Currently-collated versions in canonical form, sorted.
    async fn versions(&self) -> Result<Vec<String>, StoreError>;

    /// Collated document at exactly `version` (canonical form).
    async fn version(&self, version: &str) -> Result<Vec<u8>, StoreError>;

    /// Run the collator over all revisions whose service is in `services`
    /// and publish the result.
    async fn collate_versions(&self, services: &[String]) -> Result<(), StoreError>;
}

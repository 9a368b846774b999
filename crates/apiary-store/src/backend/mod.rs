//! Object persistence backends.

mod disk;
mod memory;

#[cfg(feature = "s3")]
mod s3;

use anyhow::Result;
use async_trait::async_trait;
use time::OffsetDateTime;

pub use disk::DiskBackend;
pub use memory::MemoryBackend;

#[cfg(feature = "s3")]
pub use s3::{S3Backend, S3Options};

/// A listed object: its key and, when the backend knows it, the time the
/// object was last written. Hydration uses the timestamp as the revision's
/// scrape time.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub key: String,
    pub modified: Option<OffsetDateTime>,
}

/// Durable key/value persistence under `/`-separated keys. Individual puts
/// are atomic; nothing more is required of a backend.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>>;
}

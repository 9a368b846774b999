//! No-op persistence: the in-memory revision index is the only copy.

use anyhow::Result;
use async_trait::async_trait;

use super::{ObjectBackend, ObjectEntry};

#[derive(Debug, Default)]
pub struct MemoryBackend;

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn put(&self, _key: &str, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn list(&self, _prefix: &str) -> Result<Vec<ObjectEntry>> {
        Ok(Vec::new())
    }
}

//! The storage implementation: an in-memory revision index guarded by a
//! readers-writer lock, backed by a durable object store.
//!
//! Revisions are immutable once written. Collation builds a fresh collated
//! map and swaps it in under the write lock, so readers see either the
//! previous collated set or the next one.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;
use tracing::{debug, info};

use apiary_core::canonical::to_canonical_bytes;
use apiary_core::digest::digest;
use apiary_core::{Collator, ContentRevision, ServiceRevisions, Version};

use crate::backend::{ObjectBackend, ObjectEntry};
use crate::layout::{
    collated_key, parse_collated_key, parse_revision_key, revision_key, sanitize_host,
    COLLATED_PREFIX, REVISIONS_PREFIX,
};
use crate::{backend::MemoryBackend, Storage, StoreError};

#[derive(Default)]
struct Index {
    /// Keyed by sanitized service host; BTreeMap order doubles as the
    /// deterministic merge order.
    revisions: BTreeMap<String, ServiceRevisions>,
    advertised: BTreeMap<String, Vec<String>>,
    collated: BTreeMap<Version, Vec<u8>>,
}

pub struct Store {
    index: RwLock<Index>,
    objects: Box<dyn ObjectBackend>,
    collator: Collator,
}

impl Store {
    /// Open a store over a backend, hydrating the index from whatever the
    /// backend already holds. A version that fails to parse out of an object
    /// key indicates a corrupt store and is fatal.
    pub async fn open(
        objects: Box<dyn ObjectBackend>,
        collator: Collator,
    ) -> Result<Self, StoreError> {
        let mut index = Index::default();

        for ObjectEntry { key, modified } in objects.list(REVISIONS_PREFIX).await? {
            let parsed = parse_revision_key(&key)?;
            let Some(blob) = objects.get(&key).await? else {
                continue;
            };
            let timestamp = modified.unwrap_or(OffsetDateTime::UNIX_EPOCH);
            let revision =
                ContentRevision::new(parsed.host.clone(), parsed.version, blob, timestamp);
            index.revisions.entry(parsed.host).or_default().add(revision);
        }

        for ObjectEntry { key, .. } in objects.list(COLLATED_PREFIX).await? {
            let version = parse_collated_key(&key)?;
            if let Some(blob) = objects.get(&key).await? {
                index.collated.insert(version, blob);
            }
        }

        if !index.revisions.is_empty() || !index.collated.is_empty() {
            info!(
                services = index.revisions.len(),
                collated = index.collated.len(),
                "hydrated store from backend"
            );
        }

        Ok(Self {
            index: RwLock::new(index),
            objects,
            collator,
        })
    }

    /// An ephemeral store with no durable backend.
    pub fn memory(collator: Collator) -> Self {
        Self {
            index: RwLock::new(Index::default()),
            objects: Box::new(MemoryBackend),
            collator,
        }
    }
}

#[async_trait]
impl Storage for Store {
    async fn notify_versions(
        &self,
        service: &str,
        versions: &[String],
        _scrape_time: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let host = sanitize_host(service);
        let mut index = self.index.write();
        match index.advertised.get(&host) {
            Some(known) if known == versions => {}
            _ => {
                index.advertised.insert(host, versions.to_vec());
            }
        }
        Ok(())
    }

    async fn has_version(
        &self,
        service: &str,
        version: &Version,
        digest: &str,
    ) -> Result<bool, StoreError> {
        let index = self.index.read();
        Ok(index
            .revisions
            .get(&sanitize_host(service))
            .is_some_and(|revs| revs.has(version, digest)))
    }

    async fn notify_version(
        &self,
        service: &str,
        version: &Version,
        body: &[u8],
        scrape_time: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let digest = digest(body);
        if self.has_version(service, version, &digest).await? {
            debug!(service, %version, "revision already stored");
            return Ok(());
        }

        self.objects
            .put(&revision_key(service, version, &digest), body)
            .await?;

        let host = sanitize_host(service);
        let revision = ContentRevision::new(host.clone(), *version, body.to_vec(), scrape_time);
        self.index.write().revisions.entry(host).or_default().add(revision);
        Ok(())
    }

    async fn versions(&self) -> Result<Vec<String>, StoreError> {
        let index = self.index.read();
        Ok(index.collated.keys().map(|v| v.to_string()).collect())
    }

    async fn version(&self, version: &str) -> Result<Vec<u8>, StoreError> {
        let parsed = Version::parse(version)?;
        let index = self.index.read();
        index
            .collated
            .get(&parsed.canonical())
            .cloned()
            .ok_or(StoreError::NoMatchingVersion)
    }

    async fn collate_versions(&self, services: &[String]) -> Result<(), StoreError> {
        let allowed: HashSet<String> = services.iter().map(|s| sanitize_host(s)).collect();
        let snapshot: BTreeMap<String, ServiceRevisions> = {
            let index = self.index.read();
            index
                .revisions
                .iter()
                .filter(|(host, _)| allowed.contains(*host))
                .map(|(host, revs)| (host.clone(), revs.clone()))
                .collect()
        };

        let (_, documents) = self.collator.collate(&snapshot)?;

        let mut collated = BTreeMap::new();
        for (version, doc) in documents {
            let bytes = to_canonical_bytes(&doc).map_err(apiary_core::CollateError::Serialize)?;
            self.objects.put(&collated_key(&version), &bytes).await?;
            collated.insert(version.canonical(), bytes);
        }

        let published = collated.len();
        self.index.write().collated = collated;
        info!(versions = published, "published collated versions");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DiskBackend;
    use serde_json::json;
    use tempfile::TempDir;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2021-12-03 20:49:51 UTC);

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[tokio::test]
    async fn has_version_after_notify() {
        let store = Store::memory(Collator::default());
        let b = body(json!({"paths": {"/crickets": {}}}));
        let d = digest(&b);
        assert!(!store.has_version("http://petfood", &v("2021-09-01"), &d).await.unwrap());
        store.notify_version("http://petfood", &v("2021-09-01"), &b, T0).await.unwrap();
        assert!(store.has_version("http://petfood", &v("2021-09-01"), &d).await.unwrap());
    }

    #[tokio::test]
    async fn notify_version_is_idempotent_on_disk() {
        let td = TempDir::new().unwrap();
        let backend = DiskBackend::open(td.path()).unwrap();
        let store = Store::open(Box::new(backend), Collator::default()).await.unwrap();

        let b = body(json!({"paths": {}}));
        store.notify_version("http://s", &v("2021-09-16"), &b, T0).await.unwrap();
        store.notify_version("http://s", &v("2021-09-16"), &b, T0).await.unwrap();

        let dir = td.path().join("service-versions/s/2021-09-16");
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);

        // Different bytes make a second revision.
        store
            .notify_version("http://s", &v("2021-09-16"), &body(json!({"paths": {"/x": {}}})), T0)
            .await
            .unwrap();
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn collate_publishes_versions() {
        let store = Store::memory(Collator::default());
        store
            .notify_version(
                "http://petfood",
                &v("2021-09-01"),
                &body(json!({"paths": {"/crickets": {}}})),
                T0,
            )
            .await
            .unwrap();
        store
            .notify_version(
                "http://animals",
                &v("2021-10-01"),
                &body(json!({"paths": {"/geckos": {}}})),
                T0,
            )
            .await
            .unwrap();

        store
            .collate_versions(&["http://petfood".to_string(), "http://animals".to_string()])
            .await
            .unwrap();

        assert_eq!(store.versions().await.unwrap(), vec!["2021-09-01", "2021-10-01"]);

        let doc: serde_json::Value =
            serde_json::from_slice(&store.version("2021-10-01").await.unwrap()).unwrap();
        assert_eq!(doc["paths"].as_object().unwrap().len(), 2);

        assert!(matches!(
            store.version("2021-11-01").await,
            Err(StoreError::NoMatchingVersion)
        ));
        assert!(matches!(
            store.version("garbage").await,
            Err(StoreError::Version(_))
        ));
    }

    #[tokio::test]
    async fn collate_filter_excludes_other_services() {
        let store = Store::memory(Collator::default());
        store
            .notify_version("http://a", &v("2021-09-01"), &body(json!({"paths": {"/a": {}}})), T0)
            .await
            .unwrap();
        store
            .notify_version("http://b", &v("2021-09-01"), &body(json!({"paths": {"/b": {}}})), T0)
            .await
            .unwrap();

        store.collate_versions(&["http://a".to_string()]).await.unwrap();

        let doc: serde_json::Value =
            serde_json::from_slice(&store.version("2021-09-01").await.unwrap()).unwrap();
        let paths = doc["paths"].as_object().unwrap();
        assert!(paths.contains_key("/a"));
        assert!(!paths.contains_key("/b"));
    }

    #[tokio::test]
    async fn failed_collation_retains_previous_output() {
        let store = Store::memory(Collator::default());
        let svc = vec!["http://s".to_string()];
        store
            .notify_version("http://s", &v("2021-09-01"), &body(json!({"paths": {}})), T0)
            .await
            .unwrap();
        store.collate_versions(&svc).await.unwrap();
        assert_eq!(store.versions().await.unwrap(), vec!["2021-09-01"]);

        // A blob that is not a JSON object poisons the next run.
        store
            .notify_version("http://s", &v("2021-10-01"), b"[1,2]", T0)
            .await
            .unwrap();
        assert!(store.collate_versions(&svc).await.is_err());
        assert_eq!(store.versions().await.unwrap(), vec!["2021-09-01"]);
    }

    #[tokio::test]
    async fn reopen_hydrates_from_disk() {
        let td = TempDir::new().unwrap();
        let svc = vec!["http://petfood".to_string()];
        let b = body(json!({"paths": {"/crickets": {}}}));
        let d = digest(&b);

        {
            let backend = DiskBackend::open(td.path()).unwrap();
            let store = Store::open(Box::new(backend), Collator::default()).await.unwrap();
            store.notify_version("http://petfood", &v("2021-09-01"), &b, T0).await.unwrap();
            store.collate_versions(&svc).await.unwrap();
        }

        let backend = DiskBackend::open(td.path()).unwrap();
        let store = Store::open(Box::new(backend), Collator::default()).await.unwrap();
        assert!(store.has_version("http://petfood", &v("2021-09-01"), &d).await.unwrap());
        assert_eq!(store.versions().await.unwrap(), vec!["2021-09-01"]);
        let doc: serde_json::Value =
            serde_json::from_slice(&store.version("2021-09-01").await.unwrap()).unwrap();
        assert!(doc["paths"].as_object().unwrap().contains_key("/crickets"));
    }
}

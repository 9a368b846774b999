//! Immutable content revisions and the per-service revision index.

use std::collections::BTreeMap;

use time::OffsetDateTime;

use crate::digest;
use crate::errors::VersionError;
use crate::version::{Version, VersionSet};

/// An immutable snapshot of one service's OpenAPI document at one version.
///
/// The digest is computed from the blob at construction and identifies the
/// revision together with `(service, version)`. Multiple revisions may
/// coexist at the same version when the document changed between scrapes.
#[derive(Debug, Clone)]
pub struct ContentRevision {
    pub service: String,
    pub version: Version,
    pub digest: String,
    pub timestamp: OffsetDateTime,
    pub blob: Vec<u8>,
}

impl ContentRevision {
    pub fn new(
        service: impl Into<String>,
        version: Version,
        blob: Vec<u8>,
        timestamp: OffsetDateTime,
    ) -> Self {
        let digest = digest::digest(&blob);
        Self {
            service: service.into(),
            version,
            digest,
            timestamp,
            blob,
        }
    }
}

impl PartialEq for ContentRevision {
    fn eq(&self, other: &Self) -> bool {
        self.service == other.service
            && self.version == other.version
            && self.digest == other.digest
    }
}

impl Eq for ContentRevision {}

/// Revision index for one service: versions in sorted order, each with the
/// revisions seen at that version.
#[derive(Debug, Clone, Default)]
pub struct ServiceRevisions {
    versions: VersionSet,
    revisions: BTreeMap<Version, Vec<ContentRevision>>,
}

impl ServiceRevisions {
    /// Insert a revision. Returns false when a revision with the same digest
    /// already exists at that version.
    pub fn add(&mut self, revision: ContentRevision) -> bool {
        let at_version = self.revisions.entry(revision.version).or_default();
        if at_version.iter().any(|r| r.digest == revision.digest) {
            return false;
        }
        self.versions.insert(revision.version);
        at_version.push(revision);
        true
    }

    pub fn versions(&self) -> &VersionSet {
        &self.versions
    }

    pub fn has(&self, version: &Version, digest: &str) -> bool {
        self.revisions
            .get(version)
            .is_some_and(|revs| revs.iter().any(|r| r.digest == digest))
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Latest revision serving a query version: exact version match when
    /// present, otherwise the resolved version; among revisions at that
    /// version the one with the newest timestamp wins.
    pub fn resolve_latest_revision(
        &self,
        query: Version,
    ) -> Result<&ContentRevision, VersionError> {
        let resolved = if self.revisions.contains_key(&query) {
            query
        } else {
            self.versions.resolve(query)?
        };
        self.revisions
            .get(&resolved)
            .and_then(|revs| revs.iter().max_by_key(|r| r.timestamp))
            .ok_or(VersionError::NoMatchingVersion)
    }
}

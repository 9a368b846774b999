//! Cross-service, cross-version collation of OpenAPI revisions.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::canonical::canonicalize;
use crate::errors::CollateError;
use crate::exclude::ExcludePatterns;
use crate::merge::merge;
use crate::revision::ServiceRevisions;
use crate::version::{Version, VersionSet};

/// Merges per-service revisions at each advertised version into a single
/// document, applies overlays and exclusion patterns, and canonicalizes the
/// result.
#[derive(Debug, Default)]
pub struct Collator {
    overlays: Vec<Value>,
    exclude: ExcludePatterns,
}

impl Collator {
    pub fn new(overlays: Vec<Value>, exclude: ExcludePatterns) -> Self {
        Self { overlays, exclude }
    }

    /// Collate a cross-service view of revisions.
    ///
    /// Returns the union of advertised versions and a document per version
    /// for which at least one service resolved a revision. Services are
    /// iterated in map order (alphabetical by key), which makes the output
    /// deterministic; later services override earlier ones on key collisions.
    pub fn collate(
        &self,
        services: &BTreeMap<String, ServiceRevisions>,
    ) -> Result<(VersionSet, BTreeMap<Version, Value>), CollateError> {
        for overlay in &self.overlays {
            if !overlay.is_object() {
                return Err(CollateError::MalformedOverlay);
            }
        }

        let union: VersionSet = services
            .values()
            .flat_map(|revs| revs.versions().iter().copied())
            .collect();

        let mut documents = BTreeMap::new();
        for &version in &union {
            let mut doc: Option<Value> = None;
            for (service, revisions) in services {
                let Ok(revision) = revisions.resolve_latest_revision(version) else {
                    continue;
                };
                let src: Value = serde_json::from_slice(&revision.blob).map_err(|_| {
                    CollateError::MalformedRevision {
                        service: service.clone(),
                        version: version.to_string(),
                    }
                })?;
                if !src.is_object() {
                    return Err(CollateError::MalformedRevision {
                        service: service.clone(),
                        version: version.to_string(),
                    });
                }
                match &mut doc {
                    None => doc = Some(src),
                    Some(dst) => merge(dst, &src, true),
                }
            }
            let Some(mut doc) = doc else { continue };

            for overlay in &self.overlays {
                merge(&mut doc, overlay, true);
            }
            self.apply_excludes(&mut doc);
            documents.insert(version, canonicalize(&doc));
        }

        Ok((union, documents))
    }

    fn apply_excludes(&self, doc: &mut Value) {
        if self.exclude.is_empty() {
            return;
        }
        if let Some(Value::Object(paths)) = doc.get_mut("paths") {
            paths.retain(|path, _| !self.exclude.matches(path));
        }
    }
}

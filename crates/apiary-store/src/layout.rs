//! Object key layout for the two storage namespaces.
//!
//! - `service-versions/<sanitized-host>/<version>/<digest>.json`
//! - `collated-versions/<version>/spec.json`
//!
//! Versions in keys use canonical textual form (post-pivot suffix stripped).
//! Digests carry base64 characters that some backends disallow in names, so
//! object names use a stable escaped form (`/` -> `_`, `+` -> `-`). Keys are
//! always constructed from a digest, never parsed back into one; hydration
//! recomputes digests from blob bytes.

use apiary_core::Version;

use crate::StoreError;

pub const REVISIONS_PREFIX: &str = "service-versions";
pub const COLLATED_PREFIX: &str = "collated-versions";

/// Strip a service base URL down to `host[:port]`. Falls back to the raw
/// string when nothing host-like can be extracted.
pub fn sanitize_host(service: &str) -> String {
    let rest = service
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(service);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host = authority
        .rsplit_once('@')
        .map(|(_, host)| host)
        .unwrap_or(authority);
    if host.is_empty() {
        service.to_string()
    } else {
        host.to_string()
    }
}

fn escape_digest(digest: &str) -> String {
    digest.replace('/', "_").replace('+', "-")
}

pub fn revision_key(service: &str, version: &Version, digest: &str) -> String {
    format!(
        "{REVISIONS_PREFIX}/{}/{}/{}.json",
        sanitize_host(service),
        version.canonical(),
        escape_digest(digest)
    )
}

pub fn collated_key(version: &Version) -> String {
    format!("{COLLATED_PREFIX}/{}/spec.json", version.canonical())
}

/// Parsed fields of a revision object key. The digest component is not
/// recovered; see the module docs.
#[derive(Debug, PartialEq, Eq)]
pub struct RevisionKey {
    pub host: String,
    pub version: Version,
}

pub fn parse_revision_key(key: &str) -> Result<RevisionKey, StoreError> {
    let mut parts = key.split('/');
    let (prefix, host, version, file) = (parts.next(), parts.next(), parts.next(), parts.next());
    match (prefix, host, version, file, parts.next()) {
        (Some(REVISIONS_PREFIX), Some(host), Some(version), Some(file), None)
            if file.ends_with(".json") =>
        {
            Ok(RevisionKey {
                host: host.to_string(),
                version: Version::parse(version)?,
            })
        }
        _ => Err(StoreError::Backend(anyhow::anyhow!(
            "unrecognized revision key {key:?}"
        ))),
    }
}

pub fn parse_collated_key(key: &str) -> Result<Version, StoreError> {
    let mut parts = key.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(COLLATED_PREFIX), Some(version), Some("spec.json"), None) => {
            Ok(Version::parse(version)?)
        }
        _ => Err(StoreError::Backend(anyhow::anyhow!(
            "unrecognized collated key {key:?}"
        ))),
    }
}

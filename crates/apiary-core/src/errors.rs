//! Error types for apiary-core.

/// Errors arising from version parsing and resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// The string is not a `YYYY-MM-DD` date or `YYYY-MM-DD~<stability>` pair.
    #[error("invalid version {0:?}")]
    Parse(String),

    /// Resolution found no candidate at least as stable and no newer than
    /// the query.
    #[error("no matching version")]
    NoMatchingVersion,
}

/// Errors arising from a collation run.
#[derive(Debug, thiserror::Error)]
pub enum CollateError {
    #[error("invalid exclude pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("revision for {service} at {version} is not a JSON object")]
    MalformedRevision { service: String, version: String },

    #[error("overlay is not a JSON object")]
    MalformedOverlay,

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

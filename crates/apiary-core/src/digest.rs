//! Content digests and HTTP `Digest` header parsing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest as _, Sha256};

/// Prefix of every digest string produced or accepted here.
pub const PREFIX: &str = "sha256:";

/// Digest of a byte blob: `"sha256:" + base64(sha256(bytes))`.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{PREFIX}{}", STANDARD.encode(hasher.finalize()))
}

/// Extract a usable digest from an RFC 3230 `Digest` response header.
///
/// The header is a comma-separated list of `algorithm=value` directives. The
/// first `sha-256` or `id-sha-256` value is returned in our `sha256:` form;
/// other algorithms are ignored.
pub fn parse_digest_header(header: &str) -> Option<String> {
    for directive in header.split(',') {
        let Some((alg, value)) = directive.split_once('=') else {
            continue;
        };
        let alg = alg.trim();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if alg.eq_ignore_ascii_case("sha-256") || alg.eq_ignore_ascii_case("id-sha-256") {
            return Some(format!("{PREFIX}{value}"));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest(b"hello"), digest(b"hello"));
        assert_ne!(digest(b"hello"), digest(b"hellox"));
    }

    #[test]
    fn digest_known_vector() {
        // sha256 of the empty string.
        assert_eq!(
            digest(b""),
            "sha256:47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn header_parses_sha256() {
        assert_eq!(
            parse_digest_header("sha-256=abc123="),
            Some("sha256:abc123=".to_string())
        );
        assert_eq!(
            parse_digest_header(" id-sha-256 = xyz== , sha-512=nope"),
            Some("sha256:xyz==".to_string())
        );
    }

    #[test]
    fn header_takes_first_usable_directive() {
        assert_eq!(
            parse_digest_header("sha-512=a, sha-256=first, id-sha-256=second"),
            Some("sha256:first".to_string())
        );
    }

    #[test]
    fn header_without_sha256_yields_none() {
        assert_eq!(parse_digest_header("sha-512=abc"), None);
        assert_eq!(parse_digest_header("garbage"), None);
        assert_eq!(parse_digest_header(""), None);
        assert_eq!(parse_digest_header("sha-256="), None);
    }
}

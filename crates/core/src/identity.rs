//! Work item identity: stable record keys and remote group labels.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Label used when nothing meaningful can be derived from a source reference.
pub const FALLBACK_GROUP: &str = "Unsorted";

/// Deterministic digest of a source reference, used as the record key.
///
/// Lowercase hex SHA-256 of the trimmed reference, so keys survive restarts
/// and are identical across processes and platforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityHash(String);

impl IdentityHash {
    pub fn of(identity: &str) -> Self {
        let digest = Sha256::digest(identity.trim().as_bytes());
        Self(format!("{:x}", digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits; names the per-item working directory.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<IdentityHash> for String {
    fn from(hash: IdentityHash) -> Self {
        hash.0
    }
}

/// Human-readable namespace for a source reference.
///
/// Uses the first path segment (`/the-night-agent/ep-1` -> `The Night Agent`),
/// falling back to the first host label (`downloads.example.com` -> `Downloads`)
/// and finally to [`FALLBACK_GROUP`]. The result is safe to use as a single
/// path component both locally and on the remote.
pub fn group_label(identity: &str) -> String {
    let Ok(url) = Url::parse(identity.trim()) else {
        return FALLBACK_GROUP.to_string();
    };

    let from_path = url
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let decoded = urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string());
            title_case(&decoded.replace(['-', '_'], " "))
        })
        .and_then(sanitize_component);

    if let Some(label) = from_path {
        return label;
    }

    url.host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty())
        .map(title_case)
        .and_then(sanitize_component)
        .unwrap_or_else(|| FALLBACK_GROUP.to_string())
}

fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn sanitize_component(label: String) -> Option<String> {
    let cleaned: String = label
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0') && !c.is_control())
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_trimmed() {
        let a = IdentityHash::of("https://example.com/show/ep-1");
        let b = IdentityHash::of("  https://example.com/show/ep-1\n");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        // Known SHA-256 of "abc"
        assert_eq!(
            IdentityHash::of("abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_short_hash_is_a_prefix() {
        let hash = IdentityHash::of("abc");
        assert_eq!(hash.short(), "ba7816bf8f01");
        assert!(hash.as_str().starts_with(hash.short()));
    }

    #[test]
    fn test_hash_differs_per_identity() {
        assert_ne!(
            IdentityHash::of("https://example.com/a"),
            IdentityHash::of("https://example.com/b")
        );
    }

    #[test]
    fn test_group_from_path_segment() {
        assert_eq!(
            group_label("https://example.com/the-night-agent/episode-3"),
            "The Night Agent"
        );
        assert_eq!(group_label("https://example.com/BIG_show/x.mkv"), "Big Show");
    }

    #[test]
    fn test_group_from_percent_encoded_segment() {
        assert_eq!(group_label("https://example.com/my%20show/x"), "My Show");
    }

    #[test]
    fn test_group_falls_back_to_host() {
        assert_eq!(group_label("https://downloads.example.com/"), "Downloads");
        assert_eq!(group_label("https://downloads.example.com"), "Downloads");
    }

    #[test]
    fn test_group_fallback_for_non_urls() {
        assert_eq!(group_label("not a url"), FALLBACK_GROUP);
        assert_eq!(group_label(""), FALLBACK_GROUP);
    }

    #[test]
    fn test_group_never_traverses() {
        let label = group_label("https://host.example/..%2F..%2Fetc");
        assert_eq!(label, "....etc");
        assert!(!label.contains('/'));
    }
}

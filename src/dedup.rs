//! Content-hash deduplication.
//!
//! The canonical content fingerprint used everywhere (index, chunk
//! records, dedup set) is the SHA-256 hex digest of the normalized text:
//! lowercased, whitespace runs collapsed to a single space, trimmed.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::models::CanonIndex;

/// Normalize text for hashing: lowercase, collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 hex digest of the normalized text.
pub fn compute_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Tracks seen content hashes for deduplication.
///
/// Dedup operates purely on the content fingerprint. A single URL can
/// legitimately produce multiple chunks (a long document split into
/// parts), so URLs are intentionally not part of the seen-set.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Deduplicator::default()
    }

    /// Pre-load the seen-set from an existing index, stripping the
    /// `sha256:` prefix its entries carry.
    pub fn seeded(existing_index: &CanonIndex) -> Self {
        let seen = existing_index
            .entries
            .iter()
            .map(|entry| {
                entry
                    .content_hash
                    .strip_prefix("sha256:")
                    .unwrap_or(&entry.content_hash)
                    .to_string()
            })
            .collect();
        Deduplicator { seen }
    }

    pub fn is_duplicate(&self, content_hash: &str, _source_url: Option<&str>) -> bool {
        self.seen.contains(content_hash)
    }

    pub fn add(&mut self, content_hash: &str, _source_url: Option<&str>) {
        self.seen.insert(content_hash.to_string());
    }
}

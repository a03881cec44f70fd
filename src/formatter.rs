//! Pipeline composition: clean → split → dedup → chunk records.
//!
//! [`format_chunks`] runs one [`ExtractedText`] through the cleaner,
//! splitter, and deduplicator, and hands each admitted section to a
//! pluggable [`ChunkSink`]. Duplicates are skipped silently — they are
//! expected, not errors.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cleaner::clean_text;
use crate::dedup::{compute_hash, Deduplicator};
use crate::models::{ExtractedText, SourceType};
use crate::splitter::{split_text, word_count};

/// Default per-section word budget.
pub const DEFAULT_MAX_WORDS: usize = 4000;

/// One admitted, bounded-size unit of text, ready for a sink. Serializes
/// in the remote chunk store's camelCase wire format.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub text: String,
    pub source_uri: String,
    pub source_title: String,
    pub source_type: SourceType,
    /// `sha256:<hex>` fingerprint of the normalized section text.
    pub content_hash: String,
    /// Best-effort offsets over the cleaned source: cumulative character
    /// lengths of prior sections. May drift when the splitter's joins
    /// differ from the source separators.
    pub start_pos: usize,
    pub end_pos: usize,
    pub source_length: usize,
    pub word_count: usize,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// 1-based part number when the document split into multiple sections.
    /// Local metadata for file naming; not part of the wire format.
    #[serde(skip)]
    pub part: Option<usize>,
    /// Source-supplied date, carried for frontmatter and file naming.
    #[serde(skip)]
    pub date: Option<String>,
}

/// Destination for accepted chunks: local Markdown files plus index, or a
/// remote chunk store. Returns an identifier for the stored chunk (a
/// filename or a chunk id).
#[async_trait]
pub trait ChunkSink: Send {
    async fn store(&mut self, chunk: &ChunkRecord) -> Result<String>;
}

/// Clean, split, deduplicate, and hand admitted sections to `sink`.
///
/// Returns the identifiers of stored chunks in document order. A body
/// that is empty after cleaning yields an empty list, not an error.
pub async fn format_chunks(
    extracted: &ExtractedText,
    source_type: SourceType,
    dedup: &mut Deduplicator,
    sink: &mut dyn ChunkSink,
    max_words: usize,
) -> Result<Vec<String>> {
    let cleaned = clean_text(&extracted.body);
    if cleaned.is_empty() {
        return Ok(vec![]);
    }

    let sections = split_text(&cleaned, max_words);
    let multipart = sections.len() > 1;
    let source_length = cleaned.chars().count();

    let mut stored = Vec::new();
    let mut start_pos = 0;

    for (i, section) in sections.iter().enumerate() {
        let section_len = section.chars().count();
        let content_hash = compute_hash(section);
        if dedup.is_duplicate(&content_hash, Some(&extracted.source_url)) {
            start_pos += section_len;
            continue;
        }

        let title = if multipart {
            format!("{} (Part {})", extracted.title, i + 1)
        } else {
            extracted.title.clone()
        };

        let now = Utc::now();
        let record = ChunkRecord {
            id: format!("chunk_{}", Uuid::new_v4().simple()),
            kind: "canon".to_string(),
            title,
            text: section.clone(),
            source_uri: extracted.source_url.clone(),
            source_title: extracted.title.clone(),
            source_type,
            content_hash: format!("sha256:{}", content_hash),
            start_pos,
            end_pos: start_pos + section_len,
            source_length,
            word_count: word_count(section),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            part: multipart.then_some(i + 1),
            date: extracted.date.clone(),
        };

        dedup.add(&content_hash, Some(&extracted.source_url));
        stored.push(sink.store(&record).await?);
        start_pos += section_len;
    }

    Ok(stored)
}

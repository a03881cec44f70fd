//! Chunk sinks: local Markdown files with a canon index, or a remote
//! chunk store.
//!
//! [`FileSink`] writes each admitted chunk as a Markdown file with YAML
//! frontmatter named `{year-or-0000}-{slug}[-part{N}].md` and appends an
//! [`IndexEntry`] to the in-progress index. [`RemoteSink`] posts the JSON
//! chunk record to the memory API, applying field truncation limits
//! before transmission.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;

use crate::canon::{next_entry_id, save_index, INDEX_FILENAME};
use crate::formatter::{ChunkRecord, ChunkSink};
use crate::models::{CanonIndex, IndexEntry};

/// Maximum slug length in the generated filename.
const SLUG_MAX: usize = 60;

/// Remote field limits, in characters. Text over the limit is truncated
/// with a marker suffix; every truncated field gets a companion
/// `<field>Truncated` flag.
const ID_MAX: usize = 256;
const TITLE_MAX: usize = 500;
const SOURCE_URI_MAX: usize = 2000;
const SOURCE_TITLE_MAX: usize = 500;
const TEXT_MAX: usize = 200_000;
const TRUNCATION_SUFFIX: &str = "\n\n[truncated]";

// ---------------------------------------------------------------------------
// File sink
// ---------------------------------------------------------------------------

/// Writes chunks as Markdown files and grows a [`CanonIndex`].
///
/// The sink owns the in-progress index for the duration of a run;
/// call [`FileSink::finish`] to persist it and get the entry count.
pub struct FileSink {
    dir: PathBuf,
    index: CanonIndex,
}

impl FileSink {
    /// Open a sink over `dir`, loading the index there if one exists.
    pub fn open(dir: impl Into<PathBuf>, agent_id: &str) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output dir: {}", dir.display()))?;
        let index = crate::canon::load_or_create(&dir.join(INDEX_FILENAME), agent_id)?;
        Ok(FileSink { dir, index })
    }

    pub fn entry_count(&self) -> usize {
        self.index.entries.len()
    }

    /// Persist the index (bumping `updated`) and return the total entry
    /// count.
    pub fn finish(&mut self) -> Result<usize> {
        save_index(&self.dir.join(INDEX_FILENAME), &mut self.index)?;
        Ok(self.index.entries.len())
    }

    /// Filename for a chunk, suffixed with a counter when a different
    /// chunk already wrote the same name. Duplicates of the same content
    /// never get here; only distinct documents sharing a title and year
    /// collide.
    fn filename_for(&self, chunk: &ChunkRecord) -> String {
        let year = year_of(chunk.date.as_deref());
        let slug = slugify(&chunk.source_title, SLUG_MAX);
        let stem = match chunk.part {
            Some(n) => format!("{}-{}-part{}", year, slug, n),
            None => format!("{}-{}", year, slug),
        };
        let mut filename = format!("{}.md", stem);
        let mut n = 2;
        while self.dir.join(&filename).exists() {
            filename = format!("{}-{}.md", stem, n);
            n += 1;
        }
        filename
    }
}

#[async_trait]
impl ChunkSink for FileSink {
    async fn store(&mut self, chunk: &ChunkRecord) -> Result<String> {
        let filename = self.filename_for(chunk);
        let path = self.dir.join(&filename);

        let mut frontmatter = String::new();
        frontmatter.push_str("---\n");
        frontmatter.push_str(&format!("title: \"{}\"\n", yaml_escape(&chunk.title)));
        frontmatter.push_str(&format!("source_url: \"{}\"\n", yaml_escape(&chunk.source_uri)));
        frontmatter.push_str(&format!("source_type: \"{}\"\n", chunk.source_type));
        if let Some(date) = &chunk.date {
            frontmatter.push_str(&format!("date: \"{}\"\n", yaml_escape(date)));
        }
        frontmatter.push_str("---\n\n");

        let contents = format!("{}{}\n", frontmatter, chunk.text);
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("failed to write chunk file: {}", path.display()))?;

        self.index.entries.push(IndexEntry {
            id: next_entry_id(&self.index),
            filename: filename.clone(),
            title: chunk.title.clone(),
            source_url: chunk.source_uri.clone(),
            source_type: chunk.source_type,
            date: chunk.date.clone(),
            content_hash: chunk.content_hash.clone(),
            word_count: chunk.word_count,
            ingested_at: Utc::now(),
        });

        Ok(filename)
    }
}

/// Four-digit year from a source date, or `"0000"` when absent or
/// unparseable.
fn year_of(date: Option<&str>) -> String {
    if let Some(date) = date {
        let year: String = date.chars().take(4).collect();
        if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
            return year;
        }
    }
    "0000".to_string()
}

/// Lowercase, hyphen-separated slug of at most `max` characters.
fn slugify(title: &str, max: usize) -> String {
    let mut slug = String::new();
    let mut prev_hyphen = true;
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            prev_hyphen = false;
        } else if !prev_hyphen {
            slug.push('-');
            prev_hyphen = true;
        }
        if slug.chars().count() >= max {
            break;
        }
    }
    let slug: String = slug.chars().take(max).collect();
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

fn yaml_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ---------------------------------------------------------------------------
// Remote sink
// ---------------------------------------------------------------------------

/// Posts chunk records to the memory API of a remote store.
pub struct RemoteSink {
    client: reqwest::Client,
    api_base_url: String,
    worker_secret: String,
    agent_id: String,
}

impl RemoteSink {
    pub fn new(
        api_base_url: impl Into<String>,
        worker_secret: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        RemoteSink {
            client: reqwest::Client::new(),
            api_base_url: api_base_url.into(),
            worker_secret: worker_secret.into(),
            agent_id: agent_id.into(),
        }
    }
}

#[async_trait]
impl ChunkSink for RemoteSink {
    async fn store(&mut self, chunk: &ChunkRecord) -> Result<String> {
        let url = format!("{}/api/agents/{}/memory", self.api_base_url, self.agent_id);
        let body = truncate_for_transmission(serde_json::to_value(chunk)?);

        let response = self
            .client
            .post(&url)
            .header("X-Worker-Secret", &self.worker_secret)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to POST chunk to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("chunk store rejected {} with {}: {}", chunk.id, status, detail);
        }

        Ok(chunk.id.clone())
    }
}

/// Apply the remote store's field limits to a serialized chunk record.
fn truncate_for_transmission(mut value: serde_json::Value) -> serde_json::Value {
    if let Some(obj) = value.as_object_mut() {
        truncate_field(obj, "id", ID_MAX, "");
        truncate_field(obj, "title", TITLE_MAX, "");
        truncate_field(obj, "sourceUri", SOURCE_URI_MAX, "");
        truncate_field(obj, "sourceTitle", SOURCE_TITLE_MAX, "");
        truncate_field(obj, "text", TEXT_MAX, TRUNCATION_SUFFIX);
    }
    value
}

fn truncate_field(
    obj: &mut serde_json::Map<String, serde_json::Value>,
    key: &str,
    max: usize,
    suffix: &str,
) {
    let Some(serde_json::Value::String(s)) = obj.get(key) else {
        return;
    };
    if s.chars().count() <= max {
        return;
    }
    let mut cut: String = s.chars().take(max).collect();
    cut.push_str(suffix);
    obj.insert(key.to_string(), serde_json::Value::String(cut));
    obj.insert(format!("{}Truncated", key), serde_json::Value::Bool(true));
}

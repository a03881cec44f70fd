//! Core data models used throughout Canonry.
//!
//! These types represent the sources, extracted texts, index entries, and
//! sessions that flow through the ingestion pipeline and its orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

fn short_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &hex[..12])
}

fn default_source_id() -> String {
    short_id("src")
}

/// The kind of source a session ingests. One adapter exists per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Web,
    Youtube,
    Rss,
    Epub,
    Text,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Web => "web",
            SourceType::Youtube => "youtube",
            SourceType::Rss => "rss",
            SourceType::Epub => "epub",
            SourceType::Text => "text",
        }
    }

    /// Parse a source type from its wire name.
    pub fn parse(s: &str) -> Option<SourceType> {
        match s {
            "web" => Some(SourceType::Web),
            "youtube" => Some(SourceType::Youtube),
            "rss" => Some(SourceType::Rss),
            "epub" => Some(SourceType::Epub),
            "text" => Some(SourceType::Text),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source to ingest. Immutable once created; identifies a single
/// adapter invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    #[serde(default = "default_source_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SourceType,
    pub url: String,
    #[serde(default)]
    pub label: String,
}

impl Source {
    pub fn new(kind: SourceType, url: impl Into<String>, label: impl Into<String>) -> Self {
        Source {
            id: default_source_id(),
            kind,
            url: url.into(),
            label: label.into(),
        }
    }

    /// Label when present, otherwise the URL. Used in log lines.
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.url
        } else {
            &self.label
        }
    }
}

/// Adapter output: one logical document or page of extracted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedText {
    pub title: String,
    pub body: String,
    pub source_url: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The result of one adapter invocation. Errors are per-source and
/// non-fatal; they are logged as warnings by the executor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default)]
    pub texts: Vec<ExtractedText>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// One accepted entry in the canon index. Append-only; never mutated or
/// removed after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub filename: String,
    pub title: String,
    pub source_url: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub date: Option<String>,
    /// `sha256:<hex>` fingerprint of the normalized chunk text. Unique
    /// within the index.
    pub content_hash: String,
    pub word_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// The durable ledger of accepted entries for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonIndex {
    pub agent_id: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub entries: Vec<IndexEntry>,
}

impl CanonIndex {
    pub fn new(agent_id: impl Into<String>) -> Self {
        let now = Utc::now();
        CanonIndex {
            agent_id: agent_id.into(),
            created: now,
            updated: now,
            entries: Vec::new(),
        }
    }
}

/// The finite stages of a session. `Done` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStage {
    Init,
    Sources,
    Plan,
    Executing,
    Done,
    Error,
}

impl SessionStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStage::Done | SessionStage::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStage::Init => "INIT",
            SessionStage::Sources => "SOURCES",
            SessionStage::Plan => "PLAN",
            SessionStage::Executing => "EXECUTING",
            SessionStage::Done => "DONE",
            SessionStage::Error => "ERROR",
        }
    }
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution progress counters, updated as the source loop advances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionProgress {
    pub total_sources: usize,
    pub completed_sources: usize,
    #[serde(default)]
    pub current_source: Option<String>,
    pub chunks_written: usize,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// One end-to-end ingestion run, from source confirmation through
/// execution. Persisted as a JSON file by the session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub canon_path: Option<PathBuf>,
    pub stage: SessionStage,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub plan: String,
    /// Index loaded once at creation from `canon_path`, used only to seed
    /// the deduplicator. Distinct from the session's own growing index.
    #[serde(default)]
    pub existing_index: Option<CanonIndex>,
    #[serde(default)]
    pub progress: SessionProgress,
    #[serde(default)]
    pub log: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(name: impl Into<String>, canon_path: Option<PathBuf>) -> Self {
        let now = Utc::now();
        Session {
            id: short_id("ses"),
            name: name.into(),
            canon_path,
            stage: SessionStage::Init,
            sources: Vec::new(),
            plan: String::new(),
            existing_index: None,
            progress: SessionProgress::default(),
            log: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

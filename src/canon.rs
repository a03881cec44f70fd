//! Canon index persistence.
//!
//! The index lives as a single `index.json` next to the written chunk
//! files. Entries are append-only; `updated` advances on every successful
//! save, and entry ids are issued as a monotonic `canon_NNNN` sequence.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;

use crate::models::CanonIndex;

pub const INDEX_FILENAME: &str = "index.json";

/// Load an index from `path` if it exists.
pub fn load_index(path: &Path) -> Result<Option<CanonIndex>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read index: {}", path.display()))?;
    let index: CanonIndex = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse index: {}", path.display()))?;
    Ok(Some(index))
}

/// Load the index at `path`, or create a fresh one for `agent_id`.
pub fn load_or_create(path: &Path, agent_id: &str) -> Result<CanonIndex> {
    Ok(load_index(path)?.unwrap_or_else(|| CanonIndex::new(agent_id)))
}

/// Persist the index, bumping its `updated` timestamp. Parent directories
/// are created as needed.
pub fn save_index(path: &Path, index: &mut CanonIndex) -> Result<()> {
    index.updated = Utc::now();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(index)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write index: {}", path.display()))?;
    Ok(())
}

/// Next entry id in the `canon_NNNN` sequence. Scans the max existing
/// suffix so ids stay monotonic across runs.
pub fn next_entry_id(index: &CanonIndex) -> String {
    let max = index
        .entries
        .iter()
        .filter_map(|e| e.id.strip_prefix("canon_"))
        .filter_map(|n| n.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("canon_{:04}", max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndexEntry, SourceType};
    use tempfile::TempDir;

    fn entry(id: &str, hash: &str) -> IndexEntry {
        IndexEntry {
            id: id.to_string(),
            filename: "0000-x.md".to_string(),
            title: "X".to_string(),
            source_url: "https://example.com".to_string(),
            source_type: SourceType::Web,
            date: None,
            content_hash: format!("sha256:{}", hash),
            word_count: 1,
            ingested_at: Utc::now(),
        }
    }

    #[test]
    fn missing_index_loads_as_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(INDEX_FILENAME);
        assert!(load_index(&path).unwrap().is_none());
        let created = load_or_create(&path, "agent-1").unwrap();
        assert_eq!(created.agent_id, "agent-1");
        assert!(created.entries.is_empty());
    }

    #[test]
    fn save_and_reload_preserves_entries_and_bumps_updated() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("canon").join(INDEX_FILENAME);

        let mut index = CanonIndex::new("agent-1");
        let before = index.updated;
        index.entries.push(entry("canon_0001", "aa"));
        save_index(&path, &mut index).unwrap();
        assert!(index.updated >= before);

        let reloaded = load_index(&path).unwrap().unwrap();
        assert_eq!(reloaded.agent_id, "agent-1");
        assert_eq!(reloaded.entries.len(), 1);
        assert_eq!(reloaded.entries[0].id, "canon_0001");
    }

    #[test]
    fn entry_ids_are_monotonic() {
        let mut index = CanonIndex::new("agent-1");
        assert_eq!(next_entry_id(&index), "canon_0001");
        index.entries.push(entry("canon_0001", "aa"));
        index.entries.push(entry("canon_0007", "bb"));
        assert_eq!(next_entry_id(&index), "canon_0008");
    }
}

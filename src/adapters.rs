//! Source adapters and their registry.
//!
//! Each [`SourceType`] maps to one [`SourceAdapter`] implementation. The
//! heavy extraction work (crawling, transcript fetching, document
//! conversion) belongs to external integrations that register their own
//! adapters; the built-in `text` adapter reads local UTF-8 files and
//! resolves the `digest:sha256:<hex>` indirection used for uploads.
//!
//! Adapters report recoverable problems in [`ToolResult::errors`] rather
//! than failing the call; the executor logs them as warnings and moves on.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::{ExtractedText, Source, SourceType, ToolResult};

/// Extraction capability over one source type.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn extract(&self, source: &Source) -> Result<ToolResult>;
}

/// Static type → adapter mapping, populated at startup.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<SourceType, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        AdapterRegistry::default()
    }

    /// Registry with the built-in adapters. `uploads_dir` is where the
    /// upload layer stores content-addressed files.
    pub fn with_builtins(uploads_dir: impl Into<PathBuf>) -> Self {
        let mut registry = AdapterRegistry::new();
        registry.register(
            SourceType::Text,
            Arc::new(TextFileAdapter::new(uploads_dir)),
        );
        registry
    }

    pub fn register(&mut self, kind: SourceType, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(kind, adapter);
    }

    pub fn get(&self, kind: SourceType) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&kind).cloned()
    }
}

/// Digest hex from a `digest:sha256:<hex>` source URL, if it is one.
pub fn parse_digest_url(url: &str) -> Option<&str> {
    url.strip_prefix("digest:sha256:")
}

/// Content-addressed path for an uploaded file.
pub fn digest_path(uploads_dir: &Path, hex: &str) -> PathBuf {
    uploads_dir.join("sha256").join(hex)
}

/// Reads a local UTF-8 file (or a content-addressed upload) as one
/// extracted text.
pub struct TextFileAdapter {
    uploads_dir: PathBuf,
}

impl TextFileAdapter {
    pub fn new(uploads_dir: impl Into<PathBuf>) -> Self {
        TextFileAdapter {
            uploads_dir: uploads_dir.into(),
        }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        match parse_digest_url(url) {
            Some(hex) => digest_path(&self.uploads_dir, hex),
            None => PathBuf::from(url),
        }
    }
}

#[async_trait]
impl SourceAdapter for TextFileAdapter {
    async fn extract(&self, source: &Source) -> Result<ToolResult> {
        let path = self.resolve(&source.url);
        let mut result = ToolResult::default();

        match tokio::fs::read_to_string(&path).await {
            Ok(body) => {
                let title = if source.label.is_empty() {
                    path.file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| source.url.clone())
                } else {
                    source.label.clone()
                };
                result.texts.push(ExtractedText {
                    title,
                    body,
                    source_url: source.url.clone(),
                    date: None,
                    metadata: Default::default(),
                });
            }
            Err(err) => {
                result
                    .errors
                    .push(format!("failed to read {}: {}", path.display(), err));
            }
        }

        Ok(result)
    }
}

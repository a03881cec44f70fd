//! Plan generation seam.
//!
//! The production planner is an LLM-backed client living outside this
//! crate; the executor never parses plan text, it only requires a
//! non-empty plan before execution. [`OutlinePlanner`] is the default:
//! a deterministic outline rendered from the session's source list.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Session;

#[async_trait]
pub trait Planner: Send + Sync {
    /// Produce a free-text ingestion plan for the session.
    async fn plan(&self, session: &Session) -> Result<String>;
}

/// Deterministic template planner used when no LLM client is wired in.
#[derive(Debug, Default)]
pub struct OutlinePlanner;

#[async_trait]
impl Planner for OutlinePlanner {
    async fn plan(&self, session: &Session) -> Result<String> {
        let mut out = format!("Ingestion plan for \"{}\"\n\n", session.name);
        out.push_str("Sources, in processing order:\n");
        for (i, source) in session.sources.iter().enumerate() {
            out.push_str(&format!(
                "  {}. [{}] {}\n",
                i + 1,
                source.kind,
                source.display_name()
            ));
        }
        out.push_str(
            "\nEach source is extracted, cleaned, split into sections of at \
             most 4000 words, deduplicated by content hash, and written to \
             the canon.\n",
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Source, SourceType};

    #[tokio::test]
    async fn outline_lists_sources_in_order() {
        let mut session = Session::new("corpus", None);
        session
            .sources
            .push(Source::new(SourceType::Web, "https://a.example", "Site A"));
        session
            .sources
            .push(Source::new(SourceType::Text, "/tmp/b.md", ""));

        let plan = OutlinePlanner.plan(&session).await.unwrap();
        assert!(plan.contains("1. [web] Site A"));
        assert!(plan.contains("2. [text] /tmp/b.md"));
        let a = plan.find("Site A").unwrap();
        let b = plan.find("/tmp/b.md").unwrap();
        assert!(a < b);
    }
}

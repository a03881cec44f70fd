//! Session execution: the state machine and source loop.
//!
//! Once a plan is confirmed the executor runs detached, driving every
//! source through its adapter and the formatting pipeline, appending log
//! lines both to the live stream and to the persisted session record.
//! Per-source failures are warnings; only an error escaping the loop
//! (index corruption, store failure) transitions the session to `Error`.
//!
//! The executor exclusively owns the in-progress canon index and the
//! deduplicator for the duration of a run. There is no cancellation: a
//! started run goes to completion or failure. Re-running a session is
//! non-destructive because admission is guarded by content-hash dedup.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::{AdapterRegistry, SourceAdapter};
use crate::dedup::Deduplicator;
use crate::formatter::{format_chunks, ChunkSink};
use crate::models::{Session, SessionStage, Source};
use crate::session::SessionStore;
use crate::sink::{FileSink, RemoteSink};
use crate::streams::{LogStream, StreamRegistry};

/// Where accepted chunks go for every session this executor runs.
#[derive(Debug, Clone)]
pub enum SinkMode {
    /// Markdown files plus `index.json` under `{output_dir}/{session_id}`.
    File,
    /// Records posted to a remote chunk store.
    Remote {
        api_base_url: String,
        worker_secret: String,
        agent_id: String,
    },
}

enum RunSink {
    File(FileSink),
    Remote(RemoteSink),
}

impl RunSink {
    fn as_chunk_sink(&mut self) -> &mut dyn ChunkSink {
        match self {
            RunSink::File(sink) => sink,
            RunSink::Remote(sink) => sink,
        }
    }

    fn stored_line(&self, id: &str) -> String {
        match self {
            RunSink::File(_) => format!("  [WROTE] {}", id),
            RunSink::Remote(_) => format!("  [CHUNK] {}", id),
        }
    }

    /// Persist whatever the sink accumulated. Returns the summary line
    /// for the log.
    fn finish(&mut self, written: usize) -> Result<String> {
        match self {
            RunSink::File(sink) => {
                let entries = sink.finish()?;
                Ok(format!(
                    "[DONE] {} files written, {} total entries",
                    written, entries
                ))
            }
            RunSink::Remote(_) => Ok(format!("[DONE] {} chunks written", written)),
        }
    }
}

/// Validate and apply the `Plan → Executing` transition. Rejected (with
/// no transition) when the plan is empty or the session already finished.
pub fn confirm_plan(store: &SessionStore, session: &mut Session) -> Result<()> {
    if session.plan.trim().is_empty() {
        bail!("no plan to confirm");
    }
    if session.stage.is_terminal() {
        bail!("session already finished: {}", session.stage);
    }
    session.stage = SessionStage::Executing;
    store.update(session)?;
    Ok(())
}

/// Per-session orchestrator. One instance serves the whole process; each
/// [`execute`](Executor::execute) call runs one session to completion.
pub struct Executor {
    store: SessionStore,
    streams: Arc<StreamRegistry>,
    adapters: Arc<AdapterRegistry>,
    output_dir: PathBuf,
    max_words: usize,
    sink_mode: SinkMode,
}

impl Executor {
    pub fn new(
        store: SessionStore,
        streams: Arc<StreamRegistry>,
        adapters: Arc<AdapterRegistry>,
        output_dir: impl Into<PathBuf>,
        max_words: usize,
        sink_mode: SinkMode,
    ) -> Self {
        Executor {
            store,
            streams,
            adapters,
            output_dir: output_dir.into(),
            max_words,
            sink_mode,
        }
    }

    /// Output directory for one session's chunk files and index.
    pub fn session_output_dir(&self, session_id: &str) -> PathBuf {
        self.output_dir.join(session_id)
    }

    /// Run ingestion for all sources in the session. Intended to be
    /// spawned fire-and-forget; all outcomes are reported through the
    /// log stream and the persisted session record.
    pub async fn execute(self: Arc<Self>, session_id: String) {
        let stream = self.streams.open(&session_id);
        tracing::info!(session = %session_id, "execution started");

        if let Err(err) = self.run(&session_id, &stream).await {
            tracing::warn!(session = %session_id, error = %err, "execution failed");
            let line = format!("[ERROR] {:#}", err);
            stream.push(&line);
            if let Ok(Some(mut session)) = self.store.get(&session_id) {
                session.log.push(line);
                session.progress.errors.push(format!("{:#}", err));
                session.stage = SessionStage::Error;
                let _ = self.store.update(&mut session);
            }
        }

        // Removing the registry entry and dropping the sender closes the
        // channel, which subscribers observe as end-of-stream.
        self.streams.close(&session_id);
    }

    async fn run(&self, session_id: &str, stream: &LogStream) -> Result<()> {
        let mut session = self
            .store
            .get(session_id)?
            .with_context(|| format!("session {} not found", session_id))?;

        session.stage = SessionStage::Executing;
        session.progress.total_sources = session.sources.len();
        self.store.update(&mut session)?;

        // The deduplicator is seeded from the index the session was
        // created against, not from the in-progress one.
        let mut dedup = match &session.existing_index {
            Some(index) => Deduplicator::seeded(index),
            None => Deduplicator::new(),
        };
        let mut sink = self.open_sink(&session)?;
        let mut written = 0usize;

        let sources = session.sources.clone();
        for source in &sources {
            let Some(adapter) = self.adapters.get(source.kind) else {
                self.log(
                    &mut session,
                    stream,
                    format!("[SKIP] Unknown source type: {}", source.kind),
                )?;
                session
                    .progress
                    .errors
                    .push(format!("Unknown source type: {}", source.kind));
                session.progress.completed_sources += 1;
                self.store.update(&mut session)?;
                continue;
            };

            session.progress.current_source = Some(source.display_name().to_string());
            self.store.update(&mut session)?;
            self.log(
                &mut session,
                stream,
                format!("[SOURCE] {}", source.display_name()),
            )?;

            match self
                .process_source(&mut session, stream, source, adapter, &mut dedup, &mut sink)
                .await
            {
                Ok(count) => written += count,
                Err(err) => {
                    let msg = format!("{:#}", err);
                    self.log(&mut session, stream, format!("  [ERROR] {}", msg))?;
                    session.progress.errors.push(msg);
                }
            }

            session.progress.completed_sources += 1;
            self.store.update(&mut session)?;
        }

        session.progress.current_source = None;
        let done_line = sink.finish(written)?;
        session.stage = SessionStage::Done;
        self.log(&mut session, stream, done_line)?;
        tracing::info!(session = %session_id, written, "execution finished");
        Ok(())
    }

    async fn process_source(
        &self,
        session: &mut Session,
        stream: &LogStream,
        source: &Source,
        adapter: Arc<dyn SourceAdapter>,
        dedup: &mut Deduplicator,
        sink: &mut RunSink,
    ) -> Result<usize> {
        let result = adapter.extract(source).await?;

        for err in &result.errors {
            self.log(session, stream, format!("  [WARN] {}", err))?;
            session.progress.errors.push(err.clone());
        }

        let mut written = 0usize;
        for text in &result.texts {
            let ids = format_chunks(
                text,
                source.kind,
                dedup,
                sink.as_chunk_sink(),
                self.max_words,
            )
            .await?;
            for id in &ids {
                self.log(session, stream, sink.stored_line(id))?;
            }
            written += ids.len();
            session.progress.chunks_written += ids.len();
        }

        if result.texts.is_empty() && result.errors.is_empty() {
            self.log(session, stream, "  [WARN] No texts extracted".to_string())?;
        }

        Ok(written)
    }

    fn open_sink(&self, session: &Session) -> Result<RunSink> {
        match &self.sink_mode {
            SinkMode::File => {
                let sink = FileSink::open(self.session_output_dir(&session.id), &session.id)?;
                Ok(RunSink::File(sink))
            }
            SinkMode::Remote {
                api_base_url,
                worker_secret,
                agent_id,
            } => Ok(RunSink::Remote(RemoteSink::new(
                api_base_url,
                worker_secret,
                agent_id,
            ))),
        }
    }

    /// Append a line to the live stream and the persisted session log.
    /// The store write after every line keeps progress crash-visible.
    fn log(&self, session: &mut Session, stream: &LogStream, line: String) -> Result<()> {
        stream.push(&line);
        session.log.push(line);
        self.store.update(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedText, SourceType, ToolResult};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedAdapter {
        result: ToolResult,
    }

    #[async_trait]
    impl SourceAdapter for FixedAdapter {
        async fn extract(&self, _source: &Source) -> Result<ToolResult> {
            Ok(self.result.clone())
        }
    }

    struct FailingAdapter;

    #[async_trait]
    impl SourceAdapter for FailingAdapter {
        async fn extract(&self, _source: &Source) -> Result<ToolResult> {
            bail!("connection refused")
        }
    }

    fn extracted(title: &str, body: &str) -> ExtractedText {
        ExtractedText {
            title: title.to_string(),
            body: body.to_string(),
            source_url: format!("https://example.com/{}", title),
            date: Some("2024-01-15".to_string()),
            metadata: Default::default(),
        }
    }

    struct Harness {
        _tmp: TempDir,
        store: SessionStore,
        streams: Arc<StreamRegistry>,
        executor: Arc<Executor>,
        output_dir: PathBuf,
    }

    fn harness(adapters: AdapterRegistry) -> Harness {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::open(tmp.path()).unwrap();
        let streams = Arc::new(StreamRegistry::new());
        let output_dir = tmp.path().join("output");
        let executor = Arc::new(Executor::new(
            store.clone(),
            streams.clone(),
            Arc::new(adapters),
            &output_dir,
            4000,
            SinkMode::File,
        ));
        Harness {
            _tmp: tmp,
            store,
            streams,
            executor,
            output_dir,
        }
    }

    fn session_with_sources(store: &SessionStore, sources: Vec<Source>) -> Session {
        let mut session = Session::new("test run", None);
        session.sources = sources;
        session.plan = "ingest everything".to_string();
        session.stage = SessionStage::Executing;
        store.create(session).unwrap()
    }

    #[tokio::test]
    async fn two_sources_reach_done_with_summary_line() {
        let mut adapters = AdapterRegistry::new();
        adapters.register(
            SourceType::Web,
            Arc::new(FixedAdapter {
                result: ToolResult {
                    texts: vec![extracted("alpha", "Alpha body text here.")],
                    errors: vec![],
                },
            }),
        );
        adapters.register(
            SourceType::Text,
            Arc::new(FixedAdapter {
                result: ToolResult {
                    texts: vec![extracted("beta", "Beta body text, distinct.")],
                    errors: vec![],
                },
            }),
        );
        let h = harness(adapters);
        let session = session_with_sources(
            &h.store,
            vec![
                Source::new(SourceType::Web, "https://a.example", "A"),
                Source::new(SourceType::Text, "/tmp/b.md", "B"),
            ],
        );

        h.executor.clone().execute(session.id.clone()).await;

        let done = h.store.get(&session.id).unwrap().unwrap();
        assert_eq!(done.stage, SessionStage::Done);
        assert_eq!(done.progress.completed_sources, 2);
        assert_eq!(done.progress.chunks_written, 2);
        assert!(done.progress.errors.is_empty());
        assert_eq!(
            done.log.last().unwrap(),
            "[DONE] 2 files written, 2 total entries"
        );

        let index = crate::canon::load_index(
            &h.output_dir.join(&session.id).join("index.json"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(index.entries.len(), 2);
    }

    #[tokio::test]
    async fn unknown_source_type_is_skipped_not_fatal() {
        let mut adapters = AdapterRegistry::new();
        adapters.register(
            SourceType::Web,
            Arc::new(FixedAdapter {
                result: ToolResult {
                    texts: vec![extracted("alpha", "Alpha body text here.")],
                    errors: vec![],
                },
            }),
        );
        let h = harness(adapters);
        let session = session_with_sources(
            &h.store,
            vec![
                Source::new(SourceType::Youtube, "https://youtu.be/x", "Video"),
                Source::new(SourceType::Web, "https://a.example", "A"),
            ],
        );

        h.executor.clone().execute(session.id.clone()).await;

        let done = h.store.get(&session.id).unwrap().unwrap();
        assert_eq!(done.stage, SessionStage::Done);
        assert!(done
            .log
            .iter()
            .any(|l| l == "[SKIP] Unknown source type: youtube"));
        // The skipped source counts as completed but wrote nothing.
        assert_eq!(done.progress.completed_sources, 2);
        assert_eq!(done.progress.chunks_written, 1);
        assert_eq!(
            done.log.last().unwrap(),
            "[DONE] 1 files written, 1 total entries"
        );
    }

    #[tokio::test]
    async fn adapter_failure_is_per_source_warning() {
        let mut adapters = AdapterRegistry::new();
        adapters.register(SourceType::Web, Arc::new(FailingAdapter));
        adapters.register(
            SourceType::Text,
            Arc::new(FixedAdapter {
                result: ToolResult {
                    texts: vec![extracted("beta", "Beta body text, distinct.")],
                    errors: vec![],
                },
            }),
        );
        let h = harness(adapters);
        let session = session_with_sources(
            &h.store,
            vec![
                Source::new(SourceType::Web, "https://down.example", "Down"),
                Source::new(SourceType::Text, "/tmp/b.md", "B"),
            ],
        );

        h.executor.clone().execute(session.id.clone()).await;

        let done = h.store.get(&session.id).unwrap().unwrap();
        assert_eq!(done.stage, SessionStage::Done);
        assert!(done
            .log
            .iter()
            .any(|l| l.starts_with("  [ERROR] connection refused")));
        assert_eq!(done.progress.chunks_written, 1);
    }

    #[tokio::test]
    async fn adapter_errors_logged_as_warnings() {
        let mut adapters = AdapterRegistry::new();
        adapters.register(
            SourceType::Rss,
            Arc::new(FixedAdapter {
                result: ToolResult {
                    texts: vec![],
                    errors: vec!["feed entry 3 unreadable".to_string()],
                },
            }),
        );
        let h = harness(adapters);
        let session = session_with_sources(
            &h.store,
            vec![Source::new(SourceType::Rss, "https://feed.example", "")],
        );

        h.executor.clone().execute(session.id.clone()).await;

        let done = h.store.get(&session.id).unwrap().unwrap();
        assert_eq!(done.stage, SessionStage::Done);
        assert!(done.log.iter().any(|l| l == "  [WARN] feed entry 3 unreadable"));
        assert_eq!(done.progress.errors, vec!["feed entry 3 unreadable"]);
    }

    #[tokio::test]
    async fn empty_source_warns_no_texts_extracted() {
        let mut adapters = AdapterRegistry::new();
        adapters.register(
            SourceType::Web,
            Arc::new(FixedAdapter {
                result: ToolResult::default(),
            }),
        );
        let h = harness(adapters);
        let session = session_with_sources(
            &h.store,
            vec![Source::new(SourceType::Web, "https://empty.example", "")],
        );

        h.executor.clone().execute(session.id.clone()).await;

        let done = h.store.get(&session.id).unwrap().unwrap();
        assert!(done.log.iter().any(|l| l == "  [WARN] No texts extracted"));
        assert_eq!(done.stage, SessionStage::Done);
    }

    #[tokio::test]
    async fn duplicate_content_across_sources_admitted_once() {
        let body = "The exact same article text syndicated twice.";
        let mut adapters = AdapterRegistry::new();
        adapters.register(
            SourceType::Web,
            Arc::new(FixedAdapter {
                result: ToolResult {
                    texts: vec![extracted("article", body)],
                    errors: vec![],
                },
            }),
        );
        adapters.register(
            SourceType::Rss,
            Arc::new(FixedAdapter {
                result: ToolResult {
                    texts: vec![extracted("article-syndicated", body)],
                    errors: vec![],
                },
            }),
        );
        let h = harness(adapters);
        let session = session_with_sources(
            &h.store,
            vec![
                Source::new(SourceType::Web, "https://a.example", ""),
                Source::new(SourceType::Rss, "https://feed.example", ""),
            ],
        );

        h.executor.clone().execute(session.id.clone()).await;

        let done = h.store.get(&session.id).unwrap().unwrap();
        assert_eq!(done.progress.chunks_written, 1);
        assert_eq!(
            done.log.last().unwrap(),
            "[DONE] 1 files written, 1 total entries"
        );
    }

    #[tokio::test]
    async fn missing_session_closes_stream_without_panic() {
        let h = harness(AdapterRegistry::new());
        h.executor.clone().execute("ses_missing".to_string()).await;
        assert!(h.streams.take("ses_missing").is_none());
    }

    /// Adapter that holds extraction open until released, so a test can
    /// attach a subscriber while the run is provably still in flight.
    struct GatedAdapter {
        gate: Arc<tokio::sync::Notify>,
        result: ToolResult,
    }

    #[async_trait]
    impl SourceAdapter for GatedAdapter {
        async fn extract(&self, _source: &Source) -> Result<ToolResult> {
            self.gate.notified().await;
            Ok(self.result.clone())
        }
    }

    #[tokio::test]
    async fn log_lines_reach_subscriber_in_order_with_sentinel() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let mut adapters = AdapterRegistry::new();
        adapters.register(
            SourceType::Web,
            Arc::new(GatedAdapter {
                gate: gate.clone(),
                result: ToolResult {
                    texts: vec![extracted("alpha", "Alpha body text here.")],
                    errors: vec![],
                },
            }),
        );
        let h = harness(adapters);
        let session = session_with_sources(
            &h.store,
            vec![Source::new(SourceType::Web, "https://a.example", "A")],
        );

        let task = tokio::spawn(h.executor.clone().execute(session.id.clone()));

        // Poll for the channel like an SSE subscriber would. The adapter
        // is parked on the gate, so the run cannot finish and discard the
        // receiver before we take it.
        let mut rx = None;
        for _ in 0..50 {
            if let Some(r) = h.streams.take(&session.id) {
                rx = Some(r);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let mut rx = rx.expect("channel not registered");
        gate.notify_one();

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        task.await.unwrap();

        assert_eq!(lines[0], "[SOURCE] A");
        assert!(lines.last().unwrap().starts_with("[DONE]"));
    }

    #[test]
    fn confirm_empty_plan_is_rejected_without_transition() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::open(tmp.path()).unwrap();
        let mut session = store.create(Session::new("no plan", None)).unwrap();
        session.stage = SessionStage::Plan;

        assert!(confirm_plan(&store, &mut session).is_err());
        assert_eq!(session.stage, SessionStage::Plan);

        session.plan = "do the thing".to_string();
        confirm_plan(&store, &mut session).unwrap();
        assert_eq!(session.stage, SessionStage::Executing);
    }

    #[test]
    fn confirm_after_terminal_stage_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::open(tmp.path()).unwrap();
        let mut session = store.create(Session::new("finished", None)).unwrap();
        session.plan = "plan".to_string();
        session.stage = SessionStage::Done;
        assert!(confirm_plan(&store, &mut session).is_err());
        assert_eq!(session.stage, SessionStage::Done);
    }
}

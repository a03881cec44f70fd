//! Canonry command-line interface.
//!
//! `serve` runs the HTTP API; `run` executes a one-shot ingestion of
//! local text files without the server; `sessions` lists stored sessions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use canonry::adapters::AdapterRegistry;
use canonry::config::load_config;
use canonry::executor::{confirm_plan, Executor};
use canonry::models::{Session, Source, SourceType};
use canonry::planner::{OutlinePlanner, Planner};
use canonry::server::run_server;
use canonry::session::SessionStore;
use canonry::streams::StreamRegistry;

#[derive(Parser)]
#[command(name = "canonry", version, about = "Content ingestion worker for agent canons")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "config/canonry.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve,

    /// Run a one-shot ingestion session from the command line
    Run {
        /// Session name
        #[arg(long, default_value = "cli session")]
        name: String,

        /// Source as `type:url`, e.g. `text:./notes.md`. Repeatable.
        #[arg(long = "source", required = true)]
        sources: Vec<String>,

        /// Existing canon directory whose index seeds deduplication
        #[arg(long)]
        canon_path: Option<PathBuf>,
    },

    /// List stored sessions
    Sessions,
}

fn parse_source(spec: &str) -> Result<Source> {
    let (kind, url) = spec
        .split_once(':')
        .with_context(|| format!("invalid source '{}', expected type:url", spec))?;
    let kind = SourceType::parse(kind)
        .with_context(|| format!("unknown source type '{}' in '{}'", kind, spec))?;
    Ok(Source::new(kind, url, ""))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Serve => run_server(&config).await,
        Command::Run {
            name,
            sources,
            canon_path,
        } => run_once(&config, name, sources, canon_path).await,
        Command::Sessions => list_sessions(&config),
    }
}

/// Create a session, plan it, and execute it in-process, printing log
/// lines as they arrive.
async fn run_once(
    config: &canonry::config::Config,
    name: String,
    source_specs: Vec<String>,
    canon_path: Option<PathBuf>,
) -> Result<()> {
    std::fs::create_dir_all(&config.storage.data_dir)?;
    std::fs::create_dir_all(&config.storage.output_dir)?;

    let store = SessionStore::open(&config.storage.data_dir)?;
    let streams = Arc::new(StreamRegistry::new());
    let adapters = Arc::new(AdapterRegistry::with_builtins(config.uploads_dir()));
    let executor = Arc::new(Executor::new(
        store.clone(),
        streams.clone(),
        adapters,
        &config.storage.output_dir,
        config.pipeline.max_words,
        config.sink_mode()?,
    ));

    let mut session = store.create(Session::new(name, canon_path))?;
    for spec in &source_specs {
        session.sources.push(parse_source(spec)?);
    }
    session.plan = OutlinePlanner.plan(&session).await?;
    confirm_plan(&store, &mut session)?;

    let session_id = session.id.clone();
    println!("session: {}", session_id);

    let handle = tokio::spawn(executor.execute(session_id.clone()));

    // The executor opens the channel before its first log line, so a
    // short wait is enough to attach.
    let mut rx = None;
    for _ in 0..50 {
        if let Some(r) = streams.take(&session_id) {
            rx = Some(r);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let attached = rx.is_some();
    if let Some(mut rx) = rx {
        while let Some(line) = rx.recv().await {
            println!("{}", line);
        }
    }
    handle.await?;

    let session = store
        .get(&session_id)?
        .context("session record disappeared mid-run")?;
    if !attached {
        // Execution finished before we attached; fall back to the
        // persisted log.
        for line in &session.log {
            println!("{}", line);
        }
    }
    println!("stage: {}", session.stage);
    Ok(())
}

fn list_sessions(config: &canonry::config::Config) -> Result<()> {
    let store = SessionStore::open(&config.storage.data_dir)?;
    let sessions = store.list()?;
    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }
    for session in sessions {
        println!(
            "{}  {:9}  {:2} sources  {:3} chunks  {}",
            session.id,
            session.stage.to_string(),
            session.sources.len(),
            session.progress.chunks_written,
            session.name
        );
    }
    Ok(())
}

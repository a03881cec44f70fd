//! # Canonry
//!
//! A local-first content ingestion worker that builds deduplicated "canon"
//! corpora from heterogeneous sources (web pages, transcripts, feeds,
//! documents, plain text).
//!
//! Canonry consumes already-extracted text from per-source adapters, cleans
//! and splits it into bounded sections, deduplicates by content hash against
//! a durable index, and writes the admitted chunks either as Markdown files
//! with YAML frontmatter or as records posted to a remote chunk store. An
//! asynchronous session executor drives sources through the pipeline and
//! streams progress lines to SSE subscribers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────────────────┐   ┌─────────────┐
//! │  Adapters   │──▶│       Pipeline           │──▶│    Sink     │
//! │ text/web/…  │   │ clean → split → dedup    │   │ files/index │
//! └─────────────┘   └─────────────────────────┘   │ or remote   │
//!        ▲                                         └─────────────┘
//!        │          ┌─────────────────────────┐
//!        └──────────│       Executor           │──▶ log stream (SSE)
//!                   │ session state machine    │
//!                   └─────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! canonry run --name "rust book" --source text:./notes/ownership.md
//! canonry serve                 # start the HTTP API
//! canonry sessions              # list stored sessions
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`cleaner`] | Boilerplate stripping and whitespace normalization |
//! | [`splitter`] | Word-bounded heading/paragraph splitting |
//! | [`dedup`] | Content-hash fingerprinting and dedup set |
//! | [`formatter`] | Pipeline composition into chunk records |
//! | [`sink`] | File and remote chunk sinks |
//! | [`canon`] | Canon index persistence |
//! | [`session`] | File-backed session store |
//! | [`adapters`] | Source adapter trait and registry |
//! | [`planner`] | Plan generation seam |
//! | [`executor`] | Session execution loop |
//! | [`streams`] | Session log stream registry |
//! | [`server`] | HTTP API with SSE execution stream |

pub mod adapters;
pub mod canon;
pub mod cleaner;
pub mod config;
pub mod dedup;
pub mod executor;
pub mod formatter;
pub mod models;
pub mod planner;
pub mod server;
pub mod session;
pub mod sink;
pub mod splitter;
pub mod streams;

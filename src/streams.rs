//! Session log stream registry.
//!
//! Maps a session id to an append-only FIFO channel of log lines while
//! execution is in flight. The executor opens a channel when it starts
//! and pushes every log line into it; the SSE handler takes the receiver
//! (at most once per session) and forwards lines to the client. Dropping
//! the sender closes the channel, which is the end-of-stream sentinel.
//!
//! The registry is an owned object injected into both the executor and
//! the HTTP layer, guarded by a mutex rather than living as a global.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Producer half of a session's log channel, held by the executor.
#[derive(Debug, Clone)]
pub struct LogStream {
    tx: UnboundedSender<String>,
}

impl LogStream {
    /// Append a line. Send failures mean the subscriber went away, which
    /// never aborts execution.
    pub fn push(&self, line: &str) {
        let _ = self.tx.send(line.to_string());
    }
}

#[derive(Debug, Default)]
pub struct StreamRegistry {
    inner: Mutex<HashMap<String, UnboundedReceiver<String>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        StreamRegistry::default()
    }

    /// Open a fresh channel for `session_id`, replacing any stale one.
    /// The receiver is parked in the registry until a subscriber takes it.
    pub fn open(&self, session_id: &str) -> LogStream {
        let (tx, rx) = unbounded_channel();
        self.inner
            .lock()
            .expect("stream registry poisoned")
            .insert(session_id.to_string(), rx);
        LogStream { tx }
    }

    /// Take the receiver for `session_id`. Returns `None` when execution
    /// has not started, has already finished, or another subscriber took
    /// it first.
    pub fn take(&self, session_id: &str) -> Option<UnboundedReceiver<String>> {
        self.inner
            .lock()
            .expect("stream registry poisoned")
            .remove(session_id)
    }

    /// Drop the registry entry once execution ends. A no-op when the
    /// receiver was already taken by a subscriber.
    pub fn close(&self, session_id: &str) {
        self.inner
            .lock()
            .expect("stream registry poisoned")
            .remove(session_id);
    }
}

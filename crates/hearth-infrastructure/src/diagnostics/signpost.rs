//! Named timing spans.
//!
//! The name → span map is owned by a single lane thread. Callers on any thread
//! send it commands and wait for the reply, so the map is never touched
//! concurrently and needs no lock.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// An open span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSpan {
    pub id: Uuid,
    pub started_at: Instant,
}

/// Result of opening a span.
#[derive(Debug, Clone, Copy)]
pub struct BeginOutcome {
    pub id: Uuid,
    /// Span previously open under the same name, now abandoned
    pub replaced: Option<ActiveSpan>,
}

/// A span closed by `end`.
#[derive(Debug, Clone, Copy)]
pub struct ClosedSpan {
    pub id: Uuid,
    pub elapsed: Duration,
}

enum LaneCommand {
    Begin {
        name: String,
        reply: Sender<BeginOutcome>,
    },
    End {
        name: String,
        reply: Sender<Option<ClosedSpan>>,
    },
    Snapshot {
        reply: Sender<HashMap<String, Uuid>>,
    },
    Shutdown,
}

pub struct SignpostTracker {
    lane: Sender<LaneCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for SignpostTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SignpostTracker {
    pub fn new() -> Self {
        let (lane, commands) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("hearth-signpost-lane".to_string())
            .spawn(move || run_lane(commands))
            .map_err(|e| tracing::warn!("[Signpost] Failed to spawn lane thread: {}", e))
            .ok();

        Self {
            lane,
            worker: Mutex::new(worker),
        }
    }

    /// Opens `name`, replacing any span already open under that name.
    ///
    /// Returns `None` only if the lane is gone.
    pub fn begin(&self, name: &str) -> Option<BeginOutcome> {
        let (reply, response) = mpsc::channel();
        self.send(LaneCommand::Begin {
            name: name.to_string(),
            reply,
        })?;
        response.recv().ok()
    }

    /// Closes `name`. Unknown names are a no-op and yield `None`.
    pub fn end(&self, name: &str) -> Option<ClosedSpan> {
        let (reply, response) = mpsc::channel();
        self.send(LaneCommand::End {
            name: name.to_string(),
            reply,
        })?;
        response.recv().ok().flatten()
    }

    /// Copy of the open spans, taken on the lane.
    pub fn active_spans(&self) -> HashMap<String, Uuid> {
        let (reply, response) = mpsc::channel();
        if self.send(LaneCommand::Snapshot { reply }).is_none() {
            return HashMap::new();
        }
        response.recv().unwrap_or_default()
    }

    fn send(&self, command: LaneCommand) -> Option<()> {
        self.lane.send(command).ok()
    }
}

impl Drop for SignpostTracker {
    fn drop(&mut self) {
        let _ = self.lane.send(LaneCommand::Shutdown);
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }
}

fn run_lane(commands: Receiver<LaneCommand>) {
    let mut spans: HashMap<String, ActiveSpan> = HashMap::new();

    for command in commands {
        match command {
            LaneCommand::Begin { name, reply } => {
                let span = ActiveSpan {
                    id: Uuid::new_v4(),
                    started_at: Instant::now(),
                };
                let replaced = spans.insert(name, span);
                let _ = reply.send(BeginOutcome {
                    id: span.id,
                    replaced,
                });
            }
            LaneCommand::End { name, reply } => {
                let closed = spans.remove(&name).map(|span| ClosedSpan {
                    id: span.id,
                    elapsed: span.started_at.elapsed(),
                });
                let _ = reply.send(closed);
            }
            LaneCommand::Snapshot { reply } => {
                let snapshot = spans
                    .iter()
                    .map(|(name, span)| (name.clone(), span.id))
                    .collect();
                let _ = reply.send(snapshot);
            }
            LaneCommand::Shutdown => break,
        }
    }
}

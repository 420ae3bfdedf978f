//! Live status of a run, built from pipeline events.
//!
//! Keeps counters, the set of running intents and two bounded histories
//! (recently placed files and recent failures) for the CLI to render.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use tokio::sync::broadcast;

use crate::pipeline::{IntentId, PipelineEvent};

/// Entries kept in each history.
pub const HISTORY_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub id: IntentId,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct StatusBoard {
    queued: usize,
    running: BTreeMap<IntentId, String>,
    completed: u64,
    failed: u64,
    rejected: u64,
    recent: VecDeque<PathBuf>,
    failures: VecDeque<Failure>,
    history_len: usize,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::with_history(HISTORY_LEN)
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history_len: usize) -> Self {
        Self {
            queued: 0,
            running: BTreeMap::new(),
            completed: 0,
            failed: 0,
            rejected: 0,
            recent: VecDeque::new(),
            failures: VecDeque::new(),
            history_len: history_len.max(1),
        }
    }

    pub fn apply(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Queued { .. } => self.queued += 1,
            PipelineEvent::Started { id, url } => {
                self.queued = self.queued.saturating_sub(1);
                self.running.insert(*id, url.clone());
            }
            PipelineEvent::Completed { id, path, .. } => {
                self.running.remove(id);
                self.completed += 1;
                push_bounded(&mut self.recent, path.clone(), self.history_len);
            }
            PipelineEvent::Failed { id, url, error } => {
                self.running.remove(id);
                self.failed += 1;
                push_bounded(
                    &mut self.failures,
                    Failure {
                        id: *id,
                        url: url.clone(),
                        error: error.clone(),
                    },
                    self.history_len,
                );
            }
            PipelineEvent::Rejected { .. } => self.rejected += 1,
        }
    }

    pub fn queued(&self) -> usize {
        self.queued
    }

    pub fn running(&self) -> impl Iterator<Item = (&IntentId, &String)> {
        self.running.iter()
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Most recent last.
    pub fn recent(&self) -> impl Iterator<Item = &PathBuf> {
        self.recent.iter()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.failures.iter()
    }

    /// One-line summary, e.g. `queued 3 | running 2 | done 41 | failed 1`.
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "queued {} | running {} | done {} | failed {}",
            self.queued,
            self.running.len(),
            self.completed,
            self.failed
        );
        if self.rejected > 0 {
            line.push_str(&format!(" | rejected {}", self.rejected));
        }
        line
    }
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, cap: usize) {
    if buf.len() == cap {
        buf.pop_front();
    }
    buf.push_back(item);
}

/// Feeds every event into `board` and calls `on_event` after each update,
/// until the pipeline is dropped. Missed events (slow consumer) are logged
/// and skipped.
pub async fn follow<F>(
    mut events: broadcast::Receiver<PipelineEvent>,
    board: &mut StatusBoard,
    mut on_event: F,
) where
    F: FnMut(&StatusBoard, &PipelineEvent),
{
    loop {
        match events.recv().await {
            Ok(event) => {
                board.apply(&event);
                on_event(board, &event);
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::debug!(missed, "status lagged behind pipeline events");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

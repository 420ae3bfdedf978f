//! Bounded-concurrency download pipeline.
//!
//! Intents wait in a FIFO queue of fixed capacity and are dispatched into a
//! fixed number of job slots. Each job transfers into its own staging
//! directory, dates the file and moves it into `<root>/<year>/<month>/`.
//! A failed job only marks its intent failed.

pub mod intent;
mod job;
pub mod slots;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, Notify};

use crate::collab::{DateLabelSource, MetadataReader, Transfer};
use crate::config::ArchivistConfig;
use crate::date::DateBucket;
use crate::placement::{PathReservations, StagingArea, DEFAULT_PATH_LIMIT};

pub use intent::{DownloadIntent, IntentId};
pub use job::Placed;
pub use slots::SlotQueue;

const EVENT_BUFFER: usize = 256;

/// Sizing and locations for a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_active: usize,
    pub queue_capacity: usize,
    pub archive_root: PathBuf,
    pub staging_dir: PathBuf,
    pub path_limit: usize,
    pub transfer_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(cfg: &ArchivistConfig) -> Self {
        Self {
            max_active: cfg.max_active_jobs,
            queue_capacity: cfg.queue_capacity,
            archive_root: cfg.archive_root.clone(),
            staging_dir: cfg.staging_dir(),
            path_limit: cfg.path_limit,
            transfer_timeout: cfg.timeouts.transfer(),
        }
    }

    /// Defaults for an archive rooted at `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let archive_root = root.into();
        Self {
            max_active: 10,
            queue_capacity: 15,
            staging_dir: archive_root.join(".staging"),
            archive_root,
            path_limit: DEFAULT_PATH_LIMIT,
            transfer_timeout: Duration::from_secs(300),
        }
    }
}

/// External collaborators used by jobs.
#[derive(Clone)]
pub struct Collaborators {
    pub transfer: Arc<dyn Transfer>,
    pub metadata: Arc<dyn MetadataReader>,
    pub pages: Arc<dyn DateLabelSource>,
}

/// Lifecycle notifications, one per state change of an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Queued { id: IntentId, url: String },
    Started { id: IntentId, url: String },
    Completed { id: IntentId, path: PathBuf, bucket: DateBucket },
    Failed { id: IntentId, url: String, error: String },
    /// Enqueue refused because the queue was full.
    Rejected { url: String },
}

/// Counts of intents by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
}

/// The queue was full; the intent is handed back unchanged.
#[derive(Debug)]
pub struct EnqueueRejected(pub DownloadIntent);

impl EnqueueRejected {
    pub fn into_intent(self) -> DownloadIntent {
        self.0
    }
}

#[derive(Debug)]
struct State {
    slots: SlotQueue<DownloadIntent>,
    summary: PipelineSummary,
}

pub(crate) struct Shared {
    settings: PipelineSettings,
    collab: Collaborators,
    staging: StagingArea,
    reservations: Arc<PathReservations>,
    state: Mutex<State>,
    changed: Notify,
    events: broadcast::Sender<PipelineEvent>,
    next_id: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Cloneable handle to one pipeline.
#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<Shared>,
}

/// Frees the job slot even if the job panics, then dispatches more work.
struct SlotGuard {
    pipeline: Pipeline,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.pipeline.shared.lock().slots.release();
        self.pipeline.shared.changed.notify_waiters();
        self.pipeline.pump();
    }
}

impl Pipeline {
    pub fn new(settings: PipelineSettings, collab: Collaborators) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let state = State {
            slots: SlotQueue::new(settings.queue_capacity, settings.max_active),
            summary: PipelineSummary::default(),
        };
        Self {
            shared: Arc::new(Shared {
                staging: StagingArea::new(settings.staging_dir.clone()),
                settings,
                collab,
                reservations: Arc::new(PathReservations::new()),
                state: Mutex::new(state),
                changed: Notify::new(),
                events,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.shared.settings
    }

    /// Clears staging leftovers of an interrupted run.
    pub async fn prepare(&self) -> anyhow::Result<()> {
        self.shared.staging.clear_stale().await?;
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.shared.events.subscribe()
    }

    /// Appends an intent to the queue. Never blocks; a full queue rejects.
    pub fn enqueue(&self, intent: DownloadIntent) -> Result<IntentId, EnqueueRejected> {
        let id = {
            let mut state = self.shared.lock();
            let id = IntentId(self.shared.next_id.load(Ordering::Relaxed));
            let url = intent.url.clone();
            if let Err(intent) = state.slots.try_enqueue(id, intent) {
                state.summary.rejected += 1;
                drop(state);
                tracing::warn!(url = %url, "queue full, intent rejected");
                self.shared.emit(PipelineEvent::Rejected { url });
                return Err(EnqueueRejected(intent));
            }
            self.shared.next_id.fetch_add(1, Ordering::Relaxed);
            state.summary.enqueued += 1;
            self.shared.emit(PipelineEvent::Queued { id, url });
            id
        };
        tracing::debug!(intent = %id, "queued");
        self.pump();
        Ok(id)
    }

    /// Spare queue room and a free slot.
    pub fn has_capacity(&self) -> bool {
        self.shared.lock().slots.has_capacity()
    }

    /// (queued, active)
    pub fn load(&self) -> (usize, usize) {
        let state = self.shared.lock();
        (state.slots.queued(), state.slots.active())
    }

    pub fn summary(&self) -> PipelineSummary {
        self.shared.lock().summary
    }

    /// Resolves once a new intent would be accepted and could start running.
    pub async fn wait_for_capacity(&self) {
        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.has_capacity() {
                return;
            }
            notified.await;
        }
    }

    /// Waits until every queued and running intent has finished.
    pub async fn drain(&self) -> PipelineSummary {
        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.shared.lock();
                if state.slots.is_idle() {
                    return state.summary;
                }
            }
            notified.await;
        }
    }

    /// Starts queued intents while slots are free.
    fn pump(&self) {
        loop {
            let next = self.shared.lock().slots.try_dispatch();
            let Some((id, intent)) = next else {
                return;
            };
            self.shared.emit(PipelineEvent::Started {
                id,
                url: intent.url.clone(),
            });
            let guard = SlotGuard {
                pipeline: self.clone(),
            };
            tokio::spawn(async move {
                let shared = Arc::clone(&guard.pipeline.shared);
                let event = match job::run(&shared, id, &intent).await {
                    Ok(placed) => {
                        tracing::info!(
                            intent = %id,
                            path = %placed.path.display(),
                            date = %placed.bucket,
                            "download placed"
                        );
                        shared.lock().summary.completed += 1;
                        PipelineEvent::Completed {
                            id,
                            path: placed.path,
                            bucket: placed.bucket,
                        }
                    }
                    Err(e) => {
                        tracing::error!(intent = %id, url = %intent.url, error = %e, "download failed");
                        shared.lock().summary.failed += 1;
                        PipelineEvent::Failed {
                            id,
                            url: intent.url.clone(),
                            error: e.to_string(),
                        }
                    }
                };
                shared.emit(event);
                drop(guard);
            });
        }
    }
}

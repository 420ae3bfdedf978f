//! Resumable walk over the library, oldest unprocessed item to newest.
//!
//! The run locates the newest item (the frontier), returns to the
//! checkpointed item, and then repeatedly steps to the next newer item,
//! triggers its download and hands the captured request to the pipeline.
//! Stepping is suspended while the pipeline has no spare capacity. The
//! checkpoint advances once an intent has been accepted by the queue.

mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::checkpoint::CheckpointStore;
use crate::collab::{Automation, DownloadEvent};
use crate::config::ArchivistConfig;
use crate::control::RunControl;
use crate::error::{ArchiveError, AutomationError};
use crate::locator::ItemLocator;
use crate::pipeline::{DownloadIntent, IntentId, Pipeline, PipelineSummary};
use crate::retry::{run_with_retry, ErrorKind, Exhausted, RetryDecision, RetryPolicy};

pub use state::TraversalState;

#[derive(Debug, Clone, Copy)]
pub struct TraversalSettings {
    pub retry: RetryPolicy,
    pub navigation_timeout: Duration,
    pub download_start_timeout: Duration,
}

impl TraversalSettings {
    pub fn from_config(cfg: &ArchivistConfig) -> Self {
        Self {
            retry: RetryPolicy::from(&cfg.retry),
            navigation_timeout: cfg.timeouts.navigation(),
            download_start_timeout: cfg.timeouts.download_start(),
        }
    }
}

impl Default for TraversalSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            navigation_timeout: Duration::from_secs(30),
            download_start_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of a run that was not aborted.
#[derive(Debug, Clone)]
pub struct TraversalReport {
    pub start: ItemLocator,
    pub frontier: ItemLocator,
    /// Last item handed to the pipeline (and checkpointed).
    pub last: ItemLocator,
    pub steps: u64,
    pub intents: u64,
    /// A stop was requested before the frontier was reached.
    pub stopped_early: bool,
    pub summary: PipelineSummary,
}

#[derive(Debug)]
struct Progress {
    start: ItemLocator,
    frontier: ItemLocator,
    last: ItemLocator,
    steps: u64,
    intents: u64,
    stopped_early: bool,
}

pub struct Traversal {
    automation: Arc<dyn Automation>,
    downloads: mpsc::Receiver<DownloadEvent>,
    pipeline: Pipeline,
    checkpoint: CheckpointStore,
    settings: TraversalSettings,
    control: RunControl,
    state: TraversalState,
}

impl Traversal {
    /// `downloads` carries the download-started events of `automation`.
    pub fn new(
        automation: Arc<dyn Automation>,
        downloads: mpsc::Receiver<DownloadEvent>,
        pipeline: Pipeline,
        checkpoint: CheckpointStore,
        settings: TraversalSettings,
    ) -> Self {
        Self {
            automation,
            downloads,
            pipeline,
            checkpoint,
            settings,
            control: RunControl::new(),
            state: TraversalState::Initializing,
        }
    }

    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    /// Runs to the frontier (or a stop request), then drains the pipeline.
    ///
    /// Fatal errors still drain jobs already accepted before returning.
    pub async fn run(mut self) -> Result<TraversalReport, ArchiveError> {
        let outcome = self.traverse().await;

        self.enter(TraversalState::Draining);
        let (queued, active) = self.pipeline.load();
        if queued + active > 0 {
            tracing::info!(queued, active, "waiting for downloads to finish");
        }
        let summary = self.pipeline.drain().await;
        self.enter(TraversalState::Terminated);

        let progress = outcome?;
        Ok(TraversalReport {
            start: progress.start,
            frontier: progress.frontier,
            last: progress.last,
            steps: progress.steps,
            intents: progress.intents,
            stopped_early: progress.stopped_early,
            summary,
        })
    }

    fn enter(&mut self, next: TraversalState) {
        tracing::debug!(from = %self.state, to = %next, "traversal state");
        self.state = next;
    }

    async fn traverse(&mut self) -> Result<Progress, ArchiveError> {
        self.enter(TraversalState::Initializing);
        let start = self.checkpoint.load()?;

        self.enter(TraversalState::LocatingFrontier);
        let frontier = self.jump_to_newest(&start).await?;
        tracing::info!(start = %start, frontier = %frontier, "traversal range");

        self.enter(TraversalState::SeekingStart);
        self.goto(&start).await?;

        let mut progress = Progress {
            start: start.clone(),
            frontier: frontier.clone(),
            last: start.clone(),
            steps: 0,
            intents: 0,
            stopped_early: false,
        };

        // The checkpointed item may have been interrupted mid-transfer last
        // time, so it is fetched again and may replace what is on disk.
        if !self.wait_for_capacity().await {
            progress.stopped_early = true;
            return Ok(progress);
        }
        self.download_item(&start, true).await?;
        progress.intents += 1;

        if start == frontier {
            tracing::info!("checkpoint is already the newest item");
            return Ok(progress);
        }

        self.enter(TraversalState::Stepping);
        let mut current = start;
        loop {
            if !self.wait_for_capacity().await {
                progress.stopped_early = true;
                break;
            }

            let next = self.step_from(&current).await?;
            progress.steps += 1;
            tracing::debug!(item = %next, step = progress.steps, "stepped");

            self.download_item(&next, false).await?;
            progress.intents += 1;
            self.checkpoint
                .save(&next)
                .map_err(ArchiveError::Checkpoint)?;

            progress.last = next.clone();
            current = next;
            if current == frontier {
                tracing::info!(steps = progress.steps, "reached the newest item");
                break;
            }
        }
        Ok(progress)
    }

    /// Blocks until the pipeline can take another intent. Returns false if a
    /// stop was requested instead.
    async fn wait_for_capacity(&self) -> bool {
        if self.control.is_stop_requested() {
            return false;
        }
        if !self.pipeline.has_capacity() {
            tracing::trace!("pipeline full, traversal suspended");
        }
        tokio::select! {
            _ = self.pipeline.wait_for_capacity() => {}
            _ = self.control.stopped() => {}
        }
        !self.control.is_stop_requested()
    }

    async fn jump_to_newest(&self, from: &ItemLocator) -> Result<ItemLocator, ArchiveError> {
        let automation = Arc::clone(&self.automation);
        let timeout = self.settings.navigation_timeout;
        run_with_retry(&self.settings.retry, ErrorKind::of, |_| {
            let automation = Arc::clone(&automation);
            async move { automation.jump_to_newest(timeout).await }
        })
        .await
        .map_err(|ex| navigation_failure(ex, from))
    }

    async fn goto(&self, target: &ItemLocator) -> Result<(), ArchiveError> {
        let automation = Arc::clone(&self.automation);
        let timeout = self.settings.navigation_timeout;
        run_with_retry(&self.settings.retry, ErrorKind::of, |_| {
            let automation = Arc::clone(&automation);
            let target = target.clone();
            async move { automation.goto(&target, timeout).await }
        })
        .await
        .map_err(|ex| navigation_failure(ex, target))?;

        match self.automation.current_locator().await {
            Ok(here) if here != *target => {
                tracing::warn!(expected = %target, actual = %here, "landed on a different item");
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "could not confirm start position"),
        }
        Ok(())
    }

    /// One step toward newer items. A step whose wait timed out still counts
    /// if the page has moved by the time the timeout is noticed.
    async fn step_from(&self, from: &ItemLocator) -> Result<ItemLocator, ArchiveError> {
        let automation = Arc::clone(&self.automation);
        let timeout = self.settings.navigation_timeout;
        run_with_retry(&self.settings.retry, ErrorKind::of, |attempt| {
            let automation = Arc::clone(&automation);
            let from = from.clone();
            async move {
                match automation.step_to_previous_item(timeout).await {
                    Ok(next) if next != from => Ok(next),
                    Ok(next) => Err(AutomationError::Stalled(format!("still at {next}"))),
                    Err(e) if ErrorKind::of(&e) != ErrorKind::Other => {
                        match automation.current_locator().await {
                            Ok(now) if now != from => {
                                tracing::debug!(attempt, item = %now, "late step detected");
                                Ok(now)
                            }
                            _ => Err(e),
                        }
                    }
                    Err(e) => Err(e),
                }
            }
        })
        .await
        .map_err(|ex| navigation_failure(ex, from))
    }

    /// Captures the download of the item at `at` and queues it.
    async fn download_item(
        &mut self,
        at: &ItemLocator,
        overwrite: bool,
    ) -> Result<IntentId, ArchiveError> {
        let event = self.capture_download(at).await?;
        let intent = DownloadIntent::from_event(event, at.clone()).with_overwrite(overwrite);
        let id = self.submit(intent).await;
        tracing::debug!(intent = %id, item = %at, overwrite, "download queued");
        Ok(id)
    }

    /// Triggers the download gesture and waits for the download-started
    /// event, retrying the gesture on timeout.
    async fn capture_download(&mut self, at: &ItemLocator) -> Result<DownloadEvent, ArchiveError> {
        // Events still buffered belong to earlier items.
        while let Ok(stale) = self.downloads.try_recv() {
            tracing::warn!(url = %stale.url, "discarding unexpected download event");
        }

        let policy = self.settings.retry;
        let mut attempt = 1u32;
        loop {
            let kind = match self.automation.trigger_download().await {
                Ok(()) => {
                    match tokio::time::timeout(
                        self.settings.download_start_timeout,
                        self.downloads.recv(),
                    )
                    .await
                    {
                        Ok(Some(event)) => return Ok(event),
                        Ok(None) => {
                            return Err(AutomationError::Driver(
                                "download event stream closed".to_string(),
                            )
                            .into())
                        }
                        Err(_) => ErrorKind::Timeout,
                    }
                }
                Err(e) => match ErrorKind::of(&e) {
                    ErrorKind::Other => return Err(e.into()),
                    kind => {
                        tracing::debug!(error = %e, "download gesture failed");
                        kind
                    }
                },
            };

            match policy.decide(attempt, kind) {
                RetryDecision::NoRetry => {
                    return Err(ArchiveError::DownloadStartTimeout {
                        attempts: attempt,
                        at: at.clone(),
                    })
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(attempt, item = %at, "download did not start, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    // A slow start of the previous attempt is still this item's download.
                    if let Ok(event) = self.downloads.try_recv() {
                        return Ok(event);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Enqueues, waiting for room if the queue is unexpectedly full.
    async fn submit(&self, mut intent: DownloadIntent) -> IntentId {
        loop {
            match self.pipeline.enqueue(intent) {
                Ok(id) => return id,
                Err(rejected) => {
                    intent = rejected.into_intent();
                    self.pipeline.wait_for_capacity().await;
                }
            }
        }
    }
}

fn navigation_failure(ex: Exhausted<AutomationError>, from: &ItemLocator) -> ArchiveError {
    match ErrorKind::of(&ex.last) {
        ErrorKind::Other => ArchiveError::Automation(ex.last),
        ErrorKind::Timeout | ErrorKind::Stalled => ArchiveError::NavigationTimeout {
            attempts: ex.attempts,
            from: from.clone(),
        },
    }
}

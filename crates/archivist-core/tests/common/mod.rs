//! Fake collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archivist_core::checkpoint::CheckpointStore;
use archivist_core::collab::{
    Automation, Cookie, DateLabelSource, DownloadEvent, MetadataReader, Transfer,
};
use archivist_core::config::LibraryConfig;
use archivist_core::date::MediaTags;
use archivist_core::error::{AutomationError, MetadataError, TransferError};
use archivist_core::locator::ItemLocator;
use archivist_core::pipeline::{Collaborators, Pipeline, PipelineSettings};
use archivist_core::retry::RetryPolicy;
use archivist_core::traversal::{Traversal, TraversalSettings};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One library item, oldest first in a library listing.
#[derive(Debug, Clone)]
pub struct Item {
    pub locator: ItemLocator,
    pub url: String,
    pub name: Option<String>,
    pub label: Option<String>,
}

pub fn locator(n: usize) -> ItemLocator {
    ItemLocator::parse(&format!("https://photos.google.com/photo/ITEM{n:02}")).unwrap()
}

/// Items #1..=#count, all labelled "May 17, 2020" on their pages.
pub fn items(count: usize) -> Vec<Item> {
    (1..=count)
        .map(|n| Item {
            locator: locator(n),
            url: format!("https://media.example.com/item{n:02}/photo{n:02}.jpg"),
            name: Some(format!("photo{n:02}.jpg")),
            label: Some("May 17, 2020".to_string()),
        })
        .collect()
}

/// Misbehaviour injected into the fake library, by 1-based item number.
#[derive(Debug, Default, Clone)]
pub struct Faults {
    /// Stepping away from this item always times out.
    pub stuck_at: Option<usize>,
    /// Stepping away from this item moves the page but reports a timeout (once).
    pub late_step_at: Option<usize>,
    /// The download gesture on this item never produces an event.
    pub silent_at: Option<usize>,
}

/// An in-memory library page: a cursor over `items`.
pub struct FakeLibrary {
    items: Vec<Item>,
    position: Mutex<Option<usize>>,
    events: mpsc::Sender<DownloadEvent>,
    faults: Faults,
    late_used: AtomicBool,
    pub triggers: AtomicUsize,
    pub steps: AtomicUsize,
}

impl FakeLibrary {
    pub fn build(items: Vec<Item>, faults: Faults) -> (Arc<Self>, mpsc::Receiver<DownloadEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let lib = Arc::new(Self {
            items,
            position: Mutex::new(None),
            events: tx,
            faults,
            late_used: AtomicBool::new(false),
            triggers: AtomicUsize::new(0),
            steps: AtomicUsize::new(0),
        });
        (lib, rx)
    }

    fn at(&self) -> Result<usize, AutomationError> {
        self.position
            .lock()
            .unwrap()
            .ok_or_else(|| AutomationError::Driver("no page loaded".into()))
    }

    fn is(&self, fault: Option<usize>, index: usize) -> bool {
        fault == Some(index + 1)
    }
}

#[async_trait]
impl DateLabelSource for FakeLibrary {
    async fn fetch_visible_date_label(&self, origin: &ItemLocator) -> Option<String> {
        self.items
            .iter()
            .find(|i| &i.locator == origin)
            .and_then(|i| i.label.clone())
    }
}

#[async_trait]
impl Automation for FakeLibrary {
    async fn current_locator(&self) -> Result<ItemLocator, AutomationError> {
        Ok(self.items[self.at()?].locator.clone())
    }

    async fn jump_to_newest(&self, _timeout: Duration) -> Result<ItemLocator, AutomationError> {
        let last = self.items.len() - 1;
        *self.position.lock().unwrap() = Some(last);
        Ok(self.items[last].locator.clone())
    }

    async fn goto(&self, target: &ItemLocator, _timeout: Duration) -> Result<(), AutomationError> {
        let index = self
            .items
            .iter()
            .position(|i| &i.locator == target)
            .ok_or_else(|| AutomationError::Driver(format!("no such item {target}")))?;
        *self.position.lock().unwrap() = Some(index);
        Ok(())
    }

    async fn step_to_previous_item(
        &self,
        timeout: Duration,
    ) -> Result<ItemLocator, AutomationError> {
        let index = self.at()?;
        if self.is(self.faults.stuck_at, index) {
            return Err(AutomationError::Timeout(timeout));
        }
        if index + 1 >= self.items.len() {
            return Err(AutomationError::Stalled("no previous item".into()));
        }
        *self.position.lock().unwrap() = Some(index + 1);
        self.steps.fetch_add(1, Ordering::SeqCst);
        if self.is(self.faults.late_step_at, index) && !self.late_used.swap(true, Ordering::SeqCst) {
            return Err(AutomationError::Timeout(timeout));
        }
        Ok(self.items[index + 1].locator.clone())
    }

    async fn trigger_download(&self) -> Result<(), AutomationError> {
        self.triggers.fetch_add(1, Ordering::SeqCst);
        let index = self.at()?;
        if self.is(self.faults.silent_at, index) {
            return Ok(());
        }
        let item = &self.items[index];
        let event = DownloadEvent {
            url: item.url.clone(),
            suggested_name: item.name.clone(),
            cookies: vec![Cookie {
                name: "SID".into(),
                value: "session".into(),
            }],
        };
        self.events
            .send(event)
            .await
            .map_err(|_| AutomationError::Driver("event receiver dropped".into()))
    }
}

/// Writes the URL as file content; URLs in `failing` exit with an error.
#[derive(Default)]
pub struct FakeTransfer {
    pub failing: HashSet<String>,
    pub delay: Duration,
    running: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

impl FakeTransfer {
    pub fn failing(urls: &[&str]) -> Self {
        Self {
            failing: urls.iter().map(|u| u.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Transfer for FakeTransfer {
    async fn transfer(
        &self,
        url: &str,
        headers: &[(String, String)],
        dest_dir: &Path,
    ) -> Result<PathBuf, TransferError> {
        self.calls.lock().unwrap().push(url.to_string());
        assert!(headers.iter().any(|(k, v)| k == "Cookie" && v == "SID=session"));

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(url) {
            return Err(TransferError::Exit {
                program: "fake-transfer".into(),
                status: "exit status: 22".into(),
                stderr: "The requested URL returned error: 403".into(),
            });
        }
        let path = dest_dir.join("download.tmpname");
        tokio::fs::write(&path, url.as_bytes())
            .await
            .map_err(TransferError::Staging)?;
        Ok(path)
    }
}

/// Capture times keyed by the URL stored in the file.
#[derive(Default)]
pub struct FakeMetadata {
    pub dates: HashMap<String, String>,
}

impl FakeMetadata {
    pub fn with(pairs: &[(&str, &str)]) -> Self {
        Self {
            dates: pairs
                .iter()
                .map(|(u, d)| (u.to_string(), d.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl MetadataReader for FakeMetadata {
    async fn read_tags(&self, path: &Path) -> Result<MediaTags, MetadataError> {
        let url = tokio::fs::read_to_string(path).await.map_err(|e| MetadataError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        match self.dates.get(&url) {
            Some(d) => Ok(MediaTags {
                original_capture_time: Some(d.clone()),
                creation_time: None,
            }),
            None => Err(MetadataError {
                path: path.to_path_buf(),
                reason: "no tags".into(),
            }),
        }
    }
}

pub fn fast_settings() -> TraversalSettings {
    TraversalSettings {
        retry: RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(1),
        },
        navigation_timeout: Duration::from_millis(50),
        download_start_timeout: Duration::from_millis(50),
    }
}

/// Temp archive + checkpoint wired to the fakes.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub checkpoint: CheckpointStore,
    pub library: Arc<FakeLibrary>,
    pub transfer: Arc<FakeTransfer>,
    pub pipeline: Pipeline,
    downloads: Option<mpsc::Receiver<DownloadEvent>>,
}

impl Harness {
    pub fn new(
        items: Vec<Item>,
        faults: Faults,
        transfer: FakeTransfer,
        metadata: FakeMetadata,
        slots: usize,
        capacity: usize,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint =
            CheckpointStore::new(dir.path().join("state/lastdone"), LibraryConfig::default());
        let (library, downloads) = FakeLibrary::build(items, faults);
        let transfer = Arc::new(transfer);

        let mut settings = PipelineSettings::for_root(dir.path().join("archive"));
        settings.max_active = slots;
        settings.queue_capacity = capacity;
        let pipeline = Pipeline::new(
            settings,
            Collaborators {
                transfer: transfer.clone(),
                metadata: Arc::new(metadata),
                pages: library.clone(),
            },
        );
        Self {
            dir,
            checkpoint,
            library,
            transfer,
            pipeline,
            downloads: Some(downloads),
        }
    }

    /// Ten items, no faults, default transfer and metadata, 10 slots / 15 queued.
    pub fn simple() -> Self {
        Self::new(
            items(10),
            Faults::default(),
            FakeTransfer::default(),
            FakeMetadata::default(),
            10,
            15,
        )
    }

    pub fn archive(&self) -> PathBuf {
        self.dir.path().join("archive")
    }

    pub fn traversal(&mut self) -> Traversal {
        Traversal::new(
            self.library.clone(),
            self.downloads.take().expect("traversal already built"),
            self.pipeline.clone(),
            self.checkpoint.clone(),
            fast_settings(),
        )
    }

    pub fn stored_checkpoint(&self) -> Option<ItemLocator> {
        self.checkpoint.read().unwrap()
    }

    /// File names (sorted) in `<archive>/<year>/<month>`.
    pub fn files_in(&self, year: i32, month: u32) -> Vec<String> {
        let dir = self.archive().join(year.to_string()).join(month.to_string());
        let mut names: Vec<String> = match std::fs::read_dir(&dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

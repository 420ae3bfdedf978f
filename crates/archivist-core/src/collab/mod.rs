//! Interfaces of the external collaborators and their process-backed
//! implementations.
//!
//! - [`Automation`]: the page automation layer (driver process via [`bridge`])
//! - [`Transfer`]: the bulk-download utility (external command via [`transfer`])
//! - [`MetadataReader`]: the tag extraction utility (exiftool via [`metadata`])

pub mod bridge;
pub mod metadata;
pub mod transfer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::date::MediaTags;
use crate::error::{AutomationError, MetadataError, TransferError};
use crate::locator::ItemLocator;

pub use bridge::ProcessBridge;
pub use metadata::ExifToolReader;
pub use transfer::CommandTransfer;

/// Browser cookie attached to a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// "A download started" notification from the automation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEvent {
    pub url: String,
    pub suggested_name: Option<String>,
    pub cookies: Vec<Cookie>,
}

/// Supplies the human-readable date shown on an item's page.
#[async_trait]
pub trait DateLabelSource: Send + Sync {
    /// Visible "date taken" label for `origin`, or `None` if the page has none.
    async fn fetch_visible_date_label(&self, origin: &ItemLocator) -> Option<String>;
}

/// Movement primitives over the rendered library.
///
/// Download-started events are delivered on a separate channel handed to the
/// traversal engine together with the automation handle.
#[async_trait]
pub trait Automation: DateLabelSource {
    async fn current_locator(&self) -> Result<ItemLocator, AutomationError>;

    /// Selects the newest item of the library and reports its locator.
    async fn jump_to_newest(&self, timeout: Duration) -> Result<ItemLocator, AutomationError>;

    async fn goto(&self, locator: &ItemLocator, timeout: Duration) -> Result<(), AutomationError>;

    /// Moves to the previous item. Resolves only once the location has
    /// actually changed, or fails with `Timeout`/`Stalled`.
    async fn step_to_previous_item(&self, timeout: Duration)
        -> Result<ItemLocator, AutomationError>;

    /// Performs the download gesture on the current item.
    async fn trigger_download(&self) -> Result<(), AutomationError>;
}

/// The external transfer utility.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Fetches `url` with `headers` into `dest_dir` and returns the path of
    /// the produced file. The returned path is verified by the caller.
    async fn transfer(
        &self,
        url: &str,
        headers: &[(String, String)],
        dest_dir: &Path,
    ) -> Result<PathBuf, TransferError>;
}

/// The external metadata extraction utility.
#[async_trait]
pub trait MetadataReader: Send + Sync {
    async fn read_tags(&self, path: &Path) -> Result<MediaTags, MetadataError>;
}

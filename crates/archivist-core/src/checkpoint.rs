//! Persisted resume point: one text file holding the locator of the last
//! enqueued item.
//!
//! Writes go through a temp file in the same directory followed by a rename,
//! so a crash leaves either the old or the new locator, never a torn one.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::LibraryConfig;
use crate::error::ArchiveError;
use crate::locator::ItemLocator;

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    library: LibraryConfig,
    seed: Option<String>,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>, library: LibraryConfig) -> Self {
        Self {
            path: path.into(),
            library,
            seed: None,
        }
    }

    /// Locator to start from when no checkpoint has been written yet.
    pub fn with_seed(mut self, seed: Option<String>) -> Self {
        self.seed = seed.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored locator, if any. Missing or empty files yield `None`.
    pub fn read(&self) -> Result<Option<ItemLocator>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("read checkpoint: {}", self.path.display()))
            }
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let locator = ItemLocator::parse(raw)
            .with_context(|| format!("parse checkpoint: {}", self.path.display()))?;
        Ok(Some(locator))
    }

    /// Resume point: the stored locator, else the seed (which is then persisted).
    pub fn load(&self) -> Result<ItemLocator, ArchiveError> {
        if let Some(stored) = self.read().map_err(ArchiveError::Checkpoint)? {
            tracing::debug!(checkpoint = %stored, "loaded checkpoint");
            return Ok(stored);
        }
        let Some(seed) = self.seed.as_deref() else {
            return Err(ArchiveError::MissingSeed {
                path: self.path.clone(),
            });
        };
        let locator = self.write_seed(seed).map_err(ArchiveError::Checkpoint)?;
        tracing::info!(seed = %locator, "no checkpoint yet, starting from seed");
        Ok(locator)
    }

    /// Overwrites the checkpoint with `locator`.
    ///
    /// Locators that are not library items (settings, error or sign-in pages
    /// reached by a navigation excursion) are refused with a warning and the
    /// stored value is left untouched. Returns whether the write happened.
    pub fn save(&self, locator: &ItemLocator) -> Result<bool> {
        if !locator.is_library_item(&self.library) {
            tracing::warn!(locator = %locator, "refusing to checkpoint a non-library position");
            return Ok(false);
        }
        self.write_atomic(locator.as_str())?;
        tracing::trace!(checkpoint = %locator, "checkpoint saved");
        Ok(true)
    }

    /// Validates and stores a starting locator, replacing any checkpoint.
    pub fn write_seed(&self, raw: &str) -> Result<ItemLocator> {
        let locator = ItemLocator::parse(raw).context("parse seed")?;
        if !locator.is_library_item(&self.library) {
            anyhow::bail!(
                "seed {} is not a {} item locator",
                locator,
                self.library.host
            );
        }
        self.write_atomic(locator.as_str())?;
        Ok(locator)
    }

    fn write_atomic(&self, contents: &str) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("create dir: {}", parent.display()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .with_context(|| format!("create temp checkpoint in {}", parent.display()))?;
        tmp.write_all(contents.as_bytes())
            .context("write temp checkpoint")?;
        tmp.as_file().sync_all().context("sync temp checkpoint")?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("write checkpoint: {}", self.path.display()))?;
        Ok(())
    }
}

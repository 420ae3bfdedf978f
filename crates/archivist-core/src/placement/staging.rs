//! Stage-then-move file lifecycle.
//!
//! Transfers write into a per-intent directory under the staging root; a
//! finished file is moved to its final path in one rename, so a crash never
//! leaves a half-written file at a permanent location.

use anyhow::{Context, Result};
use std::io;
use std::path::{Path, PathBuf};

/// Temporary file suffix used for cross-filesystem copies before rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `a.jpg` → `a.jpg.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Root directory holding one sub-directory per in-flight intent.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Removes leftovers of a previous (crashed) run. Returns how many entries were removed.
    pub async fn clear_stale(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(e).with_context(|| format!("read staging dir: {}", self.root.display()))
            }
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove stale staging entry"),
            }
        }
        if removed > 0 {
            tracing::info!(removed, "cleared stale staging entries from a previous run");
        }
        Ok(removed)
    }

    /// Creates (empty) the staging directory for one intent.
    pub async fn slot_dir(&self, intent_id: u64) -> io::Result<PathBuf> {
        let dir = self.root.join(format!("intent-{intent_id}"));
        if tokio::fs::try_exists(&dir).await? {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Best-effort removal of an intent's staging directory.
    pub async fn release(&self, dir: &Path) {
        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::debug!(path = %dir.display(), error = %e, "staging cleanup failed");
            }
        }
    }
}

/// Whether a `finalize` error means another writer took the destination first.
pub fn is_destination_taken(err: &anyhow::Error) -> bool {
    err.downcast_ref::<io::Error>()
        .is_some_and(|e| e.kind() == io::ErrorKind::AlreadyExists)
}

/// Moves `staged` to `final_path`, creating parent directories.
///
/// Without `overwrite` the move never replaces an existing file: it links the
/// staged file at the destination (which fails if anything is there) and then
/// unlinks the staged name. With `overwrite`, a plain rename replaces the
/// destination. Falls back to copy + rename through a `.part` file when the
/// staging area is on another filesystem.
pub fn finalize(staged: &Path, final_path: &Path, overwrite: bool) -> Result<()> {
    if let Some(parent) = final_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir: {}", parent.display()))?;
    }

    if !overwrite {
        match std::fs::hard_link(staged, final_path) {
            Ok(()) => {
                std::fs::remove_file(staged)
                    .with_context(|| format!("remove staged file: {}", staged.display()))?;
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(e).with_context(|| {
                    format!("destination appeared concurrently: {}", final_path.display())
                });
            }
            Err(e) => {
                tracing::debug!(error = %e, "hard link unavailable, falling back to rename");
                if final_path.symlink_metadata().is_ok() {
                    return Err(io::Error::from(io::ErrorKind::AlreadyExists)).with_context(|| {
                        format!("destination already exists: {}", final_path.display())
                    });
                }
            }
        }
    }

    match std::fs::rename(staged, final_path) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => copy_then_rename(staged, final_path),
        Err(e) => Err(e).with_context(|| {
            format!(
                "failed to rename {} to {}",
                staged.display(),
                final_path.display()
            )
        }),
    }
}

fn is_cross_device(e: &io::Error) -> bool {
    // EXDEV
    e.raw_os_error() == Some(18)
}

fn copy_then_rename(staged: &Path, final_path: &Path) -> Result<()> {
    let tmp = temp_path(final_path);
    std::fs::copy(staged, &tmp)
        .with_context(|| format!("copy {} to {}", staged.display(), tmp.display()))?;
    std::fs::File::open(&tmp)
        .and_then(|f| f.sync_all())
        .with_context(|| format!("sync {}", tmp.display()))?;
    std::fs::rename(&tmp, final_path)
        .with_context(|| format!("rename {} to {}", tmp.display(), final_path.display()))?;
    std::fs::remove_file(staged)
        .with_context(|| format!("remove staged file: {}", staged.display()))?;
    Ok(())
}

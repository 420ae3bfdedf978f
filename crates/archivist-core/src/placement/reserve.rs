//! Serialized destination reservation for concurrent jobs.
//!
//! A free-path check followed by a move is racy when several jobs target the
//! same directory. Every job reserves its destination under one lock; a path
//! counts as taken when it exists on disk or is reserved by another job.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::JobError;

use super::{first_free, is_occupied, same_content};

/// Registry of destination paths currently claimed by in-flight jobs.
#[derive(Debug, Default)]
pub struct PathReservations {
    reserved: Mutex<HashSet<PathBuf>>,
}

impl PathReservations {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.reserved.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reserve a destination for `candidate`.
    ///
    /// Returns the first variant that is neither on disk nor reserved. With
    /// `same_as`, a variant already holding exactly the bytes of that file
    /// also counts as free, so a re-placed item lands on its own earlier copy
    /// and never on an unrelated file. The reservation lasts until the
    /// returned guard is dropped.
    pub fn reserve(
        self: &Arc<Self>,
        candidate: &Path,
        limit: usize,
        same_as: Option<&Path>,
    ) -> Result<Reservation, JobError> {
        let mut reserved = self.lock();

        let path = first_free(candidate, limit, |p| {
            if reserved.contains(p) {
                return true;
            }
            is_occupied(p) && !same_as.is_some_and(|staged| same_content(p, staged))
        })?;

        reserved.insert(path.clone());
        tracing::trace!(path = %path.display(), "reserved destination");
        Ok(Reservation {
            owner: Arc::clone(self),
            path,
        })
    }

    /// Number of live reservations.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A claimed destination; released on drop.
#[derive(Debug)]
pub struct Reservation {
    owner: Arc<PathReservations>,
    path: PathBuf,
}

impl Reservation {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.owner.lock().remove(&self.path);
    }
}

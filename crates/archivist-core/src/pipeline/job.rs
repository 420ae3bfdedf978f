//! Processing of one dispatched intent: stage, verify, date, place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::date::{self, DateBucket};
use crate::error::{JobError, TransferError};
use crate::naming;
use crate::placement::{self, PathReservations};

use super::intent::{DownloadIntent, IntentId};
use super::Shared;

/// Attempts at placing one file when the chosen destination is taken between
/// reservation and move (e.g. by another program writing into the archive).
const PLACEMENT_ATTEMPTS: u32 = 8;

/// Where a finished intent landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placed {
    pub path: PathBuf,
    pub bucket: DateBucket,
}

pub(super) async fn run(
    shared: &Shared,
    id: IntentId,
    intent: &DownloadIntent,
) -> Result<Placed, JobError> {
    let slot = shared
        .staging
        .slot_dir(id.0)
        .await
        .map_err(TransferError::Staging)?;
    let result = stage_and_place(shared, intent, &slot).await;
    shared.staging.release(&slot).await;
    result
}

async fn stage_and_place(
    shared: &Shared,
    intent: &DownloadIntent,
    slot: &Path,
) -> Result<Placed, JobError> {
    let settings = &shared.settings;
    let headers = intent.request_headers();

    let produced = match tokio::time::timeout(
        settings.transfer_timeout,
        shared.collab.transfer.transfer(&intent.url, &headers, slot),
    )
    .await
    {
        Ok(res) => res?,
        Err(_) => return Err(TransferError::Timeout(settings.transfer_timeout).into()),
    };

    if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
        return Err(JobError::FileNotFound(produced));
    }

    let tags = match shared.collab.metadata.read_tags(&produced).await {
        Ok(tags) => Some(tags),
        Err(e) => {
            tracing::warn!(error = %e, "metadata unavailable, falling back to page date");
            None
        }
    };
    let bucket = date::resolve(tags.as_ref(), shared.collab.pages.as_ref(), &intent.origin).await;

    let produced_name = produced.file_name().and_then(|n| n.to_str());
    let name = naming::derive_filename(
        intent.suggested_name.as_deref().or(produced_name),
        &intent.url,
    );
    let candidate = placement::bucket_dir(&settings.archive_root, &bucket).join(name);
    tracing::debug!(
        candidate = %candidate.display(),
        date = %bucket,
        "placing download"
    );

    let reservations = Arc::clone(&shared.reservations);
    let limit = settings.path_limit;
    let overwrite = intent.overwrite;
    let path = tokio::task::spawn_blocking(move || {
        place(&reservations, &produced, &candidate, limit, overwrite)
    })
    .await
    .map_err(|e| JobError::Placement(anyhow::anyhow!("placement task failed: {e}")))??;

    Ok(Placed { path, bucket })
}

/// Reserve-then-move, re-reserving if the destination was taken in between.
///
/// With `overwrite`, an existing file is replaced only when it already holds
/// the staged bytes; a different file keeps its name and the download is
/// numbered around it.
fn place(
    reservations: &Arc<PathReservations>,
    staged: &Path,
    candidate: &Path,
    limit: usize,
    overwrite: bool,
) -> Result<PathBuf, JobError> {
    for _ in 0..PLACEMENT_ATTEMPTS {
        let reservation = reservations.reserve(candidate, limit, overwrite.then_some(staged))?;
        let replace = overwrite && placement::is_occupied(reservation.path());
        match placement::finalize(staged, reservation.path(), replace) {
            Ok(()) => return Ok(reservation.path().to_path_buf()),
            Err(e) if placement::is_destination_taken(&e) => {
                tracing::debug!(error = %format!("{e:#}"), "destination taken, picking another");
            }
            Err(e) => return Err(JobError::Placement(e)),
        }
    }
    Err(JobError::PathCollisionExhaustion(candidate.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_numbers_around_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let reservations = Arc::new(PathReservations::new());
        let candidate = dir.path().join("2020/5/photo.jpg");
        std::fs::create_dir_all(candidate.parent().unwrap()).unwrap();
        std::fs::write(&candidate, b"first").unwrap();

        let staged = dir.path().join("staged.jpg");
        std::fs::write(&staged, b"second").unwrap();
        let placed = place(&reservations, &staged, &candidate, 225, false).unwrap();

        assert_eq!(placed, dir.path().join("2020/5/photo_1.jpg"));
        assert_eq!(std::fs::read(&candidate).unwrap(), b"first");
        assert_eq!(std::fs::read(&placed).unwrap(), b"second");
        assert!(reservations.is_empty());
    }

    #[test]
    fn place_with_overwrite_replaces_identical_copy() {
        let dir = tempfile::tempdir().unwrap();
        let reservations = Arc::new(PathReservations::new());
        let candidate = dir.path().join("photo.jpg");
        std::fs::write(&candidate, b"same bytes").unwrap();

        let staged = dir.path().join("staged.jpg");
        std::fs::write(&staged, b"same bytes").unwrap();
        let placed = place(&reservations, &staged, &candidate, 225, true).unwrap();

        assert_eq!(placed, candidate);
        assert_eq!(std::fs::read(&candidate).unwrap(), b"same bytes");
        assert!(!staged.exists());
        assert!(!dir.path().join("photo_1.jpg").exists());
    }

    #[test]
    fn place_with_overwrite_keeps_an_unrelated_file() {
        let dir = tempfile::tempdir().unwrap();
        let reservations = Arc::new(PathReservations::new());
        let candidate = dir.path().join("photo.jpg");
        std::fs::write(&candidate, b"item a").unwrap();
        let own_copy = dir.path().join("photo_1.jpg");
        std::fs::write(&own_copy, b"item b").unwrap();

        let staged = dir.path().join("staged.jpg");
        std::fs::write(&staged, b"item b").unwrap();
        let placed = place(&reservations, &staged, &candidate, 225, true).unwrap();

        assert_eq!(placed, own_copy);
        assert_eq!(std::fs::read(&candidate).unwrap(), b"item a");
        assert_eq!(std::fs::read(&own_copy).unwrap(), b"item b");
        assert!(!dir.path().join("photo_2.jpg").exists());
    }

    #[test]
    fn place_with_overwrite_numbers_around_different_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let reservations = Arc::new(PathReservations::new());
        let candidate = dir.path().join("photo.jpg");
        std::fs::write(&candidate, b"old").unwrap();

        let staged = dir.path().join("staged.jpg");
        std::fs::write(&staged, b"new").unwrap();
        let placed = place(&reservations, &staged, &candidate, 225, true).unwrap();

        assert_eq!(placed, dir.path().join("photo_1.jpg"));
        assert_eq!(std::fs::read(&candidate).unwrap(), b"old");
        assert_eq!(std::fs::read(&placed).unwrap(), b"new");
    }
}

//! Destination path resolution and file placement.
//!
//! Computes collision-free, length-safe destinations under
//! `<archive_root>/<year>/<month>/`, serializes destination reservation across
//! concurrent jobs, and moves staged files into place.

mod reserve;
mod staging;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::date::DateBucket;
use crate::error::JobError;

pub use reserve::{PathReservations, Reservation};
pub use staging::{finalize, is_destination_taken, temp_path, StagingArea};

/// Default maximum destination path length in bytes.
pub const DEFAULT_PATH_LIMIT: usize = 225;

/// `<archive_root>/<year>/<month>`; month is not zero-padded.
pub fn bucket_dir(archive_root: &Path, bucket: &DateBucket) -> PathBuf {
    archive_root
        .join(bucket.year.to_string())
        .join(bucket.month.to_string())
}

/// True if anything (including a dangling symlink) occupies `path`.
pub(crate) fn is_occupied(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// True when both paths are readable files with identical bytes.
pub(crate) fn same_content(a: &Path, b: &Path) -> bool {
    fn compare(a: &Path, b: &Path) -> io::Result<bool> {
        let (fa, fb) = (File::open(a)?, File::open(b)?);
        let (ma, mb) = (fa.metadata()?, fb.metadata()?);
        if !ma.is_file() || !mb.is_file() || ma.len() != mb.len() {
            return Ok(false);
        }
        let mut ra = BufReader::new(fa);
        let mut rb = BufReader::new(fb);
        loop {
            let ba = ra.fill_buf()?;
            let bb = rb.fill_buf()?;
            let n = ba.len().min(bb.len());
            if n == 0 {
                return Ok(ba.is_empty() && bb.is_empty());
            }
            if ba[..n] != bb[..n] {
                return Ok(false);
            }
            ra.consume(n);
            rb.consume(n);
        }
    }
    compare(a, b).unwrap_or(false)
}

/// `dir/stem_<n>.ext` for `dir/stem.ext`.
pub fn numbered_variant(path: &Path, n: u64) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    path.with_file_name(name)
}

/// Shortens the file stem so the whole path is at most `limit` bytes.
///
/// The extension and directory are kept; the stem is cut at a char boundary
/// and keeps at least one char, so a directory that alone exceeds the limit
/// still yields a longer path. Paths within the limit are returned unchanged.
pub fn truncate(path: &Path, limit: usize) -> PathBuf {
    let total = path.as_os_str().len();
    if total <= limit {
        return path.to_path_buf();
    }
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return path.to_path_buf();
    };
    let excess = total - limit;
    let mut keep = stem.len().saturating_sub(excess);
    while keep > 0 && !stem.is_char_boundary(keep) {
        keep -= 1;
    }
    if keep == 0 {
        keep = stem.chars().next().map(char::len_utf8).unwrap_or(0);
    }
    let name = match path.extension() {
        Some(ext) => format!("{}.{}", &stem[..keep], ext.to_string_lossy()),
        None => stem[..keep].to_string(),
    };
    path.with_file_name(name)
}

/// The `n`th candidate for `candidate` within `limit`: n = 0 is the truncated
/// candidate itself, n ≥ 1 is a numbered variant whose stem is shortened to
/// leave room for the `_<n>` suffix.
pub fn fitted_variant(candidate: &Path, n: u64, limit: usize) -> PathBuf {
    if n == 0 {
        return truncate(candidate, limit);
    }
    let suffix_len = format!("_{n}").len();
    let base = truncate(candidate, limit.saturating_sub(suffix_len));
    numbered_variant(&base, n)
}

/// First candidate variant (within `limit`) for which `taken` is false.
pub(crate) fn first_free<F>(candidate: &Path, limit: usize, mut taken: F) -> Result<PathBuf, JobError>
where
    F: FnMut(&Path) -> bool,
{
    for n in 0..u64::from(u32::MAX) {
        let path = fitted_variant(candidate, n, limit);
        if !taken(&path) {
            return Ok(path);
        }
    }
    Err(JobError::PathCollisionExhaustion(candidate.to_path_buf()))
}

/// Returns `candidate` if nothing exists there, otherwise the first
/// `stem_<n>.ext` (n = 1, 2, ...) that does not exist.
///
/// Only consults the filesystem; concurrent jobs go through
/// [`PathReservations`] instead.
pub fn resolve_collision(candidate: &Path) -> Result<PathBuf, JobError> {
    first_free(candidate, usize::MAX, is_occupied)
}

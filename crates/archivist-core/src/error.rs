//! Error taxonomy shared by traversal and pipeline.
//!
//! Run-level errors (`ArchiveError`) abort the run; per-intent errors
//! (`JobError`) only mark one intent failed.

use std::path::PathBuf;
use std::time::Duration;

use crate::locator::{ItemLocator, LocatorError};

/// Fatal errors that stop a traversal run. Progress up to the last saved
/// checkpoint is kept.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// No checkpoint on disk and no seed supplied.
    #[error("no checkpoint at {path} and no seed supplied (run `archivist seed <URL>` first)")]
    MissingSeed { path: PathBuf },

    /// Navigation kept timing out after all retries.
    #[error("navigation timed out after {attempts} attempt(s) from {from}")]
    NavigationTimeout { attempts: u32, from: ItemLocator },

    /// The download gesture never produced a download-started event.
    #[error("download did not start after {attempts} attempt(s) at {at}")]
    DownloadStartTimeout { attempts: u32, at: ItemLocator },

    #[error("automation: {0}")]
    Automation(#[from] AutomationError),

    #[error("locator: {0}")]
    Locator(#[from] LocatorError),

    #[error("checkpoint: {0:#}")]
    Checkpoint(anyhow::Error),
}

/// Failures reported by the page automation collaborator.
#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The page did not move (e.g. the previous-item control was missing).
    #[error("navigation stalled: {0}")]
    Stalled(String),
    /// The driver went away or violated its protocol.
    #[error("driver: {0}")]
    Driver(String),
    #[error("invalid locator from driver: {0}")]
    Locator(#[from] LocatorError),
}

/// Failure of the external transfer utility.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("transfer timed out after {0:?}")]
    Timeout(Duration),
    #[error("staging: {0}")]
    Staging(#[source] std::io::Error),
}

/// Failure of the external metadata utility. Never fatal.
#[derive(Debug, thiserror::Error)]
#[error("metadata read failed for {path}: {reason}")]
pub struct MetadataError {
    pub path: PathBuf,
    pub reason: String,
}

/// Terminal failure of one download intent.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("transfer: {0}")]
    Transfer(#[from] TransferError),
    /// The transfer reported success but produced no file.
    #[error("transferred file not found: {0}")]
    FileNotFound(PathBuf),
    /// Counter space exhausted while resolving a free destination.
    #[error("no free destination for {0}")]
    PathCollisionExhaustion(PathBuf),
    #[error("placement: {0:#}")]
    Placement(anyhow::Error),
}

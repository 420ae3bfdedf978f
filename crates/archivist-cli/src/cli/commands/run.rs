//! `archivist run` – traverse the library and download into the archive.

use anyhow::Result;
use archivist_core::checkpoint::CheckpointStore;
use archivist_core::collab::{CommandTransfer, ExifToolReader, ProcessBridge};
use archivist_core::config::ArchivistConfig;
use archivist_core::control::RunControl;
use archivist_core::pipeline::{Collaborators, Pipeline, PipelineEvent, PipelineSettings};
use archivist_core::status::{self, StatusBoard};
use archivist_core::traversal::{Traversal, TraversalSettings};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DRIVER_SHUTDOWN: Duration = Duration::from_secs(10);

/// Exit status after a second interrupt (128 + SIGINT).
const INTERRUPTED_EXIT: i32 = 130;

#[derive(Debug, Default)]
pub struct RunOptions {
    pub seed: Option<String>,
    pub archive: Option<PathBuf>,
    pub headful: bool,
    pub jobs: Option<usize>,
}

/// Applies command-line overrides to the loaded config.
fn apply_overrides(cfg: &mut ArchivistConfig, opts: &RunOptions) {
    if let Some(archive) = &opts.archive {
        cfg.archive_root = archive.clone();
    }
    if let Some(jobs) = opts.jobs {
        cfg.max_active_jobs = jobs.max(1);
    }
    if opts.seed.is_some() {
        cfg.seed = opts.seed.clone();
    }
}

fn print_event(board: &StatusBoard, event: &PipelineEvent) {
    match event {
        PipelineEvent::Completed { path, .. } => {
            println!("  {}  [{}]", path.display(), board.summary_line());
        }
        PipelineEvent::Failed { id, url, error } => {
            eprintln!("  failed {}: {} ({})", id, url, error);
        }
        _ => {}
    }
}

pub async fn run_archive(mut cfg: ArchivistConfig, opts: RunOptions) -> Result<()> {
    apply_overrides(&mut cfg, &opts);

    let checkpoint = CheckpointStore::new(cfg.checkpoint_path()?, cfg.library.clone())
        .with_seed(cfg.seed.clone());

    let driver_args: Vec<String> = if opts.headful {
        vec!["--headful".to_string()]
    } else {
        Vec::new()
    };
    let (bridge, downloads) = ProcessBridge::spawn(&cfg.automation, &driver_args)?;

    let pipeline = Pipeline::new(
        PipelineSettings::from_config(&cfg),
        Collaborators {
            transfer: Arc::new(CommandTransfer::new(cfg.transfer.clone())),
            metadata: Arc::new(ExifToolReader::new(&cfg.metadata, cfg.timeouts.metadata())),
            pages: bridge.clone(),
        },
    );
    pipeline.prepare().await?;

    let events = pipeline.subscribe();
    let status_handle = tokio::spawn(async move {
        let mut board = StatusBoard::new();
        status::follow(events, &mut board, print_event).await;
        board
    });

    let control = RunControl::new();
    {
        let control = control.clone();
        tokio::spawn(async move {
            if let Some(code) = watch_interrupts(tokio::signal::ctrl_c, control).await {
                std::process::exit(code);
            }
        });
    }

    println!(
        "Archiving into {} ({} jobs, queue {})",
        cfg.archive_root.display(),
        cfg.max_active_jobs,
        cfg.queue_capacity
    );
    let traversal = Traversal::new(
        bridge.clone(),
        downloads,
        pipeline,
        checkpoint,
        TraversalSettings::from_config(&cfg),
    )
    .with_control(control);
    let outcome = traversal.run().await;

    if let Err(e) = bridge.shutdown(DRIVER_SHUTDOWN).await {
        tracing::warn!(error = %format!("{e:#}"), "automation driver did not shut down cleanly");
    }
    let board = status_handle.await?;

    let report = outcome?;
    println!(
        "{}: {} item(s) from {} to {}; {}",
        if report.stopped_early { "Stopped" } else { "Done" },
        report.intents,
        report.start,
        report.last,
        board.summary_line()
    );
    if report.summary.failed > 0 {
        println!("Failed downloads:");
        for f in board.failures() {
            println!("  {} {}: {}", f.id, f.url, f.error);
        }
    }
    Ok(())
}

/// First interrupt requests a graceful stop; the second returns the exit
/// code to abort with. Returns `None` if the signal source fails.
async fn watch_interrupts<F, Fut>(mut next_signal: F, control: RunControl) -> Option<i32>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::io::Result<()>>,
{
    next_signal().await.ok()?;
    eprintln!("Stopping after in-flight downloads finish... (Ctrl-C again to abort)");
    control.request_stop();

    next_signal().await.ok()?;
    eprintln!("Interrupted again, aborting without waiting for downloads");
    tracing::warn!("second interrupt, aborting");
    Some(INTERRUPTED_EXIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_config_values() {
        let mut cfg = ArchivistConfig::default();
        let opts = RunOptions {
            seed: Some("https://photos.google.com/photo/X".to_string()),
            archive: Some(PathBuf::from("/srv/photos")),
            headful: true,
            jobs: Some(0),
        };
        apply_overrides(&mut cfg, &opts);
        assert_eq!(cfg.archive_root, PathBuf::from("/srv/photos"));
        assert_eq!(cfg.max_active_jobs, 1);
        assert_eq!(cfg.seed.as_deref(), Some("https://photos.google.com/photo/X"));
    }

    #[test]
    fn no_overrides_keep_config() {
        let mut cfg = ArchivistConfig::default();
        cfg.seed = Some("https://photos.google.com/photo/Y".to_string());
        apply_overrides(&mut cfg, &RunOptions::default());
        assert_eq!(cfg.archive_root, PathBuf::from("download"));
        assert_eq!(cfg.max_active_jobs, 10);
        assert_eq!(cfg.seed.as_deref(), Some("https://photos.google.com/photo/Y"));
    }

    #[tokio::test]
    async fn second_interrupt_aborts() {
        let control = RunControl::new();
        let mut seen = 0;
        let code = watch_interrupts(
            || {
                seen += 1;
                std::future::ready(Ok(()))
            },
            control.clone(),
        )
        .await;
        assert_eq!(code, Some(INTERRUPTED_EXIT));
        assert_eq!(seen, 2);
        assert!(control.is_stop_requested());
    }

    #[tokio::test]
    async fn single_interrupt_only_requests_stop() {
        let control = RunControl::new();
        let mut seen = 0;
        let watcher = watch_interrupts(
            || {
                seen += 1;
                let pending = seen > 1;
                async move {
                    if pending {
                        std::future::pending::<()>().await;
                    }
                    Ok(())
                }
            },
            control.clone(),
        );
        let outcome = tokio::time::timeout(Duration::from_millis(50), watcher).await;
        assert!(outcome.is_err());
        assert!(control.is_stop_requested());
    }
}

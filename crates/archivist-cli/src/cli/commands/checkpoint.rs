//! `archivist checkpoint` – show the resume point.

use anyhow::Result;
use archivist_core::checkpoint::CheckpointStore;
use archivist_core::config::ArchivistConfig;

pub fn run_checkpoint(cfg: &ArchivistConfig) -> Result<()> {
    let store = CheckpointStore::new(cfg.checkpoint_path()?, cfg.library.clone());
    match store.read()? {
        Some(locator) => println!("{}", locator),
        None => {
            println!("No checkpoint at {}.", store.path().display());
            match cfg.seed.as_deref() {
                Some(seed) => println!("The next run starts from the configured seed {}.", seed),
                None => println!("Set one with `archivist seed <URL>`."),
            }
        }
    }
    Ok(())
}

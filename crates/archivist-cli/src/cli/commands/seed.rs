//! `archivist seed` – set the starting item.

use anyhow::Result;
use archivist_core::checkpoint::CheckpointStore;
use archivist_core::config::ArchivistConfig;

pub fn run_seed(cfg: &ArchivistConfig, url: &str) -> Result<()> {
    let store = CheckpointStore::new(cfg.checkpoint_path()?, cfg.library.clone());
    let locator = store.write_seed(url)?;
    println!("checkpoint set to {}", locator);
    println!("  stored in {}", store.path().display());
    Ok(())
}

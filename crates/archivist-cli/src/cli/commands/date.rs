//! `archivist date` – resolve the archive bucket of a local file.

use anyhow::Result;
use archivist_core::collab::{ExifToolReader, MetadataReader};
use archivist_core::config::ArchivistConfig;
use archivist_core::date;
use std::path::Path;

pub async fn run_date(cfg: &ArchivistConfig, path: &Path) -> Result<()> {
    if !path.is_file() {
        anyhow::bail!("not a file: {}", path.display());
    }
    let reader = ExifToolReader::new(&cfg.metadata, cfg.timeouts.metadata());
    let tags = match reader.read_tags(path).await {
        Ok(tags) => Some(tags),
        Err(e) => {
            eprintln!("warning: {e}");
            None
        }
    };
    let bucket = date::resolve_with_label(tags.as_ref(), None);
    println!("{}", bucket);
    Ok(())
}

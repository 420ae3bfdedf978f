//! `archivist login` – interactive sign-in through the automation driver.

use anyhow::Result;
use archivist_core::collab::bridge::run_interactive;
use archivist_core::config::ArchivistConfig;

pub async fn run_login(cfg: &ArchivistConfig) -> Result<()> {
    println!("Sign in in the browser window, then close it to save the session.");
    let status = run_interactive(&cfg.automation, &["login".to_string()]).await?;
    if !status.success() {
        anyhow::bail!("{} login exited with {}", cfg.automation.program, status);
    }
    println!("Session saved.");
    Ok(())
}

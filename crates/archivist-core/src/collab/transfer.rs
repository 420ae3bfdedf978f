//! Transfer through an external command (curl by default).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::naming;

use super::Transfer;

/// Suffixes of in-progress files left by common transfer tools.
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".aria2", ".tmp", ".crdownload"];

/// Runs the configured program once per download.
#[derive(Debug, Clone)]
pub struct CommandTransfer {
    cfg: TransferConfig,
}

impl CommandTransfer {
    pub fn new(cfg: TransferConfig) -> Self {
        Self { cfg }
    }

    /// Argument vector: one `header_flag "Name: value"` pair per header, then
    /// `args` with `{url}` and `{dir}` substituted.
    pub fn build_args(&self, url: &str, headers: &[(String, String)], dest_dir: &Path) -> Vec<String> {
        let dir = dest_dir.to_string_lossy();
        let mut out = Vec::with_capacity(headers.len() * 2 + self.cfg.args.len());
        for (name, value) in headers {
            out.push(self.cfg.header_flag.clone());
            out.push(format!("{name}: {value}"));
        }
        out.extend(
            self.cfg
                .args
                .iter()
                .map(|a| a.replace("{url}", url).replace("{dir}", &dir)),
        );
        out
    }
}

/// Picks the produced file in `dir`: the largest regular file that is not a
/// partial download.
async fn produced_file(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut best: Option<(u64, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            continue;
        }
        if best.as_ref().map_or(true, |(len, _)| meta.len() > *len) {
            best = Some((meta.len(), entry.path()));
        }
    }
    Ok(best.map(|(_, p)| p))
}

#[async_trait]
impl Transfer for CommandTransfer {
    async fn transfer(
        &self,
        url: &str,
        headers: &[(String, String)],
        dest_dir: &Path,
    ) -> Result<PathBuf, TransferError> {
        let args = self.build_args(url, headers, dest_dir);
        tracing::debug!(program = %self.cfg.program, url, dir = %dest_dir.display(), "starting transfer");

        let output = tokio::process::Command::new(&self.cfg.program)
            .args(&args)
            .current_dir(dest_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TransferError::Spawn {
                program: self.cfg.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TransferError::Exit {
                program: self.cfg.program.clone(),
                status: output.status.to_string(),
                stderr,
            });
        }

        let produced = produced_file(dest_dir)
            .await
            .map_err(TransferError::Staging)?;
        // When nothing was produced, report the expected name; the caller's
        // existence check turns it into a not-found failure.
        Ok(produced.unwrap_or_else(|| dest_dir.join(naming::derive_filename(None, url))))
    }
}

//! Date tag extraction through exiftool.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use crate::config::MetadataConfig;
use crate::date::MediaTags;
use crate::error::MetadataError;

use super::MetadataReader;

const ORIGINAL_TAG: &str = "DateTimeOriginal";
const CREATE_TAG: &str = "CreateDate";

/// Runs `<program> -json -DateTimeOriginal -CreateDate <file>`.
#[derive(Debug, Clone)]
pub struct ExifToolReader {
    program: String,
    timeout: Duration,
}

impl ExifToolReader {
    pub fn new(cfg: &MetadataConfig, timeout: Duration) -> Self {
        Self {
            program: cfg.program.clone(),
            timeout,
        }
    }
}

/// Extracts the two date tags from exiftool's `-json` output (an array with
/// one object per file).
pub fn parse_exiftool_json(raw: &[u8]) -> Result<MediaTags, String> {
    let value: serde_json::Value = serde_json::from_slice(raw).map_err(|e| e.to_string())?;
    let first = value
        .as_array()
        .and_then(|a| a.first())
        .ok_or_else(|| "empty exiftool output".to_string())?;
    let text = |key: &str| -> Option<String> {
        match first.get(key)? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };
    Ok(MediaTags {
        original_capture_time: text(ORIGINAL_TAG),
        creation_time: text(CREATE_TAG),
    })
}

#[async_trait]
impl MetadataReader for ExifToolReader {
    async fn read_tags(&self, path: &Path) -> Result<MediaTags, MetadataError> {
        let fail = |reason: String| MetadataError {
            path: path.to_path_buf(),
            reason,
        };

        let mut command = tokio::process::Command::new(&self.program);
        command
            .arg("-json")
            .arg(format!("-{ORIGINAL_TAG}"))
            .arg(format!("-{CREATE_TAG}"))
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| fail(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| fail(format!("failed to launch {}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(fail(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_exiftool_json(&output.stdout).map_err(fail)
    }
}

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Which remote pages count as library items (section `[library]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Host serving the library (e.g. `photos.google.com`).
    pub host: String,
    /// Path segment that precedes an item id (`/photo/<id>`).
    pub item_segment: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            host: "photos.google.com".to_string(),
            item_segment: "photo".to_string(),
        }
    }
}

/// Step retry policy (section `[retry]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first failed attempt before the run is aborted.
    pub max_retries: u32,
    /// Fixed delay between attempts, in seconds.
    pub backoff_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_secs: 1.0,
        }
    }
}

/// Timeouts in seconds (section `[timeouts]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Browser-driven waits: step to previous item, jump to newest, goto.
    pub navigation_secs: u64,
    /// Wait between the download gesture and the download-started event.
    pub download_start_secs: u64,
    /// One invocation of the external transfer utility.
    pub transfer_secs: u64,
    /// One invocation of the external metadata utility.
    pub metadata_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation_secs: 30,
            download_start_secs: 30,
            transfer_secs: 300,
            metadata_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn navigation(&self) -> Duration {
        Duration::from_secs(self.navigation_secs)
    }

    pub fn download_start(&self) -> Duration {
        Duration::from_secs(self.download_start_secs)
    }

    pub fn transfer(&self) -> Duration {
        Duration::from_secs(self.transfer_secs)
    }

    pub fn metadata(&self) -> Duration {
        Duration::from_secs(self.metadata_secs)
    }
}

/// External transfer utility invocation (section `[transfer]`).
///
/// `{url}` and `{dir}` in `args` are substituted per download; every request
/// header is passed as `header_flag` followed by `Name: value`, ahead of `args`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub program: String,
    pub args: Vec<String>,
    pub header_flag: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            program: "curl".to_string(),
            args: [
                "--fail",
                "--location",
                "--silent",
                "--show-error",
                "--remote-name",
                "--remote-header-name",
                "--output-dir",
                "{dir}",
                "{url}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            header_flag: "-H".to_string(),
        }
    }
}

/// External metadata utility (section `[metadata]`). Must understand exiftool's `-json` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub program: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            program: "exiftool".to_string(),
        }
    }
}

/// Page automation driver process (section `[automation]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            program: "archivist-driver".to_string(),
            args: Vec::new(),
        }
    }
}

/// Global configuration loaded from `~/.config/archivist/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchivistConfig {
    /// Root of the `<year>/<month>/<file>` archive.
    pub archive_root: PathBuf,
    /// Checkpoint file; defaults to `~/.local/state/archivist/lastdone`.
    pub checkpoint_path: Option<PathBuf>,
    /// Starting locator used when no checkpoint exists yet.
    pub seed: Option<String>,
    /// Job slots: transfers running at once.
    pub max_active_jobs: usize,
    /// Pending intents held before traversal is suspended.
    pub queue_capacity: usize,
    /// Maximum length in bytes of a final destination path.
    pub path_limit: usize,
    pub library: LibraryConfig,
    pub retry: RetryConfig,
    pub timeouts: TimeoutConfig,
    pub transfer: TransferConfig,
    pub metadata: MetadataConfig,
    pub automation: AutomationConfig,
}

impl Default for ArchivistConfig {
    fn default() -> Self {
        Self {
            archive_root: PathBuf::from("download"),
            checkpoint_path: None,
            seed: None,
            max_active_jobs: 10,
            queue_capacity: 15,
            path_limit: 225,
            library: LibraryConfig::default(),
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            transfer: TransferConfig::default(),
            metadata: MetadataConfig::default(),
            automation: AutomationConfig::default(),
        }
    }
}

impl ArchivistConfig {
    /// Effective checkpoint file path.
    pub fn checkpoint_path(&self) -> Result<PathBuf> {
        match &self.checkpoint_path {
            Some(p) => Ok(p.clone()),
            None => default_checkpoint_path(),
        }
    }

    /// Staging area for in-progress transfers; lives under the archive root so
    /// the final move is a same-filesystem rename.
    pub fn staging_dir(&self) -> PathBuf {
        self.archive_root.join(".staging")
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("archivist")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Default checkpoint location: `~/.local/state/archivist/lastdone`.
pub fn default_checkpoint_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("archivist")?;
    Ok(xdg_dirs.get_state_home().join("lastdone"))
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ArchivistConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ArchivistConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: ArchivistConfig = toml::from_str(&data)?;
    Ok(cfg)
}

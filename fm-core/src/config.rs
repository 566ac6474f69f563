//! src/config.rs
//! ============================================================================
//! # Config: Tunables for Scanning, Search, Transfers and Logging
//!
//! Loads and saves settings as TOML from the platform config directory
//! resolved through [`directories`](https://docs.rs/directories). Every
//! section has defaults, so a partial file is accepted.
//!
//! ## Example
//! ```rust,ignore
//! let config = Config::load().await?;
//! config.save().await?;
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use tokio::fs as TokioFs;

use crate::logging::LoggerConfig;

/// Directory scanning and rescan timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Entries delivered per scanner batch
    pub batch_size: usize,

    /// Delay of `rescan_soon`
    #[serde(with = "humantime_serde")]
    pub rescan_soon_delay: Duration,

    /// Delay of `rescan_later` and of the automatic retry after a failure
    #[serde(with = "humantime_serde")]
    pub rescan_later_delay: Duration,

    /// Window during which watcher notifications collapse into one rescan
    #[serde(with = "humantime_serde")]
    pub watcher_aggregate_delay: Duration,

    /// Automatic retries after a failed scan
    pub max_scan_retries: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            rescan_soon_delay: Duration::from_millis(100),
            rescan_later_delay: Duration::from_millis(500),
            watcher_aggregate_delay: Duration::from_millis(500),
            max_scan_retries: 1,
        }
    }
}

/// Search and recent-files limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,

    pub recent_max_results: usize,

    /// Files modified earlier than this are not listed under Recent
    pub recent_cutoff_days: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 100,
            recent_max_results: 30,
            recent_cutoff_days: 30,
        }
    }
}

/// Drag, drop and clipboard behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Hovering a folder this long during a drag navigates into it
    #[serde(with = "humantime_serde")]
    pub hover_navigation_delay: Duration,

    /// Prefix of the keys the drag session mirrors into the local store
    pub app_id: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            hover_navigation_delay: Duration::from_millis(2000),
            app_id: "files".to_string(),
        }
    }
}

/// Runtime feature switches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Drive keeps pin state itself; disables hosted pin polling
    pub drive_bulk_pinning: bool,

    /// Hosted (cloud-native) documents may be pinned for offline use
    pub hosted_file_pinning: bool,

    /// Consult the data-loss-prevention policy before transfers
    pub dlp_restrictions: bool,

    pub trash: bool,

    pub show_hidden: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            drive_bulk_pinning: false,
            hosted_file_pinning: true,
            dlp_restrictions: true,
            trash: true,
            show_hidden: false,
        }
    }
}

/// Metadata cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries
    pub max_capacity: u64,

    /// Time-to-live for entries
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Time-to-idle (evict if not accessed)
    #[serde(with = "humantime_serde")]
    pub tti: Duration,

    pub enable_stats: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 16_384,
            ttl: Duration::from_secs(1800),
            tti: Duration::from_secs(600),
            enable_stats: true,
        }
    }
}

/// Main configuration struct for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub features: FeatureFlags,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggerConfig,
}

impl Config {
    /// Loads config from the platform config dir, creating it with defaults
    /// when missing.
    pub async fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?).await
    }

    pub async fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            info!("Loading config from {}", path.display());
            let text = TokioFs::read_to_string(path).await?;
            let cfg: Self = toml::from_str(&text)?;

            Ok(cfg)
        } else {
            info!(
                "No config file found at {}, using default configuration. Creating it now.",
                path.display()
            );

            let default_config = Self::default();
            default_config.save_to(path).await?;

            Ok(default_config)
        }
    }

    pub async fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?).await
    }

    pub async fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        info!("Saving config to {}", path.display());

        if let Some(parent) = path.parent() {
            TokioFs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        TokioFs::write(path, toml_str).await?;

        Ok(())
    }

    /// Returns the canonical config file path using `directories::ProjectDirs`.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        let proj = ProjectDirs::from("org", "fm", "FileManager")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(proj.config_dir().join("config.toml"))
    }

    /// Directory for log files and persisted session state.
    pub fn data_dir() -> anyhow::Result<PathBuf> {
        let proj = ProjectDirs::from("org", "fm", "FileManager")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

        Ok(proj.data_local_dir().to_path_buf())
    }
}

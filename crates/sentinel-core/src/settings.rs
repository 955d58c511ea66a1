use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use crate::error::{Result, SentinelError};
use crate::models::OperatorId;

/// Name of the per-user state directory under `$HOME`.
pub const APP_DIR: &str = ".keyword-sentinel";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Watch chat sources for keywords and alert operators
#[derive(Parser, Debug, Clone)]
#[command(
    name = "keyword-sentinel",
    about = "Watch chat sources for keywords and alert operators",
    version
)]
pub struct Settings {
    /// Operator id that always receives notifications and can never be removed
    #[arg(long, env = "SENTINEL_ADMIN_ID")]
    pub primary_operator: OperatorId,

    /// Store file (defaults to ~/.keyword-sentinel/data.json)
    #[arg(long, env = "SENTINEL_DATA_FILE")]
    pub data_file: Option<PathBuf>,

    /// Directory of exported chats, one <source_id>.jsonl per source
    #[arg(long, env = "SENTINEL_ARCHIVE_DIR")]
    pub archive_dir: Option<PathBuf>,

    /// File notifications are appended to, one JSON object per line
    #[arg(long, env = "SENTINEL_OUTBOX")]
    pub outbox: Option<PathBuf>,

    /// Messages requested per history page (1-100)
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u32).range(1..=100))]
    pub page_size: u32,

    /// Maximum messages scanned per source backfill
    #[arg(long, default_value = "5000", value_parser = clap::value_parser!(u64).range(1..))]
    pub history_limit: u64,

    /// Pause between history pages, in seconds
    #[arg(long, default_value = "1.0")]
    pub batch_delay: f64,

    /// Backfills allowed to run at the same time (1-64)
    #[arg(long, default_value = "4", value_parser = clap::value_parser!(u32).range(1..=64))]
    pub max_concurrent_backfills: u32,

    /// Archive poll interval for new messages, in seconds (1-60)
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u64).range(1..=60))]
    pub poll_interval: u64,

    /// Launch a backfill for every source that has not been scanned yet
    #[arg(long)]
    pub backfill_pending: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Pagination parameters for one backfill run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillConfig {
    /// Messages requested per page.
    pub page_size: usize,
    /// Ceiling on messages scanned per run.
    pub history_limit: u64,
    /// Pause between consecutive pages.
    pub batch_delay: Duration,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            history_limit: 5000,
            batch_delay: Duration::from_secs(1),
        }
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse the process arguments and apply `--debug`.
    ///
    /// `--help`, `--version` and malformed arguments exit the process the
    /// way clap does.
    pub fn load() -> Result<Self> {
        Settings::parse().finish()
    }

    /// Same as [`Settings::load`] with an explicit argument list; parse
    /// errors are returned instead of exiting.
    pub fn load_from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Settings::try_parse_from(args)
            .map_err(|e| SentinelError::Config(e.to_string()))?
            .finish()
    }

    fn finish(mut self) -> Result<Self> {
        self.validate()?;
        if self.debug {
            self.log_level = "DEBUG".to_string();
        }
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        batch_delay(self.batch_delay)?;
        Ok(())
    }

    pub fn backfill_config(&self) -> BackfillConfig {
        BackfillConfig {
            page_size: self.page_size as usize,
            history_limit: self.history_limit,
            // Checked by `validate` when the settings were loaded.
            batch_delay: batch_delay(self.batch_delay).unwrap_or_default(),
        }
    }

    pub fn data_file(&self) -> PathBuf {
        self.data_file
            .clone()
            .unwrap_or_else(|| app_dir().join("data.json"))
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| app_dir().join("archive"))
    }

    pub fn outbox(&self) -> PathBuf {
        self.outbox
            .clone()
            .unwrap_or_else(|| app_dir().join("outbox.jsonl"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

fn batch_delay(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        SentinelError::Config(format!(
            "batch delay must be a non-negative number of seconds, got {}",
            secs
        ))
    })
}

/// `~/.keyword-sentinel`, or `./.keyword-sentinel` when there is no home dir.
pub fn app_dir() -> PathBuf {
    app_dir_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
}

/// The state directory rooted at `base_dir`.
pub fn app_dir_in(base_dir: &Path) -> PathBuf {
    base_dir.join(APP_DIR)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::retention::RetentionPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub revisions: RevisionConfig,
    #[serde(default)]
    pub trash: TrashConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory path
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionConfig {
    /// Master switch for revision retention cleanup
    #[serde(default = "default_true")]
    pub cleanup_enabled: bool,
    /// Number of most recent revisions always kept
    #[serde(default = "default_keep_recent")]
    pub keep_recent: u32,
    /// Months (30-day) of one-per-month history
    #[serde(default = "default_keep_monthly")]
    pub keep_monthly: u32,
    /// Years (365-day) of one-per-year history
    #[serde(default = "default_keep_yearly")]
    pub keep_yearly: u32,
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            cleanup_enabled: default_true(),
            keep_recent: default_keep_recent(),
            keep_monthly: default_keep_monthly(),
            keep_yearly: default_keep_yearly(),
        }
    }
}

impl RevisionConfig {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            keep_recent: self.keep_recent,
            keep_monthly: self.keep_monthly,
            keep_yearly: self.keep_yearly,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashConfig {
    /// Master switch for automatic trash purging
    #[serde(default = "default_true")]
    pub auto_delete_enabled: bool,
    /// Days an item stays in the trash before it is purged
    #[serde(default = "default_trash_retention_days")]
    pub retention_days: u32,
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self {
            auto_delete_enabled: default_true(),
            retention_days: default_trash_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Seconds between scheduled cleanup runs in daemon mode
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Rows fetched per page when walking items or trash candidates
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Lease duration of the cleanup lock; a crashed run frees it after this
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            batch_size: default_batch_size(),
            lock_ttl_secs: default_lock_ttl(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("folio")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_keep_recent() -> u32 {
    5
}

fn default_keep_monthly() -> u32 {
    12
}

fn default_keep_yearly() -> u32 {
    3
}

fn default_trash_retention_days() -> u32 {
    30
}

fn default_interval() -> u64 {
    3600 // 1 hour
}

fn default_batch_size() -> u32 {
    500
}

fn default_lock_ttl() -> u64 {
    1800 // 30 minutes
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &std::path::Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

/// Parse a boolean environment value
fn parse_bool(name: &str, raw: &str) -> crate::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(crate::Error::Config(format!(
            "{} must be a boolean (true/false), got '{}'",
            name, raw
        ))),
    }
}

/// Parse a non-negative integer environment value
fn parse_u32(name: &str, raw: &str) -> crate::Result<u32> {
    raw.trim().parse::<u32>().map_err(|_| {
        crate::Error::Config(format!(
            "{} must be a non-negative integer, got '{}'",
            name, raw
        ))
    })
}

impl AppConfig {
    /// Load configuration from file (or defaults), then apply environment overrides
    pub fn load() -> crate::Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Apply the cleanup environment variables on top of the file values.
    ///
    /// Empty values are treated as unset. Malformed values are rejected
    /// instead of silently falling back to a default.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("REVISION_CLEANUP_ENABLED") {
            self.revisions.cleanup_enabled = parse_bool("REVISION_CLEANUP_ENABLED", &v)?;
        }
        if let Some(v) = get("REVISION_KEEP_RECENT") {
            self.revisions.keep_recent = parse_u32("REVISION_KEEP_RECENT", &v)?;
        }
        if let Some(v) = get("REVISION_KEEP_MONTHLY") {
            self.revisions.keep_monthly = parse_u32("REVISION_KEEP_MONTHLY", &v)?;
        }
        if let Some(v) = get("REVISION_KEEP_YEARLY") {
            self.revisions.keep_yearly = parse_u32("REVISION_KEEP_YEARLY", &v)?;
        }
        if let Some(v) = get("TRASH_AUTO_DELETE_ENABLED") {
            self.trash.auto_delete_enabled = parse_bool("TRASH_AUTO_DELETE_ENABLED", &v)?;
        }
        if let Some(v) = get("TRASH_RETENTION_DAYS") {
            self.trash.retention_days = parse_u32("TRASH_RETENTION_DAYS", &v)?;
        }
        if let Some(v) = get("FOLIO_DATA_DIR") {
            self.general.data_dir = PathBuf::from(v.trim());
        }

        Ok(())
    }

    /// Reject values that would stall the scheduler or the batch cursors
    pub fn validate(&self) -> crate::Result<()> {
        if self.maintenance.batch_size == 0 {
            return Err(crate::Error::Config(
                "maintenance.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.maintenance.interval_secs == 0 {
            return Err(crate::Error::Config(
                "maintenance.interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the configuration file path
    /// Uses FOLIO_CONFIG when set, otherwise ~/.config/folio/config.toml
    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os("FOLIO_CONFIG") {
            return expand_tilde(&PathBuf::from(path));
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("folio")
            .join("config.toml")
    }

    /// Get the database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("folio.db")
    }

    /// Get the PID file path used by the daemon
    pub fn pid_path(&self) -> PathBuf {
        self.data_dir().join("folio-daemon.pid")
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }

    /// True when at least one cleanup task would do work
    pub fn any_cleanup_enabled(&self) -> bool {
        self.revisions.cleanup_enabled || self.trash.auto_delete_enabled
    }
}

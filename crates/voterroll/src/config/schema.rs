use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    /// SQLite file. Defaults to `~/.voterroll/data/voterroll.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_upload_directory")]
    pub upload_directory: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_upload_directory() -> PathBuf {
    PathBuf::from("uploads").join("pdf_queue")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            database_path: None,
            upload_directory: default_upload_directory(),
            server: ServerConfig::default(),
            ocr: OcrConfig::default(),
            queue: QueueConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Configured database path, falling back to the per-user default.
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
            .unwrap_or_else(|| PathBuf::from("voterroll.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for one multipart intake request.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> usize {
    200 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// How the external OCR worker is launched.
///
/// The worker is run as `program args... <file> [start] [end]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_program")]
    pub program: String,
    #[serde(default = "default_ocr_args")]
    pub args: Vec<String>,
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_ocr_program() -> String {
    "python3".to_string()
}

fn default_ocr_args() -> Vec<String> {
    vec!["scripts/box_parser.py".to_string()]
}

fn default_ocr_timeout_secs() -> u64 {
    900
}

fn default_max_output_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            program: default_ocr_program(),
            args: default_ocr_args(),
            timeout_secs: default_ocr_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How often a running job refreshes its claim.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Period of the background recovery scan.
    #[serde(default = "default_recovery_interval_secs")]
    pub recovery_interval_secs: u64,
    /// Age after which another instance's claim counts as orphaned.
    /// Must exceed the heartbeat so a live job never looks abandoned.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default)]
    pub retain_completed_files: bool,
    /// Hours a FAILED job's document is kept for retries. Zero keeps it forever.
    #[serde(default = "default_failed_retention_hours")]
    pub failed_retention_hours: u64,
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_recovery_interval_secs() -> u64 {
    60
}

fn default_stale_after_secs() -> u64 {
    30 * 60
}

fn default_failed_retention_hours() -> u64 {
    72
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            recovery_interval_secs: default_recovery_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            retain_completed_files: false,
            failed_retention_hours: default_failed_retention_hours(),
        }
    }
}

impl QueueConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn failed_retention(&self) -> Option<Duration> {
        (self.failed_retention_hours > 0)
            .then(|| Duration::from_secs(self.failed_retention_hours * 3600))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

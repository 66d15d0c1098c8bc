//! Runtime configuration.
//!
//! Resolved from `MODELSYNC_*` environment variables over built-in defaults.
//! The log directory falls back to `~/.modelsync/logs`.

use std::path::PathBuf;
use std::str::FromStr;

use modelsync_codec::DEFAULT_QUALITY;
use tracing::warn;

pub const DEFAULT_FILE_NAME: &str = "graph.problem";

/// Output format of the log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of undo steps kept per document
    pub history_depth: usize,
    /// Capacity of the session actor command channel
    pub command_capacity: usize,
    /// Capacity of the session event broadcast channel
    pub event_capacity: usize,
    /// Brotli quality (0-11) used by the codec worker
    pub compression_quality: u32,
    /// Produce a compressed copy of the text after every content change
    pub compress_on_change: bool,
    /// Suggested name for "save as" when the document has no file yet
    pub default_file_name: String,
    pub log_dir: PathBuf,
    pub log_filter: Option<String>,
    pub log_format: LogFormat,
    pub truncate_log_on_start: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            history_depth: 100,
            command_capacity: 256,
            event_capacity: 256,
            compression_quality: DEFAULT_QUALITY,
            compress_on_change: true,
            default_file_name: DEFAULT_FILE_NAME.to_string(),
            log_dir: default_log_dir(),
            log_filter: None,
            log_format: LogFormat::Json,
            truncate_log_on_start: false,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by whatever `MODELSYNC_*` variables are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(depth) = parse_var(&lookup, "MODELSYNC_HISTORY_DEPTH") {
            config.history_depth = depth;
        }
        if let Some(capacity) = parse_var(&lookup, "MODELSYNC_COMMAND_CAPACITY") {
            config.command_capacity = capacity;
        }
        if let Some(capacity) = parse_var(&lookup, "MODELSYNC_EVENT_CAPACITY") {
            config.event_capacity = capacity;
        }
        if let Some(quality) = parse_var::<u32>(&lookup, "MODELSYNC_COMPRESSION_QUALITY") {
            config.compression_quality = quality.min(11);
        }
        if let Some(value) = parse_var(&lookup, "MODELSYNC_COMPRESS_ON_CHANGE") {
            config.compress_on_change = value;
        }
        if let Some(name) = lookup("MODELSYNC_DEFAULT_FILE_NAME").filter(|n| !n.is_empty()) {
            config.default_file_name = name;
        }
        if let Some(dir) = lookup("MODELSYNC_LOG_DIR").filter(|d| !d.is_empty()) {
            config.log_dir = PathBuf::from(dir);
        }
        config.log_filter = lookup("MODELSYNC_LOG_FILTER").or_else(|| lookup("RUST_LOG"));
        if let Some(format) = lookup("MODELSYNC_LOG_FORMAT") {
            config.log_format = if format.eq_ignore_ascii_case("pretty") {
                LogFormat::Pretty
            } else {
                LogFormat::Json
            };
        }
        config.truncate_log_on_start =
            lookup("MODELSYNC_TRUNCATE_LOG_ON_START").as_deref() == Some("1");

        // Zero-capacity channels panic in tokio.
        config.command_capacity = config.command_capacity.max(1);
        config.event_capacity = config.event_capacity.max(1);
        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(
                component = "config",
                event = "config.invalid_value",
                key,
                value = %raw,
                "Ignoring unparseable configuration value"
            );
            None
        }
    }
}

fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".modelsync")
        .join("logs")
}

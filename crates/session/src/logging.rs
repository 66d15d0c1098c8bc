use std::fmt::Display;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, SyncConfig};

const DEFAULT_FILTER: &str = "info";
const LOG_FILE: &str = "modelsync.log";

pub struct LoggingHandle {
    pub run_id: String,
    pub guard: WorkerGuard,
}

pub fn init_logging(config: &SyncConfig) -> anyhow::Result<LoggingHandle> {
    let log_dir = &config.log_dir;
    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(LOG_FILE);

    if config.truncate_log_on_start {
        let _ = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&log_path)?;
    }

    let filter = config
        .log_filter
        .as_deref()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()?,
    }

    let run_id = std::env::var("MODELSYNC_RUN_ID").unwrap_or_else(|_| {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("pid-{}-{}", std::process::id(), now)
    });

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        log_path = %log_path.display(),
        format = ?config.log_format,
        filter = config.log_filter.as_deref().unwrap_or(DEFAULT_FILTER),
        run_id = %run_id,
    );

    Ok(LoggingHandle { run_id, guard })
}

/// Sink for failures of fire-and-forget work (backend sends, storage calls,
/// codec round-trips). Nothing is thrown back to the caller; everything lands
/// here with the same structured shape.
pub fn report_failure(component: &'static str, event: &'static str, error: &dyn Display) {
    tracing::error!(
        component,
        event,
        error = %error,
        "Background operation failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    // The only test in this crate that installs a global subscriber.
    #[test]
    fn json_log_lands_in_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig {
            log_dir: dir.path().join("logs"),
            log_format: LogFormat::Json,
            log_filter: Some("info".to_string()),
            truncate_log_on_start: true,
            ..SyncConfig::default()
        };

        let handle = init_logging(&config).unwrap();
        assert!(!handle.run_id.is_empty());
        report_failure("logging_test", "logging.test_failure", &"disk on fire");
        tracing::debug!(component = "logging_test", "filtered out");
        // Dropping the guard flushes the background writer.
        drop(handle);

        let contents = std::fs::read_to_string(dir.path().join("logs").join(LOG_FILE)).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert!(lines
            .iter()
            .any(|line| line["event"] == "logging.initialized" && line["component"] == "logging"));
        assert!(lines.iter().any(|line| {
            line["event"] == "logging.test_failure" && line["error"] == "disk on fire"
        }));
        assert!(!contents.contains("filtered out"));
    }
}

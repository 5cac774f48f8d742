//! Logging Infrastructure
//!
//! Structured logging for development and production:
//! - Console output, pretty or JSON
//! - Daily rotating application logs (deleted after 14 days)
//! - Daily rotating sync logs: every event with target `sync`
//!   (cross-tab messages sent, applied, skipped)

use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, prelude::*};

/// Days a rotated log file is kept
const LOG_RETENTION_DAYS: i64 = 14;

/// Tracing target used for cross-tab traffic
pub const SYNC_TARGET: &str = "sync";

/// Clean up rotated log files older than the retention window
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<()> {
    use chrono::{Local, TimeZone};

    let cutoff = Local::now() - chrono::Duration::days(LOG_RETENTION_DAYS);

    for (sub_dir, prefix) in [("app", "app."), ("sync", "sync.")] {
        let dir = log_dir.join(sub_dir);
        if !dir.exists() {
            continue;
        }

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            // tracing-appender daily files are named `<prefix>YYYY-MM-DD`
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(date_part) = name.strip_prefix(prefix) else {
                continue;
            };
            let Ok(naive_date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
                continue;
            };

            if let Some(local_datetime) = naive_date
                .and_hms_opt(0, 0, 0)
                .and_then(|dt| Local.from_local_datetime(&dt).single())
                && local_datetime < cutoff
            {
                fs::remove_file(&path)?;
                tracing::info!(file = %name, "Deleted old log file");
            }
        }
    }

    Ok(())
}

/// Initialize the logging system with daily rotating logs
///
/// # Arguments
/// * `level` - Log level (e.g., "info", "debug", "warn")
/// * `json_format` - JSON output (production) or pretty output (development)
/// * `log_dir` - Optional directory for file logging (e.g., Some("./work_dir/logs"))
///
/// # Examples
/// ```no_run
/// # fn main() -> anyhow::Result<()> {
/// // Development setup (console only)
/// catalog_sync::init_logger_with_file("debug", false, None)?;
/// # Ok(())
/// # }
/// ```
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    let console_layer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(EnvFilter::new(level))
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .with_filter(EnvFilter::new(level))
            .boxed()
    };

    let Some(dir) = log_dir else {
        subscriber.with(console_layer).try_init()?;
        return Ok(());
    };

    let log_dir = Path::new(dir);
    let app_log_dir = log_dir.join("app");
    let sync_log_dir = log_dir.join("sync");
    fs::create_dir_all(&app_log_dir)?;
    fs::create_dir_all(&sync_log_dir)?;

    // Application logs: everything except sync traffic
    let app_log = RollingFileAppender::new(Rotation::DAILY, app_log_dir, "app");
    let app_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(app_log))
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target() != SYNC_TARGET
        }));

    // Sync logs: only target "sync"
    let sync_log = RollingFileAppender::new(Rotation::DAILY, sync_log_dir, "sync");
    let sync_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(sync_log))
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target() == SYNC_TARGET
        }));

    // Only spawn the cleanup task when a runtime is around
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(periodic_cleanup(log_dir.to_path_buf()));
    }

    subscriber
        .with(console_layer)
        .with(app_layer)
        .with(sync_layer)
        .try_init()?;

    Ok(())
}

/// Periodic cleanup task - runs every hour to clean old logs
async fn periodic_cleanup(log_dir: PathBuf) {
    use tokio::time::{Duration, sleep};

    loop {
        sleep(Duration::from_secs(3600)).await;

        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

/// Initialize the logging system (console only)
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

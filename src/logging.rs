use chrono::{Local, NaiveDate};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "kb-rag";
const ARCHIVE_RETENTION_DAYS: i64 = 30;

/// Initialize console and daily-rolling file logging under `log_dir`.
///
/// Logs from earlier days are moved to `log_dir/archive` first. Keep the
/// returned guard alive for as long as logs should reach the file.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    let archive_dir = log_dir.join("archive");

    fs::create_dir_all(log_dir)?;
    fs::create_dir_all(&archive_dir)?;

    let today = Local::now().naive_local().date();
    archive_old_logs(log_dir, &archive_dir, today)?;

    let file_appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(log_dir)
        .map_err(|e| format!("Failed to create rolling file appender: {}", e))?;
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    // Console output is kept short: message only
    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_level(false)
        .with_ansi(true)
        .without_time();

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(non_blocking_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kb_rag=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(log_dir = %log_dir.display(), "Logging system initialized");

    if let Err(e) = remove_archives_before(&archive_dir, today - chrono::Duration::days(ARCHIVE_RETENTION_DAYS)) {
        tracing::warn!("Failed to cleanup old log archives during init: {}", e);
    }

    Ok(guard)
}

/// Move logs dated before `today` into the archive directory.
fn archive_old_logs(log_dir: &Path, archive_dir: &Path, today: NaiveDate) -> io::Result<()> {
    if !log_dir.exists() {
        return Ok(());
    }

    for path in dated_log_files(log_dir, |date| date < today)? {
        let Some(file_name) = path.file_name() else { continue };
        let archive_path = archive_dir.join(file_name);
        match fs::rename(&path, &archive_path) {
            Ok(_) => tracing::info!("Archived log file: {} -> {}", path.display(), archive_path.display()),
            Err(e) => tracing::warn!("Failed to archive log file {}: {}", path.display(), e),
        }
    }

    Ok(())
}

/// Delete archived logs dated before `cutoff`.
fn remove_archives_before(archive_dir: &Path, cutoff: NaiveDate) -> io::Result<()> {
    if !archive_dir.exists() {
        return Ok(());
    }

    for path in dated_log_files(archive_dir, |date| date < cutoff)? {
        match fs::remove_file(&path) {
            Ok(_) => tracing::info!("Removed old archived log: {}", path.display()),
            Err(e) => tracing::warn!("Failed to remove old archived log {}: {}", path.display(), e),
        }
    }

    Ok(())
}

/// Log files in `dir` whose file-name date satisfies `keep`.
fn dated_log_files(dir: &Path, keep: impl Fn(NaiveDate) -> bool) -> io::Result<Vec<PathBuf>> {
    let mut matches = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().map_or(true, |ext| ext != "log") {
            continue;
        }

        let file_name = path.file_name().and_then(|name| name.to_str()).unwrap_or_default();
        let date = extract_date_from_filename(file_name)
            .and_then(|date_str| NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").ok());
        if date.is_some_and(&keep) {
            matches.push(path);
        }
    }
    Ok(matches)
}

/// Extract date from log filename
fn extract_date_from_filename(filename: &str) -> Option<String> {
    // Expected format: kb-rag.2024-01-01.log
    let parts: Vec<&str> = filename.split('.').collect();
    if parts.len() >= 3 && parts[0] == LOG_FILE_PREFIX {
        let date_part = parts[1];
        if date_part.len() == 10 && date_part.matches('-').count() == 2 {
            return Some(date_part.to_string());
        }
    }
    None
}

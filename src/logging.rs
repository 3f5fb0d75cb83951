//! Tracing setup for the `simpair` binary.
//!
//! Events go to the systemd journal when one is reachable and to a
//! daily-rolling file otherwise. Stdout is left alone: the command-line
//! front end prints its JSON there.

use anyhow::{anyhow, Context};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the file writer thread alive until the process exits.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where log files go when no directory is given.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("simpair")
        .join("logs")
}

/// Install the global subscriber.
///
/// `SIMPAIR_LOG` takes an `EnvFilter` directive such as `debug` or
/// `simpair::selection=trace`; the default is `info`. Fails if a subscriber
/// is already installed.
pub fn init(log_dir: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("SIMPAIR_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(target_os = "linux")]
    if let Ok(journal) = tracing_journald::layer() {
        tracing_subscriber::registry()
            .with(filter)
            .with(journal.with_syslog_identifier("simpair".to_string()))
            .try_init()
            .map_err(|e| anyhow!("Failed to install journald subscriber: {}", e))?;
        tracing::debug!("Logging to journald");
        return Ok(());
    }

    let dir = log_dir.map(Path::to_path_buf).unwrap_or_else(default_log_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, "simpair.log"));
    let _ = FILE_GUARD.set(guard);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(|e| anyhow!("Failed to install file subscriber: {}", e))?;

    tracing::debug!(path = %dir.display(), "Logging to file");
    Ok(())
}

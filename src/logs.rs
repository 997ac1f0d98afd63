//! This module defines the logging facilities, using tracing and tracing-subscriber.
//!
//! Diagnostics are displayed on stderr and written to log files. By default, only the log files
//! of the last 15 runs will be kept. The status lines of the commands themselves (`RUN: ...`) are
//! regular program output on stdout and do not go through here.

use chrono::Local;
use color_eyre::Result;
use color_eyre::eyre::{OptionExt, WrapErr};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Logs each line of captured command output.
///
/// * `$output` - Captured bytes (stdout or stderr)
/// * `$stream` - Name of the stream used as prefix
/// * `$cmd` - Command the output belongs to
/// * `$level` - tracing macro to log with (`info`, `debug`, ...)
macro_rules! log_output {
    ($output:expr, $stream:expr, $cmd:expr, $level:ident) => {
        if !$output.is_empty() {
            for line in String::from_utf8_lossy(&$output).lines() {
                tracing::$level!("{} [{}]: {}", $cmd, $stream, line);
            }
        }
    };
}
pub(crate) use log_output;

#[derive(Debug)]
pub(crate) struct LoggerBuilder {
    verbosity: u8,
    log_dir: Option<PathBuf>,
    max_logs: usize,
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self {
            verbosity: 0,
            log_dir: None,
            max_logs: 15,
        }
    }
}

impl LoggerBuilder {
    /// Verbosity of the terminal output (0 = info, 1 = debug, 2 = trace)
    pub(crate) fn with_verbosity(&mut self, verbosity: u8) -> &mut Self {
        let new = self;
        new.verbosity = verbosity;
        new
    }

    pub(crate) fn with_log_dir<P: AsRef<Path>>(&mut self, log_dir: P) -> &mut Self {
        let new = self;
        new.log_dir = Some(log_dir.as_ref().to_path_buf());
        new
    }

    pub(crate) fn with_max_logs(&mut self, max_logs: usize) -> &mut Self {
        let new = self;
        new.max_logs = max_logs;
        new
    }

    /// Resolves the log directory.
    ///
    /// Without an explicit directory the default one is used. If that cannot be determined (no
    /// home directory), logging goes to the terminal only.
    pub(crate) fn build(&self) -> Result<Logger> {
        let log_dir = match self.log_dir {
            Some(ref dir) => Some(dir.clone()),
            None => get_default_log_dir().ok(),
        };

        Ok(Logger {
            verbosity: self.verbosity,
            log_dir,
            max_logs: self.max_logs.max(1),
        })
    }
}

#[derive(Debug)]
pub(crate) struct Logger {
    verbosity: u8,
    log_dir: Option<PathBuf>,
    max_logs: usize,
}

impl Logger {
    /// Installs the global subscriber.
    ///
    /// The returned guard flushes the file writer on drop and must be kept alive until the end of
    /// `main`. When no log file can be opened, the file layer is skipped with a warning and no
    /// guard is returned.
    pub(crate) fn start(&self) -> Result<Option<WorkerGuard>> {
        let (file_writer, guard, file_error) = match self.open_log_file() {
            Ok((writer, guard)) => (Some(writer), Some(guard), None),
            Err(e) => (None, None, Some(e)),
        };

        let terminal_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(self.verbosity > 0)
            .with_timer(ChronoLocal::new("%H:%M:%S".to_string()))
            .with_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(directive(self.verbosity))),
            );

        let file_layer = file_writer.map(|writer| {
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(ChronoLocal::rfc_3339())
                .with_filter(EnvFilter::new(directive(self.verbosity.max(1))))
        });

        tracing_subscriber::registry()
            .with(terminal_layer)
            .with(file_layer)
            .with(ErrorLayer::default())
            .try_init()
            .wrap_err("Failed to initialize logging")?;

        if let Some(e) = file_error {
            warn!("Logging to the terminal only: {:#}", e);
        }

        Ok(guard)
    }

    /// Creates the log directory, removes old logs and opens the log file of this run.
    fn open_log_file(&self) -> Result<(NonBlocking, WorkerGuard)> {
        let log_dir = self
            .log_dir
            .as_ref()
            .ok_or_eyre("Could not determine a log directory")?;

        fs::create_dir_all(log_dir)
            .wrap_err_with(|| format!("Failed to create log directory at {}", log_dir.display()))?;

        // Make room for the log file of this run
        rotate_logs(log_dir, self.max_logs - 1)?;

        let file_name = format!("pimcore-ops_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name)
            .build(log_dir)
            .wrap_err_with(|| format!("Failed to open log file in {}", log_dir.display()))?;
        Ok(tracing_appender::non_blocking(file_appender))
    }
}

fn directive(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    format!("pimcore_ops={}", level)
}

/// Get the directory where log files should be stored.
///
/// Uses `$XDG_DATA_HOME/pimcore-ops/logs` if available, otherwise defaults to
/// `~/.local/share/pimcore-ops/logs`
pub(crate) fn get_default_log_dir() -> Result<PathBuf> {
    Ok(dirs::data_dir()
        .ok_or_eyre("Could not determine user's data directory")?
        .join("pimcore-ops")
        .join("logs"))
}

/// Rotate log files, keeping only the `keep` most recent ones.
fn rotate_logs<P: AsRef<Path>>(log_dir: P, keep: usize) -> Result<()> {
    let mut log_files: Vec<_> = fs::read_dir(&log_dir)
        .wrap_err_with(|| format!("Failed to read log directory {:?}", log_dir.as_ref()))?
        // Filter out entries which could not be read (should be zero).
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "log"))
        .collect();

    // Sort by file name and reverse order -> newest first
    log_files.sort_by_key(|entry| entry.file_name());
    log_files.reverse();

    for old_log in log_files.iter().skip(keep) {
        fs::remove_file(old_log.path())
            .wrap_err_with(|| format!("Failed to remove old log file {:?}", old_log.path()))?;
    }

    Ok(())
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_log_rotation() -> Result<()> {
        let temp_dir = tempdir()?;
        for i in 0..10 {
            // Simulate different timestamps
            let log_file = temp_dir
                .path()
                .join(format!("pimcore-ops_20241028_21441{}.log", i));
            File::create(&log_file)?;
        }
        for i in 0..5 {
            let log_file = temp_dir
                .path()
                .join(format!("pimcore-ops_20241028_21442{}.log", i));
            File::create(&log_file)?;
        }
        File::create(temp_dir.path().join("notes.txt"))?;

        rotate_logs(temp_dir.path(), 10)?;

        let mut remaining_logs: Vec<PathBuf> = fs::read_dir(&temp_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "log"))
            .collect();
        remaining_logs.sort();

        assert_eq!(remaining_logs.len(), 10, "Should keep exactly 10 log files");
        assert_eq!(
            remaining_logs[0],
            temp_dir.path().join("pimcore-ops_20241028_214415.log"),
            "Oldest remaining file should be pimcore-ops_20241028_214415.log"
        );
        assert_eq!(
            remaining_logs[remaining_logs.len() - 1],
            temp_dir.path().join("pimcore-ops_20241028_214424.log"),
            "Newest remaining file should be pimcore-ops_20241028_214424.log"
        );
        assert!(
            temp_dir.path().join("notes.txt").exists(),
            "Files other than logs are left alone"
        );

        Ok(())
    }

    #[test]
    fn test_get_default_log_dir() -> Result<()> {
        let temp_dir = tempdir()?;

        temp_env::with_var("XDG_DATA_HOME", Some(temp_dir.path()), || -> Result<()> {
            assert_eq!(
                get_default_log_dir()?,
                temp_dir.path().join("pimcore-ops").join("logs"),
                "Should use XDG_DATA_HOME when available"
            );
            Ok(())
        })?;

        Ok(())
    }

    #[test]
    fn test_builder_defaults() -> Result<()> {
        let temp_dir = tempdir()?;
        let logger = LoggerBuilder::default()
            .with_log_dir(temp_dir.path())
            .with_max_logs(0)
            .build()?;

        assert_eq!(logger.log_dir.as_deref(), Some(temp_dir.path()));
        assert_eq!(logger.max_logs, 1, "At least the current log is kept");
        assert_eq!(directive(0), "pimcore_ops=info");
        assert_eq!(directive(5), "pimcore_ops=trace");
        Ok(())
    }

    #[test]
    fn test_unusable_log_dir_is_reported() -> Result<()> {
        let temp_dir = tempdir()?;
        let blocker = temp_dir.path().join("file");
        File::create(&blocker)?;

        let logger = LoggerBuilder::default()
            .with_log_dir(blocker.join("logs"))
            .build()?;
        let err = logger.open_log_file().unwrap_err();
        assert!(
            format!("{:?}", err).contains("Failed to create log directory"),
            "{:?}",
            err
        );

        let logger = Logger {
            verbosity: 0,
            log_dir: None,
            max_logs: 15,
        };
        assert!(logger.open_log_file().is_err());
        Ok(())
    }
}

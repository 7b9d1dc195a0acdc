// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Logger initialisation shared by both binaries
//!
//! Records are formatted as `2025-01-31 12:00:00,123 INFO message` and
//! written to stderr, optionally duplicated into a log file. The file can be
//! attached after the logger is installed, once the configuration naming it
//! has been loaded. While the controller holds the terminal in raw mode,
//! console lines end with `\r\n`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;

static RAW_CONSOLE: AtomicBool = AtomicBool::new(false);
static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

fn log_file() -> MutexGuard<'static, Option<File>> {
    LOG_FILE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Tell the logger whether the terminal is in raw mode
pub fn set_raw_console(raw: bool) {
    RAW_CONSOLE.store(raw, Ordering::SeqCst);
}

/// Log level selected by the `--verbose` and `--quiet` flags
pub fn level_from_flags(verbose: bool, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Off
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Start appending every record to `path`, replacing any previous log file
pub fn attach_log_file(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {:?}", path))?;
    *log_file() = Some(file);
    Ok(())
}

/// Console writer duplicating every record into the attached log file
struct LogTee;

impl Write for LogTee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut stderr = io::stderr().lock();
        if RAW_CONSOLE.load(Ordering::SeqCst) {
            for (i, line) in buf.split(|b| *b == b'\n').enumerate() {
                if i > 0 {
                    stderr.write_all(b"\r\n")?;
                }
                stderr.write_all(line)?;
            }
        } else {
            stderr.write_all(buf)?;
        }

        if let Some(file) = log_file().as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = log_file().as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Install the global logger.
///
/// `RUST_LOG` is honoured for per-module filters, `level` sets the default.
/// When `log_file` is given, records are appended to it as well.
pub fn init_logger(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    if let Some(path) = log_file {
        attach_log_file(path)?;
    }

    Builder::from_default_env()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} {}",
                Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(LogTee)))
        .try_init()
        .context("Failed to initialise logger")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_flags() {
        assert_eq!(level_from_flags(false, false), LevelFilter::Info);
        assert_eq!(level_from_flags(true, false), LevelFilter::Debug);
        assert_eq!(level_from_flags(true, true), LevelFilter::Off);
    }

    #[test]
    fn test_tee_copies_records_to_attached_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.log");
        let mut tee = LogTee;

        // Records written before the file is attached stay on the console
        tee.write_all(b"2025-01-01 00:00:00,000 INFO Loading config\n").unwrap();
        attach_log_file(&path).unwrap();
        tee.write_all(b"2025-01-01 00:00:00,000 INFO Level=500\n").unwrap();
        tee.flush().unwrap();
        *log_file() = None;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "2025-01-01 00:00:00,000 INFO Level=500\n");
    }
}

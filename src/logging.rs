//! Logging setup for Bdash.
//!
//! The command-line runner keeps stdout for results, so diagnostics go to
//! stderr unless a log file is requested. Verbosity follows `RUST_LOG` and
//! defaults to `info`.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Where diagnostics are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Truncated on each run.
    File(PathBuf),
}

impl LogTarget {
    /// File target at [`default_log_path`].
    pub fn default_file() -> Self {
        Self::File(default_log_path())
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber.
///
/// A log file that cannot be created falls back to stderr with a warning.
pub fn init(target: &LogTarget) {
    let file = match target {
        LogTarget::Stderr => None,
        LogTarget::File(path) => match open_log_file(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Warning: Could not open log file {}: {e}", path.display());
                None
            }
        },
    };

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());
    match file {
        Some(file) => builder.with_writer(file).with_ansi(false).init(),
        None => builder.with_writer(io::stderr).init(),
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(path)
}

/// `bdash/bdash.log` under the XDG state directory, else the config
/// directory, else the temp directory.
pub fn default_log_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::config_dir)
        .map(|dir| dir.join("bdash").join("bdash.log"))
        .unwrap_or_else(|| std::env::temp_dir().join("bdash.log"))
}

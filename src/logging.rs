// src/logging.rs
//
// tracing subscriber setup: stderr by default, or a timestamped log file
// with a stable `linkterm.log` symlink (Unix only).

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "linkterm_lib=info,linkterm=info";

/// `HH:MM:SS.mmm` local time on every line.
const TIME_FORMAT: &str = "%H:%M:%S%.3f";

const LOG_LINK_NAME: &str = "linkterm.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create log file {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialised(String),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// With `log_dir`, logs go to a new file in that directory and its path is
/// returned; otherwise they go to stderr.
pub fn init_logging(log_dir: Option<&Path>) -> Result<Option<PathBuf>, LoggingError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_target(false);

    match log_dir {
        Some(dir) => {
            let (file, path) = create_log_file(dir)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| LoggingError::AlreadyInitialised(e.to_string()))?;
            tracing::info!(path = %path.display(), "file logging started");
            Ok(Some(path))
        }
        None => {
            builder
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| LoggingError::AlreadyInitialised(e.to_string()))?;
            Ok(None)
        }
    }
}

/// Create `YYYYmmdd-HHMMSS-linkterm.log` in `dir` and point the
/// `linkterm.log` symlink at it.
pub(crate) fn create_log_file(dir: &Path) -> Result<(File, PathBuf), LoggingError> {
    std::fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let filename = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-linkterm.log")
        .to_string();
    let log_path = dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|source| LoggingError::CreateFile {
            path: log_path.clone(),
            source,
        })?;

    // Windows symlinks require elevated privileges
    #[cfg(unix)]
    {
        let symlink_path = dir.join(LOG_LINK_NAME);
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            eprintln!("[logging] Failed to create {} symlink: {}", LOG_LINK_NAME, e);
        }
    }

    Ok((file, log_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_create_log_file_in_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let (mut file, path) = create_log_file(&logs).unwrap();
        writeln!(file, "hello").unwrap();

        assert!(path.starts_with(&logs));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("-linkterm.log"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_points_at_latest_file() {
        let dir = tempfile::tempdir().unwrap();
        let (_file, path) = create_log_file(dir.path()).unwrap();
        let link = std::fs::read_link(dir.path().join(LOG_LINK_NAME)).unwrap();
        assert_eq!(link, PathBuf::from(path.file_name().unwrap()));
    }
}

//! Log records go to `debug.log` in the data directory on every run.
//!
//! The wizard draws its prompts on the terminal, so only the other
//! subcommands mirror records to stderr.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use stowage_platform::AppPaths;

#[derive(Debug, Clone, Copy)]
pub struct LogOptions {
    pub debug: bool,
    pub max_log_size: u64,
    pub echo_to_stderr: bool,
}

impl LogOptions {
    fn file_level(self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }

    fn stderr_level(self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        }
    }
}

/// Appends to the log file, reopening it when it was deleted or moved
/// away between two records.
struct LogFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl LogFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    fn with_file<T>(&self, write: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() || !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            *guard = Some(open_append(&self.path)?);
        }
        match guard.as_mut() {
            Some(file) => write(file),
            None => Err(io::Error::other("log file not available")),
        }
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(Write::flush)
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn rotated_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".1");
    PathBuf::from(name)
}

/// Move a log larger than `max_size` to `<name>.1`, replacing the previous
/// rotation. Returns where it went.
fn rotate_if_oversized(path: &Path, max_size: u64) -> Option<PathBuf> {
    let size = std::fs::metadata(path).ok()?.len();
    if size <= max_size {
        return None;
    }
    let rotated = rotated_path(path);
    std::fs::rename(path, &rotated).ok()?;
    Some(rotated)
}

/// Install the global logger. Calling it again is a no-op.
pub fn init_logging(paths: &AppPaths, options: LogOptions) {
    let log_path = paths.log_file();
    let rotated = rotate_if_oversized(&log_path, options.max_log_size);

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("stowage")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    let file_error = match LogFile::open(log_path.clone()) {
        Ok(file) => {
            loggers.push(WriteLogger::new(options.file_level(), config.clone(), file));
            None
        }
        Err(error) => Some(error),
    };
    if options.echo_to_stderr {
        loggers.push(TermLogger::new(
            options.stderr_level(),
            config,
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }

    if CombinedLogger::init(loggers).is_err() {
        return;
    }

    if let Some(rotated) = rotated {
        log::info!("Previous log moved to {}", rotated.display());
    }
    match file_error {
        Some(error) => log::warn!("Cannot write {}: {error}", log_path.display()),
        None => log::debug!("Logging to {}", log_path.display()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use simplelog::LevelFilter;

    use super::{LogFile, LogOptions, rotate_if_oversized, rotated_path};

    #[test]
    fn log_file_is_recreated_after_its_directory_is_removed() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("data").join("debug.log");
        std::fs::create_dir_all(log_path.parent().expect("log dir")).expect("log dir created");
        let mut file = LogFile::open(log_path.clone()).expect("log file should open");

        file.write_all(b"before\n").expect("first record written");
        std::fs::remove_dir_all(temp_dir.path().join("data")).expect("log dir removable");
        file.write_all(b"after\n").expect("record written after removal");
        file.flush().expect("flush succeeds");

        assert_eq!(
            std::fs::read_to_string(&log_path).expect("recreated log readable"),
            "after\n"
        );
    }

    #[test]
    fn writes_follow_a_rotation() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("debug.log");
        let mut file = LogFile::open(log_path.clone()).expect("log file should open");
        file.write_all(b"old\n").expect("first record written");

        std::fs::rename(&log_path, rotated_path(&log_path)).expect("rotated");
        file.write_all(b"new\n").expect("record written after rotation");

        assert_eq!(std::fs::read_to_string(&log_path).expect("readable"), "new\n");
    }

    #[test]
    fn oversized_log_replaces_the_previous_rotation() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("debug.log");
        let rotated = rotated_path(&log_path);
        std::fs::write(&rotated, "ancient\n").expect("old rotation written");
        std::fs::write(&log_path, "line-1\nline-2\nline-3\n").expect("log written");

        assert_eq!(rotate_if_oversized(&log_path, 10), Some(rotated.clone()));

        assert!(!log_path.exists());
        assert_eq!(
            std::fs::read_to_string(&rotated).expect("rotation readable"),
            "line-1\nline-2\nline-3\n"
        );
    }

    #[test]
    fn small_or_missing_log_is_not_rotated() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("debug.log");
        assert_eq!(rotate_if_oversized(&log_path, 10), None);

        std::fs::write(&log_path, "line-1\n").expect("log written");
        assert_eq!(rotate_if_oversized(&log_path, 1024), None);
        assert_eq!(
            std::fs::read_to_string(&log_path).expect("log readable"),
            "line-1\n"
        );
    }

    #[test]
    fn debug_flag_raises_both_levels() {
        let quiet = LogOptions {
            debug: false,
            max_log_size: 0,
            echo_to_stderr: true,
        };
        let verbose = LogOptions {
            debug: true,
            ..quiet
        };

        assert_eq!(quiet.file_level(), LevelFilter::Info);
        assert_eq!(quiet.stderr_level(), LevelFilter::Warn);
        assert_eq!(verbose.file_level(), LevelFilter::Debug);
        assert_eq!(verbose.stderr_level(), LevelFilter::Debug);
    }
}

//! Platform capabilities the isolate relies on
//!
//! Printing, diagnostic logging, reading script sources, path
//! normalization, sleeping and the wall clock. Embedders can swap the
//! whole set by passing their own [`Port`] in `CreateParams`.

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Diagnostic verbosity, from most to least important
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warning = 1,
    Debug = 2,
    Trace = 3,
}

impl LogLevel {
    fn from_u8(level: u8) -> Self {
        match level {
            0 => Self::Error,
            1 => Self::Warning,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(name)
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Error as u8);

/// Set the process-wide log level used by [`Port::log`] gating
pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Current process-wide log level
pub fn log_level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// True when messages at `level` pass the process-wide gate
pub fn log_enabled(level: LogLevel) -> bool {
    level <= log_level()
}

/// Platform capability set
pub trait Port: Send + Sync {
    /// Write text produced by the script `print` hook
    fn print(&self, text: &str);

    /// Emit a diagnostic message; callers gate on [`log_enabled`]
    fn log(&self, level: LogLevel, message: &str);

    /// Read a script source file
    fn read_source(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    /// Resolve `path` against the directory of `base` and normalize it
    fn normalize_path(&self, path: &str, base: Option<&Path>) -> PathBuf {
        normalize_path(path, base)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Milliseconds since the Unix epoch
    fn current_time_ms(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}

/// Port backed by stdout and `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPort;

impl Port for DefaultPort {
    fn print(&self, text: &str) {
        print!("{text}");
    }

    fn log(&self, level: LogLevel, message: &str) {
        if !log_enabled(level) {
            return;
        }
        match level {
            LogLevel::Error => tracing::error!(target: "qv8", "{}", message),
            LogLevel::Warning => tracing::warn!(target: "qv8", "{}", message),
            LogLevel::Debug => tracing::debug!(target: "qv8", "{}", message),
            LogLevel::Trace => tracing::trace!(target: "qv8", "{}", message),
        }
    }
}

/// Resolve a possibly relative path against the directory containing `base`
///
/// Existing paths are canonicalized. Paths that do not exist yet are
/// normalized lexically: `.` is dropped and `..` pops a component, never
/// climbing above the root of an absolute path.
pub fn normalize_path(path: &str, base: Option<&Path>) -> PathBuf {
    let path = Path::new(path);
    let joined = match base {
        Some(base) if path.is_relative() => base
            .parent()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|| path.to_path_buf()),
        _ => path.to_path_buf(),
    };

    if let Ok(canonical) = joined.canonicalize() {
        return canonical;
    }

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                // `..` above the root stays at the root
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_log_level_gate() {
        let previous = log_level();
        set_log_level(LogLevel::Warning);
        assert!(log_enabled(LogLevel::Error));
        assert!(log_enabled(LogLevel::Warning));
        assert!(!log_enabled(LogLevel::Debug));

        set_log_level(LogLevel::Trace);
        assert!(log_enabled(LogLevel::Trace));
        set_log_level(previous);
    }

    #[test]
    #[serial]
    fn test_default_level_is_error() {
        let previous = log_level();
        set_log_level(LogLevel::Error);
        assert_eq!(log_level(), LogLevel::Error);
        assert!(!log_enabled(LogLevel::Warning));
        set_log_level(previous);
    }

    #[test]
    fn test_read_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"print('hi')").unwrap();

        let source = DefaultPort.read_source(file.path()).unwrap();
        assert_eq!(source, b"print('hi')");
    }

    #[test]
    fn test_read_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DefaultPort.read_source(&dir.path().join("missing.js")).is_err());
    }

    #[test]
    fn test_normalize_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("main.js");
        std::fs::write(&base, "").unwrap();
        std::fs::write(dir.path().join("lib.js"), "").unwrap();

        let resolved = DefaultPort.normalize_path("./lib.js", Some(&base));
        assert_eq!(resolved, dir.path().join("lib.js").canonicalize().unwrap());
    }

    #[test]
    fn test_normalize_missing_path_lexically() {
        let resolved = normalize_path("/no/such/dir/../file.js", None);
        assert_eq!(resolved, PathBuf::from("/no/such/file.js"));
    }

    #[test]
    fn test_normalize_parent_dirs_clamp_at_root() {
        let resolved = normalize_path("/../../no-such-qv8-dir/file.js", None);
        assert_eq!(resolved, PathBuf::from("/no-such-qv8-dir/file.js"));

        let resolved = normalize_path("../../no-such-qv8-dir/./file.js", None);
        assert_eq!(resolved, PathBuf::from("../../no-such-qv8-dir/file.js"));
    }

    #[test]
    fn test_current_time() {
        assert!(DefaultPort.current_time_ms() > 0.0);
    }
}

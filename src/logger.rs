//! Render log — one file per run, stored next to the other per-user data.
//!
//!   Windows:  `%APPDATA%\MasonryPreview\logs\render.log`
//!   Linux:    `~/.local/share/MasonryPreview/logs/render.log`
//!   macOS:    `~/Library/Application Support/MasonryPreview/logs/render.log`
//!
//! The file is truncated by [`init`], so it only holds the latest run.
//! Everything else goes through `log_info!` / `log_warn!` / `log_err!`;
//! before [`init`] the macros write nowhere, which keeps library users and
//! tests off the filesystem.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        })
    }
}

struct Sink {
    file: Option<Mutex<File>>,
    path: PathBuf,
    /// Lowest level mirrored to stderr (`None` = no mirroring).
    echo_from: Option<Level>,
}

static SINK: OnceLock<Sink> = OnceLock::new();

/// Where this run's log lives, once [`init`] has opened it.
pub fn log_path() -> Option<&'static PathBuf> {
    SINK.get().filter(|s| s.file.is_some()).map(|s| &s.path)
}

pub fn write(level: Level, msg: &str) {
    let Some(sink) = SINK.get() else { return };
    let line = format!("{} {:<5} {}", clock(unix_secs()), level, msg);
    if let Some(Ok(mut file)) = sink.file.as_ref().map(Mutex::lock) {
        // I/O errors are dropped; a full disk must not abort a render
        let _ = writeln!(file, "{}", line);
    }
    if sink.echo_from.is_some_and(|min| level >= min) {
        eprintln!("{}", line);
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*))
    };
}

/// Open (truncate) the log file.  With `verbose`, every line is mirrored to
/// stderr as well.  A panic hook appends the panic message before the
/// default handler runs.  Only the first call has any effect.
pub fn init(verbose: bool) {
    let path = data_dir().join("MasonryPreview").join("logs").join("render.log");
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(f) => Some(Mutex::new(f)),
        Err(e) => {
            eprintln!("warning: cannot open log file {}: {}", path.display(), e);
            None
        }
    };
    let sink = Sink {
        file,
        path,
        echo_from: verbose.then_some(Level::Info),
    };
    if SINK.set(sink).is_err() {
        return;
    }

    log_info!("masonry-preview {} started (unix {})", env!("CARGO_PKG_VERSION"), unix_secs());

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Error, &format!("panic: {}", info));
        prev(info);
    }));
}

/// Per-user data directory, without the application folder.
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".local").join("share"),
        Err(_) => PathBuf::from("."),
    }
}

fn unix_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// `HH:MM:SS` (UTC) of a unix timestamp.
fn clock(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", (secs % 86_400) / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_wraps_at_midnight() {
        assert_eq!(clock(0), "00:00:00");
        assert_eq!(clock(86_399), "23:59:59");
        assert_eq!(clock(86_400 + 3_723), "01:02:03");
    }

    #[test]
    fn levels_order_by_severity() {
        assert!(Level::Info < Level::Warn && Level::Warn < Level::Error);
        assert_eq!(Level::Error.to_string(), "ERROR");
    }

    #[test]
    fn macros_are_silent_before_init() {
        log_warn!("nothing is listening: {}", 42);
        assert!(log_path().is_none());
    }
}

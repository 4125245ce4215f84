//! Process-wide logging bootstrap.
//!
//! # Responsibility
//! - Start the flexi_logger backend once per process for the server or CLI.
//! - Write rotating files under a configured directory, else stderr.
//!
//! # Invariants
//! - A second call with the same level and sink is a no-op.
//! - A second call with a different level or sink is an error.
//! - Log lines carry ids, counts and durations only. Never passwords,
//!   session tokens or note bodies.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use once_cell::sync::OnceCell;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

const FILE_BASENAME: &str = "kabunote";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_FILES: usize = 5;
const PANIC_PAYLOAD_LIMIT: usize = 160;

const LEVELS: [(&str, &str); 6] = [
    ("trace", "trace"),
    ("debug", "debug"),
    ("info", "info"),
    ("warn", "warn"),
    ("warning", "warn"),
    ("error", "error"),
];

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();

/// Where log records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Stderr,
    Directory(PathBuf),
}

impl LogSink {
    fn from_dir(log_dir: Option<&str>) -> Result<Self, String> {
        let Some(raw) = log_dir.map(str::trim) else {
            return Ok(Self::Stderr);
        };
        if raw.is_empty() {
            return Err("log directory cannot be blank".to_string());
        }
        let dir = PathBuf::from(raw);
        if dir.is_relative() {
            return Err(format!("log directory must be absolute: `{raw}`"));
        }
        Ok(Self::Directory(dir))
    }
}

impl Display for LogSink {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stderr => f.write_str("stderr"),
            Self::Directory(dir) => write!(f, "{}", dir.display()),
        }
    }
}

struct ActiveLogger {
    level: &'static str,
    sink: LogSink,
    _handle: LoggerHandle,
}

/// Starts logging at `level`, into `log_dir` when given.
///
/// # Errors
/// Unknown level, a blank or relative `log_dir`, a directory that cannot be
/// created, or a conflicting earlier initialization.
pub fn init_logging(level: &str, log_dir: Option<&str>) -> Result<(), String> {
    let level = normalize_level(level)?;
    let sink = LogSink::from_dir(log_dir)?;
    let active = ACTIVE.get_or_try_init(|| start(level, sink.clone()))?;

    if (active.level, &active.sink) != (level, &sink) {
        return Err(format!(
            "logging already running as {}@{}; cannot switch to {}@{}",
            active.level, active.sink, level, sink
        ));
    }
    Ok(())
}

fn start(level: &'static str, sink: LogSink) -> Result<ActiveLogger, String> {
    let logger = Logger::try_with_str(level).map_err(|err| err.to_string())?;
    let logger = match &sink {
        LogSink::Stderr => logger.log_to_stderr().format_for_stderr(flexi_logger::opt_format),
        LogSink::Directory(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|err| format!("cannot create log directory {}: {err}", dir.display()))?;
            logger
                .log_to_file(FileSpec::default().directory(dir).basename(FILE_BASENAME))
                .rotate(
                    Criterion::Size(ROTATE_AT_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(KEEP_FILES),
                )
                .write_mode(WriteMode::BufferAndFlush)
                .append()
                .format_for_files(flexi_logger::detailed_format)
        }
    };
    let handle = logger
        .start()
        .map_err(|err| format!("logger did not start: {err}"))?;

    log_panics();
    log::info!(
        "event=logging_init module=core status=ok level={level} sink={sink} version={} os={}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    );
    Ok(ActiveLogger {
        level,
        sink,
        _handle: handle,
    })
}

/// `(level, sink)` of the running logger, if any.
pub fn logging_status() -> Option<(&'static str, LogSink)> {
    ACTIVE.get().map(|active| (active.level, active.sink.clone()))
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

pub(crate) fn normalize_level(level: &str) -> Result<&'static str, String> {
    let wanted = level.trim().to_ascii_lowercase();
    LEVELS
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, level)| *level)
        .ok_or_else(|| format!("unknown log level `{wanted}` (trace|debug|info|warn|error)"))
}

fn log_panics() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();
        let location = info
            .location()
            .map_or_else(String::new, |loc| format!("{}:{}", loc.file(), loc.line()));
        log::error!(
            "event=panic module=core status=error location={location} payload={}",
            sanitize_message(&payload, PANIC_PAYLOAD_LIMIT)
        );
        previous(info);
    }));
}

/// Puts `value` on one line and cuts it to `max_chars`.
pub fn sanitize_message(value: &str, max_chars: usize) -> String {
    let mut flat: String = value
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(max_chars)
        .collect();
    if value.chars().count() > max_chars {
        flat.push_str("...");
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::{init_logging, logging_status, normalize_level, sanitize_message, LogSink};

    #[test]
    fn levels_are_case_insensitive_and_accept_warning() {
        assert_eq!(normalize_level(" DEBUG ").unwrap(), "debug");
        assert_eq!(normalize_level("warning").unwrap(), "warn");
        assert!(normalize_level("loud").unwrap_err().contains("loud"));
    }

    #[test]
    fn log_dir_must_be_absolute_and_non_blank() {
        assert_eq!(LogSink::from_dir(None).unwrap(), LogSink::Stderr);
        assert!(LogSink::from_dir(Some("logs")).unwrap_err().contains("absolute"));
        assert!(LogSink::from_dir(Some(" ")).unwrap_err().contains("blank"));
    }

    #[test]
    fn sanitized_paths_stay_on_one_line() {
        assert_eq!(sanitize_message("/api/x\r\ny", 20), "/api/x  y");
        assert_eq!(sanitize_message("トヨタ自動車", 3), "トヨタ...");
    }

    #[test]
    fn second_init_must_match_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap().to_string();

        init_logging("info", Some(&dir_str)).unwrap();
        init_logging("INFO", Some(&dir_str)).unwrap();
        assert!(init_logging("debug", Some(&dir_str))
            .unwrap_err()
            .contains("cannot switch"));
        assert!(init_logging("info", None).unwrap_err().contains("cannot switch"));

        let (level, sink) = logging_status().unwrap();
        assert_eq!(level, "info");
        assert_eq!(sink, LogSink::Directory(dir.path().to_path_buf()));
    }
}

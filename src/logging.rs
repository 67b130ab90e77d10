//! Tracing setup for the HTTP server.
//!
//! Every upload, question, auth decision and session swap is emitted as a structured `tracing`
//! event. Events go to stdout in compact form and to a second ANSI-free file layer whose target
//! is chosen by `DOCQA_LOG_FILE`:
//!
//! - unset or blank: a daily-rotated `logs/docqa.log.<date>`;
//! - `off`: no file output;
//! - any other value: appended to that path.
//!
//! `RUST_LOG` filters both layers and defaults to `info`.
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "DOCQA_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "docqa.log";

// Flushes buffered file output; must live for the whole process.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where the file layer writes.
#[derive(Debug, PartialEq, Eq)]
enum FileTarget {
    Disabled,
    Append(PathBuf),
    DailyRolling(PathBuf),
}

impl FileTarget {
    fn from_setting(setting: Option<&str>) -> Self {
        match setting.map(str::trim) {
            None | Some("") => Self::DailyRolling(PathBuf::from(DEFAULT_LOG_DIR)),
            Some(value) if value.eq_ignore_ascii_case("off") => Self::Disabled,
            Some(path) => Self::Append(PathBuf::from(path)),
        }
    }
}

/// Install the stdout and file layers. Safe to call more than once; later calls only report
/// that a subscriber is already installed.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let file_layer = file_writer(FileTarget::from_setting(
        std::env::var(LOG_FILE_ENV).ok().as_deref(),
    ))
    .map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
    if let Err(err) = result {
        eprintln!("Tracing already initialized: {err}");
    }
}

/// Open the non-blocking writer for `target`; `None` disables the file layer.
fn file_writer(target: FileTarget) -> Option<NonBlocking> {
    let (writer, guard) = match target {
        FileTarget::Disabled => return None,
        FileTarget::Append(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|err| eprintln!("Failed to open log file {}: {err}", path.display()))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        FileTarget::DailyRolling(dir) => {
            if let Err(err) = std::fs::create_dir_all(&dir) {
                eprintln!("Failed to create log directory {}: {err}", dir.display());
                return None;
            }
            tracing_appender::non_blocking(tracing_appender::rolling::daily(
                dir,
                LOG_FILE_PREFIX,
            ))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}

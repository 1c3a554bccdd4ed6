//! Logging setup for the binary.
//!
//! Logs go to stderr so stdout stays free for records. The returned
//! [`LogHandle`] owns the background writer: create it once at process start
//! and drop it at process end to flush buffered lines.

use std::io::{self, IsTerminal};

use clap::ValueEnum;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
  /// Human-readable lines.
  Pretty,
  /// One JSON object per line, event fields flattened.
  Json,
}

impl LogFormat {
  /// Pretty on a terminal, JSON otherwise.
  pub fn detect() -> Self {
    if io::stderr().is_terminal() {
      Self::Pretty
    } else {
      Self::Json
    }
  }
}

/// Keeps the non-blocking writer alive. Dropping it flushes pending logs.
#[must_use = "logs are lost if the handle is dropped early"]
pub struct LogHandle {
  _guard: WorkerGuard,
}

/// Install the global subscriber. Filter comes from `RUST_LOG`, default `info`.
pub fn init_logging(format: LogFormat) -> LogHandle {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let (writer, guard) = tracing_appender::non_blocking(io::stderr());

  match format {
    LogFormat::Pretty => fmt()
      .with_env_filter(filter)
      .with_writer(writer)
      .with_ansi(io::stderr().is_terminal())
      .init(),
    LogFormat::Json => fmt()
      .with_env_filter(filter)
      .with_writer(writer)
      .json()
      .flatten_event(true)
      .init(),
  }

  LogHandle { _guard: guard }
}

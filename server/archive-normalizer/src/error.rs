//! Structured error types for the archive normalizer.
//!
//! Two families, never mixed:
//! - [`RecordError`] is local to one record. The pipeline counts it and moves on.
//! - [`PipelineError`] ends the run (file open, decompression, output writes).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
  /// The raw record cannot be normalized (bad source data).
  #[error("malformed: {0}")]
  Malformed(String),

  /// A constructed record breaks an invariant normalization must guarantee.
  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },
}

impl RecordError {
  pub fn malformed(msg: impl Into<String>) -> Self {
    Self::Malformed(msg.into())
  }

  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn is_malformed(&self) -> bool {
    matches!(self, Self::Malformed(_))
  }
}

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("io: {}: {source}", .path.display())]
  Io { path: PathBuf, source: io::Error },

  #[error("io: {0}")]
  Stream(#[from] io::Error),

  #[error("glob: {pattern}: {source}")]
  Pattern {
    pattern: String,
    source: glob::PatternError,
  },

  #[error("csv: {}: {source}", .path.display())]
  Csv { path: PathBuf, source: csv::Error },

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl PipelineError {
  pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn record_error_messages_name_the_problem() {
    let err = RecordError::malformed("timeline event does not contain repo name");
    assert!(err.is_malformed());
    assert_eq!(err.to_string(), "malformed: timeline event does not contain repo name");

    let err = RecordError::validation("repo", "expected owner/project");
    assert!(!err.is_malformed());
    assert_eq!(err.to_string(), "validation: repo: expected owner/project");
  }

  #[test]
  fn io_error_carries_path() {
    let err = PipelineError::io(
      "/data/2015-01-01-0.json.gz",
      io::Error::new(io::ErrorKind::NotFound, "gone"),
    );
    assert!(err.to_string().contains("2015-01-01-0.json.gz"));
  }
}

//! Run configuration with sane defaults.

use std::path::PathBuf;

/// Marker inserted between an input's stem and the `.json` output extension.
pub const PROCESSED_MARKER: &str = "-processed";

/// Tunable settings for one normalization run.
#[derive(Debug, Clone)]
pub struct Config {
  /// Emit a progress line every N records seen.
  pub progress_interval: u64,
  /// File pattern for new-schema archives, relative to the archive directory.
  pub new_pattern: String,
  /// File pattern for legacy archives, relative to the archive directory.
  pub legacy_pattern: String,
  /// When set, output rotates per input file inside this directory.
  pub output_dir: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      progress_interval: 20_000,
      new_pattern: "*.json.gz".into(),
      legacy_pattern: "*.csv.gz".into(),
      output_dir: None,
    }
  }
}

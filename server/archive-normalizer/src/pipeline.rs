//! Core loop: pull raw records, normalize, validate, forward to the sink.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::Config;
use crate::error::PipelineError;
use crate::normalize;
use crate::sink::Sink;
use crate::source::{ArchiveSource, EventCursor, SourceChain, SourceItem};
use crate::stats::{Outcome, RunStats};
use crate::types::{RawFields, RawRecord, Schema};

/// Archive directories to read, plus an optional event-type allow list.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
  pub legacy_dir: Option<PathBuf>,
  pub new_dir: Option<PathBuf>,
  /// When non-empty, only these upstream `type` values reach the pipeline.
  pub only: Vec<String>,
}

/// Stateless between runs; all counters live in the returned [`RunStats`].
pub struct Pipeline {
  config: Config,
}

impl Pipeline {
  pub fn new(config: Config) -> Self {
    Self { config }
  }

  pub fn with_defaults() -> Self {
    Self::new(Config::default())
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Normalize one raw record and forward it if it survives.
  ///
  /// Record-level failures become an [`Outcome`]; only sink errors are returned.
  pub fn process(&self, raw: &RawRecord, sink: &mut Sink) -> Result<Outcome, PipelineError> {
    let record = match normalize::normalize(raw) {
      Ok(Some(record)) => record,
      Ok(None) => return Ok(Outcome::Unregistered),
      Err(e) if e.is_malformed() => {
        tracing::debug!(schema = %raw.schema, error = %e, "skipping malformed record");
        return Ok(Outcome::Invalid);
      }
      Err(e) => {
        tracing::error!(
          schema = %raw.schema,
          error = %e,
          raw = %to_json(&raw.fields),
          "record construction failed validation"
        );
        return Ok(Outcome::ProcessError);
      }
    };

    if let Err(e) = record.validate() {
      tracing::error!(
        category = %record.category(),
        schema = %raw.schema,
        error = %e,
        record = %to_json(&record),
        raw = %to_json(&raw.fields),
        "normalized record failed validation"
      );
      return Ok(Outcome::ProcessError);
    }

    sink.write(&record)?;
    Ok(Outcome::Forwarded)
  }

  /// Drain `cursor` to the end. The sink is the cursor's file listener, so
  /// output rotates as input files change. The sink is finished on success.
  pub fn run(
    &self,
    cursor: &mut dyn EventCursor,
    sink: &mut Sink,
  ) -> Result<RunStats, PipelineError> {
    let mut stats = RunStats::new();

    while let Some(item) = cursor.next_item(sink) {
      let outcome = match item? {
        SourceItem::Record(raw) => self.process(&raw, sink)?,
        SourceItem::Undecodable {
          path,
          position,
          error,
        } => {
          tracing::debug!(path = %path.display(), position, error = %error, "skipping undecodable line");
          Outcome::Invalid
        }
      };
      stats.record(outcome);

      if stats.at_checkpoint(self.config.progress_interval) {
        log_progress(&stats);
      }
    }

    sink.finish()?;
    log_summary(&stats);
    Ok(stats)
  }

  /// Build one source per configured directory (legacy first, then new) and
  /// run them end to end. In directory mode inputs that already have
  /// non-empty output are skipped before they are opened.
  pub fn run_archives(&self, inputs: &Inputs, sink: &mut Sink) -> Result<RunStats, PipelineError> {
    let mut chain = SourceChain::new();
    if let Some(dir) = &inputs.legacy_dir {
      chain.push(self.source(Schema::Legacy, dir, inputs, sink));
    }
    if let Some(dir) = &inputs.new_dir {
      chain.push(self.source(Schema::New, dir, inputs, sink));
    }
    self.run(&mut chain, sink)
  }

  fn source(&self, schema: Schema, dir: &Path, inputs: &Inputs, sink: &Sink) -> ArchiveSource {
    let pattern = match schema {
      Schema::New => &self.config.new_pattern,
      Schema::Legacy => &self.config.legacy_pattern,
    };
    let mut source = ArchiveSource::new(schema, dir, pattern.clone());

    if let Some(layout) = sink.layout().cloned() {
      source = source.with_file_filter(move |path| !layout.already_processed(path));
    }
    if !inputs.only.is_empty() {
      let allowed: HashSet<String> = inputs.only.iter().cloned().collect();
      source = source.with_record_filter(move |fields| type_allowed(fields, &allowed));
    }
    source
  }
}

fn type_allowed(fields: &RawFields, allowed: &HashSet<String>) -> bool {
  fields
    .get("type")
    .and_then(Value::as_str)
    .map(|t| allowed.contains(t))
    .unwrap_or(false)
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
  serde_json::to_string(value).unwrap_or_else(|e| format!("<unserializable: {}>", e))
}

fn log_progress(stats: &RunStats) {
  tracing::info!(
    total = stats.total,
    count = stats.count,
    records_per_sec = stats.throughput().round() as u64,
    "progress"
  );
}

fn log_summary(stats: &RunStats) {
  tracing::info!(
    total = stats.total,
    count = stats.count,
    unregistered = stats.unregistered,
    records_per_sec = stats.throughput().round() as u64,
    elapsed_secs = stats.elapsed().as_secs(),
    "run complete"
  );

  if stats.invalid > 0 {
    tracing::warn!(invalid = stats.invalid, "skipped malformed input records");
  } else {
    tracing::info!(invalid = 0, "no malformed input records");
  }

  if stats.process_error > 0 {
    tracing::error!(
      process_error = stats.process_error,
      "records failed validation; normalization logic needs fixing"
    );
  } else {
    tracing::info!(process_error = 0, "no validation failures");
  }
}

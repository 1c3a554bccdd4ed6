//! Archive sources: lazily enumerate, decompress and parse archive files.
//!
//! A source is a single-pass cursor. Files are discovered on the first pull,
//! sorted by path, filtered by the file predicate right before each is opened,
//! and read strictly one after another. The [`FileListener`] handed to every
//! pull is told about each file before its first record comes out.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Split};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use serde_json::Value;

use crate::error::{PipelineError, RecordError};
use crate::types::{RawFields, RawRecord, Schema};

/// Early filter on raw records, applied before construction.
pub type RecordPredicate = Box<dyn Fn(&RawFields) -> bool>;

/// Decides whether a discovered file is read at all.
pub type FilePredicate = Box<dyn Fn(&Path) -> bool>;

/// Notified whenever a source is about to open a new input file.
pub trait FileListener {
  fn file_opened(&mut self, path: &Path) -> Result<(), PipelineError>;
}

/// No-op listener.
impl FileListener for () {
  fn file_opened(&mut self, _path: &Path) -> Result<(), PipelineError> {
    Ok(())
  }
}

/// One pull from a cursor.
#[derive(Debug)]
pub enum SourceItem {
  Record(RawRecord),
  /// A line or row that could not be decoded into raw fields.
  Undecodable {
    path: PathBuf,
    position: u64,
    error: RecordError,
  },
}

/// "Next item or end". Once `None` is returned the cursor stays exhausted.
pub trait EventCursor {
  fn next_item(
    &mut self,
    listener: &mut dyn FileListener,
  ) -> Option<Result<SourceItem, PipelineError>>;
}

// ---------------------------------------------------------------------------
// Per-file readers
// ---------------------------------------------------------------------------

type Stream = Box<dyn Read>;

enum Reader {
  Lines(Split<BufReader<Stream>>),
  Rows {
    headers: csv::StringRecord,
    rows: csv::StringRecordsIntoIter<Stream>,
  },
}

struct OpenFile {
  path: PathBuf,
  schema: Schema,
  reader: Reader,
  position: u64,
}

fn is_gzip(path: &Path) -> bool {
  path
    .extension()
    .map(|ext| ext.eq_ignore_ascii_case("gz"))
    .unwrap_or(false)
}

impl OpenFile {
  fn open(path: PathBuf, schema: Schema) -> Result<Self, PipelineError> {
    let file = File::open(&path).map_err(|e| PipelineError::io(&path, e))?;
    let stream: Stream = if is_gzip(&path) {
      Box::new(MultiGzDecoder::new(file))
    } else {
      Box::new(file)
    };

    let reader = match schema {
      Schema::New => Reader::Lines(BufReader::new(stream).split(b'\n')),
      Schema::Legacy => {
        let mut csv_reader = csv::ReaderBuilder::new()
          .has_headers(true)
          .from_reader(stream);
        let headers = csv_reader
          .headers()
          .map_err(|e| PipelineError::Csv {
            path: path.clone(),
            source: e,
          })?
          .clone();
        Reader::Rows {
          headers,
          rows: csv_reader.into_records(),
        }
      }
    };

    Ok(Self {
      path,
      schema,
      reader,
      position: 0,
    })
  }

  fn next_raw(&mut self) -> Option<Result<SourceItem, PipelineError>> {
    match &mut self.reader {
      Reader::Lines(lines) => loop {
        let bytes = match lines.next()? {
          Ok(b) => b,
          Err(e) => return Some(Err(PipelineError::io(&self.path, e))),
        };
        self.position += 1;
        if bytes.iter().all(u8::is_ascii_whitespace) {
          continue;
        }
        let error = match serde_json::from_slice::<Value>(&bytes) {
          Ok(Value::Object(fields)) => {
            return Some(Ok(SourceItem::Record(RawRecord::new(self.schema, fields))))
          }
          Ok(_) => RecordError::malformed("expected a JSON object"),
          Err(e) => RecordError::malformed(format!("json: {}", e)),
        };
        return Some(Ok(undecodable(&self.path, self.position, error)));
      },
      Reader::Rows { headers, rows } => {
        let row = rows.next()?;
        self.position += 1;
        let item = match row {
          Ok(row) => {
            let fields: RawFields = headers
              .iter()
              .zip(row.iter())
              .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
              .collect();
            SourceItem::Record(RawRecord::new(self.schema, fields))
          }
          Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
            return Some(Err(PipelineError::Csv {
              path: self.path.clone(),
              source: e,
            }))
          }
          Err(e) => {
            let error = RecordError::malformed(format!("csv: {}", e));
            undecodable(&self.path, self.position, error)
          }
        };
        Some(Ok(item))
      }
    }
  }
}

fn undecodable(path: &Path, position: u64, error: RecordError) -> SourceItem {
  SourceItem::Undecodable {
    path: path.to_path_buf(),
    position,
    error,
  }
}

// ---------------------------------------------------------------------------
// Archive source
// ---------------------------------------------------------------------------

/// All archive files of one schema under one directory.
pub struct ArchiveSource {
  schema: Schema,
  root: PathBuf,
  pattern: String,
  record_filter: RecordPredicate,
  file_filter: FilePredicate,
  /// `None` until the first pull triggers discovery.
  pending: Option<VecDeque<PathBuf>>,
  current: Option<OpenFile>,
}

impl ArchiveSource {
  pub fn new(schema: Schema, root: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
    Self {
      schema,
      root: root.into(),
      pattern: pattern.into(),
      record_filter: Box::new(|_: &RawFields| true),
      file_filter: Box::new(|_: &Path| true),
      pending: None,
      current: None,
    }
  }

  /// Drop raw records the filter rejects before they reach the pipeline.
  /// Undecodable lines carry no fields to test, so they always pass through
  /// and are counted as malformed.
  pub fn with_record_filter(mut self, filter: impl Fn(&RawFields) -> bool + 'static) -> Self {
    self.record_filter = Box::new(filter);
    self
  }

  pub fn with_file_filter(mut self, filter: impl Fn(&Path) -> bool + 'static) -> Self {
    self.file_filter = Box::new(filter);
    self
  }

  pub fn schema(&self) -> Schema {
    self.schema
  }

  fn next_file(&mut self) -> Result<Option<PathBuf>, PipelineError> {
    if self.pending.is_none() {
      let files = discover(&self.root, &self.pattern)?;
      tracing::info!(
        schema = %self.schema,
        root = %self.root.display(),
        files = files.len(),
        "discovered archive files"
      );
      self.pending = Some(files.into());
    }

    let pending = match self.pending.as_mut() {
      Some(p) => p,
      None => return Ok(None),
    };
    while let Some(path) = pending.pop_front() {
      if (self.file_filter)(&path) {
        return Ok(Some(path));
      }
      tracing::info!(path = %path.display(), "skipping archive file");
    }
    Ok(None)
  }
}

impl EventCursor for ArchiveSource {
  fn next_item(
    &mut self,
    listener: &mut dyn FileListener,
  ) -> Option<Result<SourceItem, PipelineError>> {
    loop {
      if self.current.is_none() {
        let path = match self.next_file() {
          Ok(Some(p)) => p,
          Ok(None) => return None,
          Err(e) => return Some(Err(e)),
        };
        if let Err(e) = listener.file_opened(&path) {
          return Some(Err(e));
        }
        tracing::debug!(path = %path.display(), schema = %self.schema, "opening archive file");
        match OpenFile::open(path, self.schema) {
          Ok(file) => self.current = Some(file),
          Err(e) => return Some(Err(e)),
        }
      }

      let file = self.current.as_mut()?;
      match file.next_raw() {
        None => {
          tracing::debug!(path = %file.path.display(), lines = file.position, "finished archive file");
          self.current = None;
        }
        Some(Ok(SourceItem::Record(raw))) => {
          if (self.record_filter)(&raw.fields) {
            return Some(Ok(SourceItem::Record(raw)));
          }
        }
        Some(other) => return Some(other),
      }
    }
  }
}

/// Files matching `pattern` directly under `root`, sorted by path.
///
/// A missing `root` yields no files; a directory that exists but cannot be
/// read is an error.
pub fn discover(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, PipelineError> {
  let full = format!(
    "{}/{}",
    glob::Pattern::escape(&root.to_string_lossy()),
    pattern
  );
  let entries = glob::glob(&full).map_err(|e| PipelineError::Pattern {
    pattern: full.clone(),
    source: e,
  })?;

  let mut paths = Vec::new();
  for entry in entries {
    let path = entry.map_err(|e| {
      let dir = e.path().to_path_buf();
      PipelineError::io(dir, e.into_error())
    })?;
    if path.is_file() {
      paths.push(path);
    }
  }
  paths.sort();
  Ok(paths)
}

// ---------------------------------------------------------------------------
// Concatenation
// ---------------------------------------------------------------------------

/// Drains each cursor to completion before moving to the next.
#[derive(Default)]
pub struct SourceChain {
  cursors: VecDeque<Box<dyn EventCursor>>,
}

impl SourceChain {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, cursor: impl EventCursor + 'static) {
    self.cursors.push_back(Box::new(cursor));
  }

  pub fn with(mut self, cursor: impl EventCursor + 'static) -> Self {
    self.push(cursor);
    self
  }

  pub fn is_empty(&self) -> bool {
    self.cursors.is_empty()
  }
}

impl EventCursor for SourceChain {
  fn next_item(
    &mut self,
    listener: &mut dyn FileListener,
  ) -> Option<Result<SourceItem, PipelineError>> {
    while let Some(cursor) = self.cursors.front_mut() {
      match cursor.next_item(listener) {
        Some(item) => return Some(item),
        None => {
          self.cursors.pop_front();
        }
      }
    }
    None
  }
}

//! Output sink: one JSON document per line, rotated in step with input files.
//!
//! In stream mode every record goes to one writer (stdout in the binary).
//! In directory mode each input file gets its own destination, derived from
//! the input's base name; a `.gz` input yields a gzip destination. Inputs
//! that share a base name within one run share a destination: the later
//! input appends to it rather than truncating it.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::PROCESSED_MARKER;
use crate::error::PipelineError;
use crate::source::FileListener;
use crate::types::Record;

/// Destination naming for directory mode.
///
/// Clones share the set of destinations claimed during the current run, so a
/// file filter holding a clone sees what the sink has already opened.
#[derive(Debug, Clone)]
pub struct OutputLayout {
  dir: PathBuf,
  claimed: Rc<RefCell<HashSet<PathBuf>>>,
}

impl OutputLayout {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self {
      dir: dir.into(),
      claimed: Rc::default(),
    }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn destination_for(&self, input: &Path) -> PathBuf {
    self.dir.join(processed_name(input))
  }

  /// True when the destination for `input` exists and is non-empty and was
  /// not written by this run.
  pub fn already_processed(&self, input: &Path) -> bool {
    let path = self.destination_for(input);
    if self.claimed.borrow().contains(&path) {
      return false;
    }
    fs::metadata(path)
      .map(|m| m.is_file() && m.len() > 0)
      .unwrap_or(false)
  }

  /// Destination for `input`, and whether an earlier input of this run
  /// already claimed it.
  fn claim(&self, input: &Path) -> (PathBuf, bool) {
    let path = self.destination_for(input);
    let repeat = !self.claimed.borrow_mut().insert(path.clone());
    (path, repeat)
  }
}

/// `2015-01-01-0.json.gz` -> `2015-01-01-0-processed.json.gz`,
/// `timeline.csv` -> `timeline-processed.json`.
pub fn processed_name(input: &Path) -> String {
  let name = input
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();

  let (base, compression) = match name.rsplit_once('.') {
    Some((base, ext)) if ext.eq_ignore_ascii_case("gz") => (base, Some(ext)),
    _ => (name.as_str(), None),
  };
  let stem = match base.rsplit_once('.') {
    Some((stem, _)) if !stem.is_empty() => stem,
    _ => base,
  };

  match compression {
    Some(ext) => format!("{}{}.json.{}", stem, PROCESSED_MARKER, ext),
    None => format!("{}{}.json", stem, PROCESSED_MARKER),
  }
}

fn is_gzip(path: &Path) -> bool {
  path
    .extension()
    .map(|ext| ext.eq_ignore_ascii_case("gz"))
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Destinations
// ---------------------------------------------------------------------------

enum Destination {
  Plain(BufWriter<File>),
  Gzip(GzEncoder<BufWriter<File>>),
}

impl Destination {
  /// A gzip destination reopened for append gains a second gzip member,
  /// which multi-member decoders read as one stream.
  fn open(path: &Path, append: bool) -> Result<Self, PipelineError> {
    let file = if append {
      OpenOptions::new().append(true).open(path)
    } else {
      File::create(path)
    }
    .map_err(|e| PipelineError::io(path, e))?;
    let out = BufWriter::new(file);
    Ok(if is_gzip(path) {
      Self::Gzip(GzEncoder::new(out, Compression::default()))
    } else {
      Self::Plain(out)
    })
  }

  fn writer(&mut self) -> &mut dyn Write {
    match self {
      Self::Plain(w) => w,
      Self::Gzip(w) => w,
    }
  }

  /// Write the gzip trailer (if any) and flush to disk.
  fn close(self) -> io::Result<()> {
    match self {
      Self::Plain(mut w) => w.flush(),
      Self::Gzip(w) => w.finish()?.flush(),
    }
  }
}

enum Target {
  Stream(Box<dyn Write>),
  Directory {
    layout: OutputLayout,
    current: Option<(PathBuf, Destination)>,
  },
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

pub struct Sink {
  target: Target,
  written: u64,
}

impl Sink {
  /// Single unrotated stream for the whole run.
  pub fn stream(out: impl Write + 'static) -> Self {
    Self {
      target: Target::Stream(Box::new(out)),
      written: 0,
    }
  }

  pub fn stdout() -> Self {
    Self::stream(BufWriter::new(io::stdout()))
  }

  /// Rotating destinations inside `layout.dir()`, created if missing.
  pub fn directory(layout: OutputLayout) -> Result<Self, PipelineError> {
    fs::create_dir_all(layout.dir()).map_err(|e| PipelineError::io(layout.dir(), e))?;
    Ok(Self {
      target: Target::Directory {
        layout,
        current: None,
      },
      written: 0,
    })
  }

  pub fn layout(&self) -> Option<&OutputLayout> {
    match &self.target {
      Target::Stream(_) => None,
      Target::Directory { layout, .. } => Some(layout),
    }
  }

  /// Only meaningful in directory mode; always false for a stream.
  pub fn already_processed(&self, input: &Path) -> bool {
    self
      .layout()
      .map(|layout| layout.already_processed(input))
      .unwrap_or(false)
  }

  pub fn current_destination(&self) -> Option<&Path> {
    match &self.target {
      Target::Directory {
        current: Some((path, _)),
        ..
      } => Some(path),
      _ => None,
    }
  }

  pub fn records_written(&self) -> u64 {
    self.written
  }

  /// Append one record as a single JSON line.
  pub fn write(&mut self, record: &Record) -> Result<(), PipelineError> {
    let out: &mut dyn Write = match &mut self.target {
      Target::Stream(w) => w.as_mut(),
      Target::Directory {
        current: Some((_, dest)),
        ..
      } => dest.writer(),
      Target::Directory { current: None, .. } => {
        return Err(PipelineError::Stream(io::Error::new(
          io::ErrorKind::Other,
          "no output file is open",
        )))
      }
    };
    serde_json::to_writer(&mut *out, record)?;
    out.write_all(b"\n")?;
    self.written += 1;
    Ok(())
  }

  /// Close the open destination (directory mode) or flush the stream.
  pub fn finish(&mut self) -> Result<(), PipelineError> {
    match &mut self.target {
      Target::Stream(w) => w.flush()?,
      Target::Directory { current, .. } => {
        if let Some((path, dest)) = current.take() {
          dest.close().map_err(|e| PipelineError::io(&path, e))?;
          tracing::debug!(output = %path.display(), "closed output file");
        }
      }
    }
    Ok(())
  }
}

impl FileListener for Sink {
  fn file_opened(&mut self, input: &Path) -> Result<(), PipelineError> {
    let (layout, current) = match &mut self.target {
      Target::Stream(_) => return Ok(()),
      Target::Directory { layout, current } => (layout, current),
    };

    if let Some((path, dest)) = current.take() {
      dest.close().map_err(|e| PipelineError::io(&path, e))?;
      tracing::debug!(output = %path.display(), "closed output file");
    }

    let (path, append) = layout.claim(input);
    if append {
      tracing::warn!(
        input = %input.display(),
        output = %path.display(),
        "output file already written this run; appending"
      );
    }
    let dest = Destination::open(&path, append)?;
    tracing::info!(
      input = %input.display(),
      output = %path.display(),
      "rotated output file"
    );
    *current = Some((path, dest));
    Ok(())
  }
}

//! Archive normalizer: streaming, fault-tolerant normalization of public
//! event-log archives.
//!
//! Two upstream schemas (JSON lines from 2015 on, legacy CSV timeline rows
//! before that) are read lazily from gzip archives, turned into one typed
//! record per event category, validated, and written as flat JSON lines.
//! Bad records are counted and skipped; they never abort a run.

pub mod config;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod stats;
pub mod types;
pub mod validate;
pub mod variants;

pub use config::Config;
pub use error::{PipelineError, RecordError};
pub use pipeline::{Inputs, Pipeline};
pub use sink::{OutputLayout, Sink};
pub use source::{ArchiveSource, EventCursor, FileListener, SourceChain, SourceItem};
pub use stats::{Outcome, RunStats};
pub use types::{EventCategory, RawRecord, Record, Schema};

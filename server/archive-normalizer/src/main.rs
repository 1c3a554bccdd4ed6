//! Binary entrypoint: normalize archive directories into JSON lines.
//!
//! Without `--output-dir` every record goes to stdout. With it, each input
//! file gets a `-processed` output file and inputs that already have
//! non-empty output are skipped, so re-runs only pick up new archives.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use archive_normalizer::logging::{init_logging, LogFormat};
use archive_normalizer::{Config, Inputs, OutputLayout, Pipeline, PipelineError, Sink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
  /// Legacy archives, then new ones.
  All,
  New,
  Legacy,
}

#[derive(Parser, Debug)]
#[command(
  name = "archive-normalizer",
  version,
  about = "Normalize public event-log archives into flat JSON lines"
)]
struct Cli {
  /// Which archive kinds to read.
  #[arg(long, value_enum, default_value = "all")]
  mode: Mode,

  /// Directory of new-schema `*.json.gz` archives.
  #[arg(long)]
  new_dir: Option<PathBuf>,

  /// Directory of legacy `*.csv.gz` archives.
  #[arg(long)]
  legacy_dir: Option<PathBuf>,

  /// Write one output file per input here instead of stdout.
  #[arg(long)]
  output_dir: Option<PathBuf>,

  /// Only pass events of this upstream type (repeatable).
  #[arg(long = "only", value_name = "TYPE")]
  only: Vec<String>,

  /// Log progress every N records.
  #[arg(long, default_value_t = Config::default().progress_interval)]
  progress_interval: u64,

  /// Log format; defaults to pretty on a terminal, JSON otherwise.
  #[arg(long, value_enum)]
  log_format: Option<LogFormat>,
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  let log = init_logging(cli.log_format.unwrap_or_else(LogFormat::detect));

  let code = match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      tracing::error!(error = %e, "archive-normalizer: run aborted");
      ExitCode::FAILURE
    }
  };

  drop(log);
  code
}

fn run(cli: Cli) -> Result<(), PipelineError> {
  let inputs = Inputs {
    legacy_dir: match cli.mode {
      Mode::All | Mode::Legacy => cli.legacy_dir,
      Mode::New => None,
    },
    new_dir: match cli.mode {
      Mode::All | Mode::New => cli.new_dir,
      Mode::Legacy => None,
    },
    only: cli.only,
  };
  if inputs.legacy_dir.is_none() && inputs.new_dir.is_none() {
    tracing::warn!(mode = ?cli.mode, "no archive directory given for this mode; nothing to do");
  }

  let config = Config {
    progress_interval: cli.progress_interval,
    output_dir: cli.output_dir,
    ..Config::default()
  };

  let mut sink = match &config.output_dir {
    Some(dir) => Sink::directory(OutputLayout::new(dir))?,
    None => Sink::stdout(),
  };

  let stats = Pipeline::new(config).run_archives(&inputs, &mut sink)?;
  debug_assert!(stats.is_balanced());
  Ok(())
}

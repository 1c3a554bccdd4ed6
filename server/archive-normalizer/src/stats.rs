//! Running counters for one pipeline run.

use std::time::{Duration, Instant};

/// How one raw record ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  /// Normalized, validated and written.
  Forwarded,
  /// Bad source data (undecodable line, missing repo name, bad timestamp).
  Invalid,
  /// Constructed but failed validation; a normalization bug.
  ProcessError,
  /// No variant registered for the event type.
  Unregistered,
}

/// Monotonic counters. `total` always equals the sum of the four outcomes.
#[derive(Debug, Clone)]
pub struct RunStats {
  pub total: u64,
  pub count: u64,
  pub invalid: u64,
  pub process_error: u64,
  pub unregistered: u64,
  started: Instant,
}

impl RunStats {
  pub fn new() -> Self {
    Self::started_at(Instant::now())
  }

  pub fn started_at(started: Instant) -> Self {
    Self {
      total: 0,
      count: 0,
      invalid: 0,
      process_error: 0,
      unregistered: 0,
      started,
    }
  }

  pub fn record(&mut self, outcome: Outcome) {
    self.total += 1;
    match outcome {
      Outcome::Forwarded => self.count += 1,
      Outcome::Invalid => self.invalid += 1,
      Outcome::ProcessError => self.process_error += 1,
      Outcome::Unregistered => self.unregistered += 1,
    }
  }

  pub fn is_balanced(&self) -> bool {
    self.total == self.count + self.invalid + self.process_error + self.unregistered
  }

  pub fn elapsed(&self) -> Duration {
    self.started.elapsed()
  }

  /// Records seen per second since the run started.
  pub fn throughput(&self) -> f64 {
    throughput(self.total, self.elapsed())
  }

  /// True when `total` just crossed a multiple of `interval`.
  pub fn at_checkpoint(&self, interval: u64) -> bool {
    interval > 0 && self.total > 0 && self.total % interval == 0
  }
}

impl Default for RunStats {
  fn default() -> Self {
    Self::new()
  }
}

fn throughput(total: u64, elapsed: Duration) -> f64 {
  let secs = elapsed.as_secs_f64();
  if secs > 0.0 {
    total as f64 / secs
  } else {
    0.0
  }
}

//! Post-construction checks. A failure here means normalization produced a
//! record it should never have produced.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::RecordError;
use crate::types::Record;
use crate::variants::EventVariant;

static REPO_NAME: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^[\w.-]+/[\w.-]+$").expect("repo name pattern compiles"));

/// `owner/project`, each side made of word characters, `-` or `.`.
pub fn validate_repo_name(repo: &str) -> Result<(), RecordError> {
  if REPO_NAME.is_match(repo) {
    Ok(())
  } else {
    Err(RecordError::validation(
      "repo",
      &format!("expected owner/project, got {:?}", repo),
    ))
  }
}

impl Record {
  /// Shared repo-name check, then the variant's own hook.
  pub fn validate(&self) -> Result<(), RecordError> {
    validate_repo_name(&self.common().repo)?;
    match self {
      Self::Gollum(r) => r.validate(),
      Self::Issues(r) => r.validate(),
      Self::Push(r) => r.validate(),
      Self::CommitComment(r) => r.validate(),
      Self::Release(r) => r.validate(),
      Self::Public(r) => r.validate(),
      Self::Member(r) => r.validate(),
      Self::IssueComment(r) => r.validate(),
    }
  }
}

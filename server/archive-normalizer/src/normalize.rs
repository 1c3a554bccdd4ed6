//! Normalize raw archive events into typed records.
//!
//! Dispatch reads the event `type`, looks the category up in the static
//! registry and hands the raw fields to that category's [`EventVariant`].
//! Unknown categories produce `Ok(None)`, which is not an error.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::error::RecordError;
use crate::types::*;
use crate::variants::EventVariant;

const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Build a normalized record from one raw record.
///
/// Returns `Ok(None)` when no variant is registered for the event type.
pub fn normalize(raw: &RawRecord) -> Result<Option<Record>, RecordError> {
  let category = match raw.event_type().and_then(EventCategory::from_tag) {
    Some(c) => c,
    None => return Ok(None),
  };

  let record = match category {
    EventCategory::Gollum => Record::Gollum(build(raw)?),
    EventCategory::Issues => Record::Issues(build(raw)?),
    EventCategory::Push => Record::Push(build(raw)?),
    EventCategory::CommitComment => Record::CommitComment(build(raw)?),
    EventCategory::Release => Record::Release(build(raw)?),
    EventCategory::Public => Record::Public(build(raw)?),
    EventCategory::Member => Record::Member(build(raw)?),
    EventCategory::IssueComment => Record::IssueComment(build(raw)?),
  };
  Ok(Some(record))
}

fn build<V: EventVariant>(raw: &RawRecord) -> Result<V, RecordError> {
  match raw.schema {
    Schema::New => {
      let common = common_from_new(&raw.fields)?;
      let payload = raw.fields.get("payload").unwrap_or(&Value::Null);
      V::from_new(common, payload)
    }
    Schema::Legacy => {
      let common = common_from_legacy(&raw.fields)?;
      V::from_legacy(common, &raw.fields)
    }
  }
}

// ---------------------------------------------------------------------------
// Common fields
// ---------------------------------------------------------------------------

/// New schema: actor/repo/org are nested objects; `created_at` carries an offset.
pub fn common_from_new(fields: &RawFields) -> Result<Common, RecordError> {
  let created_at = fields
    .get("created_at")
    .and_then(Value::as_str)
    .ok_or_else(|| RecordError::malformed("event does not contain created_at"))?;
  let created_at = parse_new_timestamp(created_at)?;

  let repo = nested_text(fields, &["repo", "name"])
    .ok_or_else(|| RecordError::malformed("event does not contain repo name"))?;

  let actor = nested_text(fields, &["actor", "login"]);
  Ok(Common {
    id: fields.get("id").and_then(id_text),
    created_at,
    actor_lower: actor.as_deref().map(str::to_lowercase),
    actor,
    repo,
    org: nested_text(fields, &["org", "login"]),
  })
}

/// Legacy schema: naive UTC timestamp, repo name rebuilt from several columns.
pub fn common_from_legacy(row: &RawFields) -> Result<Common, RecordError> {
  let created_at = column(row, "created_at")
    .ok_or_else(|| RecordError::malformed("timeline event does not contain created_at"))?;
  let created_at = parse_legacy_timestamp(created_at)?;

  let repo = legacy_repo_name(row)?;

  let actor = column(row, "actor")
    .or_else(|| column(row, "actor_attributes_login"))
    .map(str::to_string);
  Ok(Common {
    id: None,
    created_at,
    actor_lower: actor.as_deref().map(str::to_lowercase),
    actor,
    repo,
    org: column_text(row, "repository_organization"),
  })
}

/// Rebuild `owner/project` for a legacy row.
///
/// Precedence: a compound column that already holds `owner/project`, then
/// `repository_owner` + `repository_name`, then path segments two and three
/// of the `url` column.
pub fn legacy_repo_name(row: &RawFields) -> Result<String, RecordError> {
  for compound in ["repo_name", "repository_name"] {
    if let Some(name) = column(row, compound) {
      if name.contains('/') && name != "/" {
        return Ok(name.to_string());
      }
    }
  }

  if let (Some(owner), Some(name)) = (column(row, "repository_owner"), column(row, "repository_name")) {
    return Ok(format!("{}/{}", owner, name));
  }

  column(row, "url")
    .and_then(repo_from_url)
    .ok_or_else(|| RecordError::malformed("timeline event does not contain repo name"))
}

/// `https://api.example.com/repos/acme/widget/issues/3` -> `acme/widget`.
fn repo_from_url(raw: &str) -> Option<String> {
  let url = url::Url::parse(raw).ok()?;
  let mut segments = url.path_segments()?;
  segments.next()?;
  let owner = segments.next().filter(|s| !s.is_empty())?;
  let name = segments.next().filter(|s| !s.is_empty())?;
  Some(format!("{}/{}", owner, name))
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

pub fn parse_new_timestamp(s: &str) -> Result<DateTime<Utc>, RecordError> {
  DateTime::parse_from_rfc3339(s)
    .map(|ts| ts.with_timezone(&Utc))
    .map_err(|e| RecordError::malformed(format!("created_at: invalid RFC3339 {:?}: {}", s, e)))
}

/// Legacy timestamps have no zone and are taken as UTC. A trailing ` UTC`
/// (as written by some exports) is accepted.
pub fn parse_legacy_timestamp(s: &str) -> Result<DateTime<Utc>, RecordError> {
  let trimmed = s.trim();
  let trimmed = trimmed.strip_suffix(" UTC").unwrap_or(trimmed);
  NaiveDateTime::parse_from_str(trimmed, LEGACY_TIMESTAMP_FORMAT)
    .map(|ts| ts.and_utc())
    .map_err(|e| RecordError::malformed(format!("created_at: invalid timestamp {:?}: {}", s, e)))
}

// ---------------------------------------------------------------------------
// Field access helpers
// ---------------------------------------------------------------------------

/// Walk nested objects and return a non-empty string leaf.
pub(crate) fn nested_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
  let mut current = value;
  for key in path {
    current = current.get(key)?;
  }
  current.as_str().filter(|s| !s.is_empty())
}

fn nested_text(fields: &RawFields, path: &[&str]) -> Option<String> {
  let (first, rest) = path.split_first()?;
  nested_str(fields.get(*first)?, rest).map(str::to_string)
}

/// Walk nested objects and return an unsigned integer leaf. Numeric strings
/// are accepted; anything else is absent.
pub(crate) fn nested_u64(value: &Value, path: &[&str]) -> Option<u64> {
  let mut current = value;
  for key in path {
    current = current.get(key)?;
  }
  match current {
    Value::Number(n) => n.as_u64(),
    Value::String(s) => parse_count(s),
    _ => None,
  }
}

/// Legacy column value; empty cells are absent.
pub(crate) fn column<'a>(row: &'a RawFields, name: &str) -> Option<&'a str> {
  row.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub(crate) fn column_text(row: &RawFields, name: &str) -> Option<String> {
  column(row, name).map(str::to_string)
}

/// Best-effort integer from a legacy column; malformed values become `None`.
pub(crate) fn column_u64(row: &RawFields, name: &str) -> Option<u64> {
  column(row, name).and_then(parse_count)
}

fn parse_count(s: &str) -> Option<u64> {
  let s = s.trim();
  if let Ok(n) = s.parse::<u64>() {
    return Some(n);
  }
  // Some exports render integer columns as "12.0".
  match s.split_once('.') {
    Some((int, zeros))
      if !zeros.is_empty() && zeros.bytes().all(|b| b == b'0') && int.bytes().all(|b| b.is_ascii_digit()) =>
    {
      int.parse().ok()
    }
    _ => None,
  }
}

fn id_text(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

//! Core types for the archive normalizer (raw input shapes + normalized records).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

// ---------------------------------------------------------------------------
// Raw input (what the archives contain)
// ---------------------------------------------------------------------------

/// One raw event as read from an archive. New-schema lines keep their JSON
/// nesting; legacy rows map each CSV header to a string value.
pub type RawFields = serde_json::Map<String, Value>;

/// Which upstream schema a raw record was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Schema {
  /// JSON-native events, 2015-01-01 onward.
  New,
  /// Flattened timeline rows, before 2015-01-01.
  Legacy,
}

impl Schema {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::New => "new",
      Self::Legacy => "legacy",
    }
  }
}

impl fmt::Display for Schema {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A raw record paired with its schema tag.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
  pub schema: Schema,
  pub fields: RawFields,
}

impl RawRecord {
  pub fn new(schema: Schema, fields: RawFields) -> Self {
    Self { schema, fields }
  }

  /// The upstream event type tag, if present.
  pub fn event_type(&self) -> Option<&str> {
    self.fields.get("type").and_then(Value::as_str)
  }
}

// ---------------------------------------------------------------------------
// Event categories
// ---------------------------------------------------------------------------

/// Categories that have a normalized record variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
  Gollum,
  Issues,
  Push,
  CommitComment,
  Release,
  Public,
  Member,
  IssueComment,
}

/// Upstream tag -> category. Tags missing here have no variant and are dropped.
const REGISTRY: &[(&str, EventCategory)] = &[
  ("GollumEvent", EventCategory::Gollum),
  ("IssuesEvent", EventCategory::Issues),
  ("PushEvent", EventCategory::Push),
  ("CommitCommentEvent", EventCategory::CommitComment),
  ("ReleaseEvent", EventCategory::Release),
  ("PublicEvent", EventCategory::Public),
  ("MemberEvent", EventCategory::Member),
  ("IssueCommentEvent", EventCategory::IssueComment),
];

impl EventCategory {
  pub fn from_tag(tag: &str) -> Option<Self> {
    REGISTRY
      .iter()
      .find(|(name, _)| *name == tag)
      .map(|(_, category)| *category)
  }

  pub fn tag(self) -> &'static str {
    REGISTRY
      .iter()
      .find(|(_, category)| *category == self)
      .map(|(name, _)| *name)
      .unwrap_or("UnknownEvent")
  }

  pub fn all() -> impl Iterator<Item = EventCategory> {
    REGISTRY.iter().map(|(_, category)| *category)
  }
}

impl fmt::Display for EventCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.tag())
  }
}

// ---------------------------------------------------------------------------
// Normalized records (JSON contract — what we emit)
// ---------------------------------------------------------------------------

/// Fields every normalized record carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Common {
  /// Upstream event id (new schema only).
  pub id: Option<String>,
  #[serde(serialize_with = "serialize_timestamp")]
  pub created_at: DateTime<Utc>,
  pub actor: Option<String>,
  /// Case-folded `actor`, for matching only.
  pub actor_lower: Option<String>,
  /// Always `owner/project`.
  pub repo: String,
  pub org: Option<String>,
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, false))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GollumRecord {
  #[serde(flatten)]
  pub common: Common,
  pub page_name: Option<String>,
  pub page_title: Option<String>,
  pub page_action: Option<String>,
  pub page_url: Option<String>,
  pub page_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuesRecord {
  #[serde(flatten)]
  pub common: Common,
  pub action: Option<String>,
  pub issue_number: Option<u64>,
  pub issue_url: Option<String>,
}

/// The distinct-commit count is named differently per schema:
/// `distinct_commit_count` (new) and `distinct_count` (legacy).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushRecord {
  #[serde(flatten)]
  pub common: Common,
  #[serde(rename = "ref")]
  pub git_ref: Option<String>,
  pub head: Option<String>,
  pub before: Option<String>,
  pub commit_count: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub distinct_commit_count: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub distinct_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitCommentRecord {
  #[serde(flatten)]
  pub common: Common,
  pub commit_id: Option<String>,
  pub comment_id: Option<u64>,
  pub comment_url: Option<String>,
  pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseRecord {
  #[serde(flatten)]
  pub common: Common,
  pub action: Option<String>,
  pub tag_name: Option<String>,
  pub release_name: Option<String>,
  pub release_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicRecord {
  #[serde(flatten)]
  pub common: Common,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberRecord {
  #[serde(flatten)]
  pub common: Common,
  pub action: Option<String>,
  pub member: Option<String>,
  pub member_lower: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueCommentRecord {
  #[serde(flatten)]
  pub common: Common,
  pub issue_number: Option<u64>,
  pub issue_url: Option<String>,
  pub comment_url: Option<String>,
  pub comment_id: Option<u64>,
  pub body: Option<String>,
}

/// A normalized record. Serializes as one flat object with a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Record {
  #[serde(rename = "GollumEvent")]
  Gollum(GollumRecord),
  #[serde(rename = "IssuesEvent")]
  Issues(IssuesRecord),
  #[serde(rename = "PushEvent")]
  Push(PushRecord),
  #[serde(rename = "CommitCommentEvent")]
  CommitComment(CommitCommentRecord),
  #[serde(rename = "ReleaseEvent")]
  Release(ReleaseRecord),
  #[serde(rename = "PublicEvent")]
  Public(PublicRecord),
  #[serde(rename = "MemberEvent")]
  Member(MemberRecord),
  #[serde(rename = "IssueCommentEvent")]
  IssueComment(IssueCommentRecord),
}

impl Record {
  pub fn category(&self) -> EventCategory {
    match self {
      Self::Gollum(_) => EventCategory::Gollum,
      Self::Issues(_) => EventCategory::Issues,
      Self::Push(_) => EventCategory::Push,
      Self::CommitComment(_) => EventCategory::CommitComment,
      Self::Release(_) => EventCategory::Release,
      Self::Public(_) => EventCategory::Public,
      Self::Member(_) => EventCategory::Member,
      Self::IssueComment(_) => EventCategory::IssueComment,
    }
  }

  pub fn common(&self) -> &Common {
    match self {
      Self::Gollum(r) => &r.common,
      Self::Issues(r) => &r.common,
      Self::Push(r) => &r.common,
      Self::CommitComment(r) => &r.common,
      Self::Release(r) => &r.common,
      Self::Public(r) => &r.common,
      Self::Member(r) => &r.common,
      Self::IssueComment(r) => &r.common,
    }
  }
}

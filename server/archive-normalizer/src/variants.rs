//! Per-category field mapping for both schemas.

use serde_json::Value;

use crate::error::RecordError;
use crate::normalize::{column, column_text, column_u64, nested_str, nested_u64};
use crate::types::*;

/// What every record variant must provide: construction from each schema
/// and a category-specific validation hook.
pub trait EventVariant: Sized {
  /// Build from a new-schema `payload` object.
  fn from_new(common: Common, payload: &Value) -> Result<Self, RecordError>;

  /// Build from a legacy row (all columns, `payload_*` included).
  fn from_legacy(common: Common, row: &RawFields) -> Result<Self, RecordError>;

  /// Checks beyond the shared repo-name invariant.
  fn validate(&self) -> Result<(), RecordError> {
    Ok(())
  }
}

fn text(value: &Value, path: &[&str]) -> Option<String> {
  nested_str(value, path).map(str::to_string)
}

fn first_column(row: &RawFields, names: &[&str]) -> Option<String> {
  names.iter().find_map(|name| column_text(row, name))
}

fn commit_comment_permalink(repo: &str, commit_id: &str, comment_id: u64) -> String {
  format!(
    "https://github.com/{}/commit/{}#commitcomment-{}",
    repo, commit_id, comment_id
  )
}

fn issue_comment_permalink(issue_url: &str, comment_id: u64) -> String {
  format!("{}#issuecomment-{}", issue_url, comment_id)
}

/// Trailing number of an issue URL: `.../issues/42` -> 42.
fn issue_number_from_url(url: &str) -> Option<u64> {
  url
    .split('#')
    .next()?
    .trim_end_matches('/')
    .rsplit('/')
    .next()?
    .parse()
    .ok()
}

impl EventVariant for GollumRecord {
  fn from_new(common: Common, payload: &Value) -> Result<Self, RecordError> {
    let pages = payload.get("pages").and_then(Value::as_array);
    let first = pages.and_then(|p| p.first()).unwrap_or(&Value::Null);
    Ok(Self {
      common,
      page_name: text(first, &["page_name"]),
      page_title: text(first, &["title"]),
      page_action: text(first, &["action"]),
      page_url: text(first, &["html_url"]),
      page_count: pages.map(|p| p.len() as u64),
    })
  }

  fn from_legacy(common: Common, row: &RawFields) -> Result<Self, RecordError> {
    let page_name = column_text(row, "payload_page_page_name");
    Ok(Self {
      common,
      page_count: page_name.as_ref().map(|_| 1),
      page_name,
      page_title: column_text(row, "payload_page_title"),
      page_action: column_text(row, "payload_page_action"),
      page_url: column_text(row, "payload_page_html_url"),
    })
  }
}

impl EventVariant for IssuesRecord {
  fn from_new(common: Common, payload: &Value) -> Result<Self, RecordError> {
    Ok(Self {
      common,
      action: text(payload, &["action"]),
      issue_number: nested_u64(payload, &["issue", "number"]),
      issue_url: text(payload, &["issue", "html_url"]),
    })
  }

  fn from_legacy(common: Common, row: &RawFields) -> Result<Self, RecordError> {
    let issue_url = column_text(row, "url");
    Ok(Self {
      common,
      action: column_text(row, "payload_action"),
      issue_number: column_u64(row, "payload_number")
        .or_else(|| issue_url.as_deref().and_then(issue_number_from_url)),
      issue_url,
    })
  }
}

impl EventVariant for PushRecord {
  fn from_new(common: Common, payload: &Value) -> Result<Self, RecordError> {
    Ok(Self {
      common,
      git_ref: text(payload, &["ref"]),
      head: text(payload, &["head"]),
      before: text(payload, &["before"]),
      commit_count: nested_u64(payload, &["size"]),
      distinct_commit_count: nested_u64(payload, &["distinct_size"]),
      distinct_count: None,
    })
  }

  fn from_legacy(common: Common, row: &RawFields) -> Result<Self, RecordError> {
    let commit_count = column_u64(row, "payload_size");
    Ok(Self {
      common,
      git_ref: column_text(row, "payload_ref"),
      head: column_text(row, "payload_head"),
      before: column_text(row, "payload_before"),
      commit_count,
      distinct_commit_count: None,
      // Timeline rows rarely carry a distinct count; every commit counts.
      distinct_count: column_u64(row, "payload_distinct_size").or(commit_count),
    })
  }
}

impl EventVariant for CommitCommentRecord {
  fn from_new(common: Common, payload: &Value) -> Result<Self, RecordError> {
    Ok(Self {
      common,
      commit_id: text(payload, &["comment", "commit_id"]),
      comment_id: nested_u64(payload, &["comment", "id"]),
      comment_url: text(payload, &["comment", "html_url"]),
      body: text(payload, &["comment", "body"]),
    })
  }

  fn from_legacy(common: Common, row: &RawFields) -> Result<Self, RecordError> {
    let commit_id = first_column(row, &["payload_commit_id", "payload_comment_commit_id"]);
    let comment_id = column_u64(row, "payload_comment_id");
    let comment_url = column_text(row, "payload_comment_html_url").or_else(|| {
      match (commit_id.as_deref(), comment_id) {
        (Some(commit), Some(id)) => Some(commit_comment_permalink(&common.repo, commit, id)),
        _ => None,
      }
    });
    Ok(Self {
      common,
      commit_id,
      comment_id,
      comment_url,
      body: column_text(row, "payload_comment_body"),
    })
  }
}

impl EventVariant for ReleaseRecord {
  fn from_new(common: Common, payload: &Value) -> Result<Self, RecordError> {
    Ok(Self {
      common,
      action: text(payload, &["action"]),
      tag_name: text(payload, &["release", "tag_name"]),
      release_name: text(payload, &["release", "name"]),
      release_url: text(payload, &["release", "html_url"]),
    })
  }

  fn from_legacy(common: Common, row: &RawFields) -> Result<Self, RecordError> {
    Ok(Self {
      common,
      action: column_text(row, "payload_action"),
      tag_name: column_text(row, "payload_release_tag_name"),
      release_name: column_text(row, "payload_release_name"),
      release_url: column_text(row, "payload_release_html_url"),
    })
  }
}

impl EventVariant for PublicRecord {
  fn from_new(common: Common, _payload: &Value) -> Result<Self, RecordError> {
    Ok(Self { common })
  }

  fn from_legacy(common: Common, _row: &RawFields) -> Result<Self, RecordError> {
    Ok(Self { common })
  }
}

impl EventVariant for MemberRecord {
  fn from_new(common: Common, payload: &Value) -> Result<Self, RecordError> {
    let member = text(payload, &["member", "login"]);
    Ok(Self {
      common,
      action: text(payload, &["action"]),
      member_lower: member.as_deref().map(str::to_lowercase),
      member,
    })
  }

  fn from_legacy(common: Common, row: &RawFields) -> Result<Self, RecordError> {
    let member = first_column(row, &["payload_member_login", "payload_member"]);
    Ok(Self {
      common,
      action: column_text(row, "payload_action"),
      member_lower: member.as_deref().map(str::to_lowercase),
      member,
    })
  }
}

impl EventVariant for IssueCommentRecord {
  fn from_new(common: Common, payload: &Value) -> Result<Self, RecordError> {
    Ok(Self {
      common,
      issue_number: nested_u64(payload, &["issue", "number"]),
      issue_url: text(payload, &["issue", "html_url"]),
      comment_url: text(payload, &["comment", "html_url"]),
      comment_id: nested_u64(payload, &["comment", "id"]),
      body: text(payload, &["comment", "body"]),
    })
  }

  fn from_legacy(common: Common, row: &RawFields) -> Result<Self, RecordError> {
    // Timeline `url` points at the issue, sometimes with a comment anchor.
    let issue_url = column(row, "url").map(|u| u.split('#').next().unwrap_or(u).to_string());
    let comment_id = column_u64(row, "payload_comment_id");
    let comment_url = column_text(row, "payload_comment_html_url").or_else(|| {
      match (issue_url.as_deref(), comment_id) {
        (Some(issue), Some(id)) => Some(issue_comment_permalink(issue, id)),
        _ => None,
      }
    });
    Ok(Self {
      common,
      issue_number: column_u64(row, "payload_number")
        .or_else(|| issue_url.as_deref().and_then(issue_number_from_url)),
      issue_url,
      comment_url,
      comment_id,
      body: column_text(row, "payload_comment_body"),
    })
  }
}

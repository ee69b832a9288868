//! The atomic observation: one entry per observed PR event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of activity an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Comment,
    Review,
    Commit,
    Ci,
    Event,
}

impl EntryType {
    /// Stable string form used in the store and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Review => "review",
            Self::Commit => "commit",
            Self::Ci => "ci",
            Self::Event => "event",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "comment" => Some(Self::Comment),
            "review" => Some(Self::Review),
            "commit" => Some(Self::Commit),
            "ci" => Some(Self::Ci),
            "event" => Some(Self::Event),
            _ => None,
        }
    }
}

/// Distinguishes the two comment surfaces GitHub exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentSubtype {
    /// Conversation-tab comment on the PR itself.
    IssueComment,
    /// Inline comment belonging to a review thread.
    ReviewComment,
}

impl CommentSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IssueComment => "issue_comment",
            Self::ReviewComment => "review_comment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "issue_comment" => Some(Self::IssueComment),
            "review_comment" => Some(Self::ReviewComment),
            _ => None,
        }
    }
}

/// What happened to a comment's file after the comment was left.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileActivity {
    /// Whether the file was modified after the comment.
    pub modified: bool,

    /// Number of later commits touching the file.
    pub commits_touching_file: i64,

    /// SHA of the most recent such commit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_commit: Option<String>,

    /// Timestamp of the most recent such commit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_commit_at: Option<DateTime<Utc>>,
}

/// Reaction accounting for a comment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reactions {
    /// Logins that reacted with a thumbs-up.
    #[serde(default)]
    pub thumbs_up_by: Vec<String>,
}

/// Stack metadata attached by a stack-provider plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphiteInfo {
    pub stack_id: String,
    pub stack_position: i64,
    pub stack_size: i64,
}

/// One observed PR-activity record. Immutable once stored; identity is
/// `(id, repo)` where `id` is the GitHub node id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// GitHub-assigned opaque node id.
    pub id: String,

    /// Repository slug (`owner/name`).
    pub repo: String,

    /// Pull request number.
    pub pr: i64,

    /// PR state at capture time.
    pub pr_state: super::PrState,

    /// PR author login.
    pub pr_author: String,

    /// PR title at capture time.
    pub pr_title: String,

    /// PR head branch.
    pub pr_branch: String,

    /// PR labels, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_labels: Option<Vec<String>>,

    /// Activity kind.
    #[serde(rename = "type")]
    pub entry_type: EntryType,

    /// Comment surface, present only for `type=comment`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<CommentSubtype>,

    /// Actor login.
    pub author: String,

    /// Canonical-casing login when it differs from `author`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_login: Option<String>,

    /// Comment/review/commit message body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Review state (lowercased: approved, changes_requested, commented,
    /// dismissed) for `type=review`; CI conclusion for `type=ci`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// File path for inline review comments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Line for inline review comments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,

    /// Numeric REST id, needed for REST comment edits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_id: Option<i64>,

    /// Thread resolution state; `None` means unknown. Only present for
    /// `subtype=review_comment`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_resolved: Option<bool>,

    /// File activity observed after an issue comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_activity_after: Option<FileActivity>,

    /// Reaction accounting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Reactions>,

    /// Stack-provider enrichment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graphite: Option<GraphiteInfo>,

    /// Web URL of the underlying object, when GitHub exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Source-side timestamp.
    pub created_at: DateTime<Utc>,

    /// Local observation timestamp. Always >= `created_at`.
    pub captured_at: DateTime<Utc>,
}

impl Entry {
    /// Whether this is an inline review-thread comment.
    pub fn is_review_comment(&self) -> bool {
        self.entry_type == EntryType::Comment && self.subtype == Some(CommentSubtype::ReviewComment)
    }

    /// Whether this is a conversation-tab comment.
    pub fn is_issue_comment(&self) -> bool {
        self.entry_type == EntryType::Comment && self.subtype == Some(CommentSubtype::IssueComment)
    }

    /// Comments by the PR author are stored but never actionable.
    pub fn is_self_comment(&self) -> bool {
        self.entry_type == EntryType::Comment
            && self.author.eq_ignore_ascii_case(&self.pr_author)
    }

    /// Short display form of the author's thumbs-up set, if captured.
    pub fn thumbs_up_by(&self) -> &[String] {
        self.reactions
            .as_ref()
            .map(|r| r.thumbs_up_by.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PrState;
    use chrono::TimeZone;

    fn make_entry(author: &str, pr_author: &str) -> Entry {
        Entry {
            id: "IC_abc123".to_string(),
            repo: "octo/widgets".to_string(),
            pr: 7,
            pr_state: PrState::Open,
            pr_author: pr_author.to_string(),
            pr_title: "Add widgets".to_string(),
            pr_branch: "feature/widgets".to_string(),
            pr_labels: None,
            entry_type: EntryType::Comment,
            subtype: Some(CommentSubtype::IssueComment),
            author: author.to_string(),
            author_login: None,
            body: Some("looks good".to_string()),
            state: None,
            file: None,
            line: None,
            database_id: Some(1001),
            thread_resolved: None,
            file_activity_after: None,
            reactions: None,
            graphite: None,
            url: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 0, 0).unwrap(),
            captured_at: Utc.with_ymd_and_hms(2025, 1, 2, 4, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_self_comment_is_case_insensitive() {
        assert!(make_entry("Alice", "alice").is_self_comment());
        assert!(!make_entry("bob", "alice").is_self_comment());
    }

    #[test]
    fn test_type_roundtrip() {
        for ty in [
            EntryType::Comment,
            EntryType::Review,
            EntryType::Commit,
            EntryType::Ci,
            EntryType::Event,
        ] {
            assert_eq!(EntryType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(EntryType::parse("bogus"), None);
    }

    #[test]
    fn test_optional_fields_skip_null() {
        let entry = make_entry("bob", "alice");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("thread_resolved"));
        assert!(!json.contains("graphite"));
        assert!(json.contains("\"type\":\"comment\""));
        assert!(json.contains("\"subtype\":\"issue_comment\""));
    }
}

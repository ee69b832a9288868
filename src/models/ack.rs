//! Local acknowledgement records overlaying remote comment state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One acknowledgement of a comment. Append-only; the newest record for a
/// `(repo, comment_id)` shadows older ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckRecord {
    /// Repository slug, so concurrent multi-repo use cannot collide.
    pub repo: String,

    /// Node id of the acknowledged comment.
    pub comment_id: String,

    /// PR the comment belongs to.
    pub pr: i64,

    /// When the ack was recorded locally.
    pub acked_at: DateTime<Utc>,

    /// Login that performed the ack, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acked_by: Option<String>,

    /// Whether the remote thumbs-up reaction succeeded.
    pub reaction_added: bool,
}

impl AckRecord {
    pub fn new(repo: impl Into<String>, comment_id: impl Into<String>, pr: i64) -> Self {
        Self {
            repo: repo.into(),
            comment_id: comment_id.into(),
            pr,
            acked_at: Utc::now(),
            acked_by: None,
            reaction_added: false,
        }
    }

    pub fn with_reaction(mut self, reaction_added: bool) -> Self {
        self.reaction_added = reaction_added;
        self
    }

    pub fn by(mut self, login: impl Into<String>) -> Self {
        self.acked_by = Some(login.into());
        self
    }
}

//! Categorised "needs attention" items.

use super::{GraphiteInfo, PrState};
use serde::{Deserialize, Serialize};

/// Whose PRs a surface is asking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Perspective {
    /// PRs authored by the configured user.
    Mine,
    /// PRs authored by everyone else.
    Reviews,
}

/// One categorised PR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionableItem {
    pub pr: i64,
    pub pr_title: String,
    pub pr_author: String,
    pub pr_branch: String,
    pub pr_state: PrState,

    /// Human summary, e.g. `3 unaddressed comments (carol: 2, bob: 1)`.
    pub description: String,

    /// Unaddressed-comment count for the unaddressed category; 1 otherwise.
    pub count: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub graphite: Option<GraphiteInfo>,
}

/// The four derivation buckets, in priority order. A PR appears in at most
/// one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionableReport {
    pub unaddressed: Vec<ActionableItem>,
    pub changes_requested: Vec<ActionableItem>,
    pub awaiting_review: Vec<ActionableItem>,
    pub stale: Vec<ActionableItem>,
}

impl ActionableReport {
    pub fn is_empty(&self) -> bool {
        self.unaddressed.is_empty()
            && self.changes_requested.is_empty()
            && self.awaiting_review.is_empty()
            && self.stale.is_empty()
    }

    /// Total item count across categories.
    pub fn len(&self) -> usize {
        self.unaddressed.len()
            + self.changes_requested.len()
            + self.awaiting_review.len()
            + self.stale.len()
    }
}

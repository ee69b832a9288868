//! Per-PR aggregate view derived from raw entries.

use super::{GraphiteInfo, PrState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Totals by entry type for one PR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    pub comments: i64,
    pub reviews: i64,
    pub commits: i64,
    pub ci: i64,
    pub events: i64,
}

/// Review roll-up over `type=review` entries, keyed by normalised state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewStateCounts {
    pub approved: i64,
    pub changes_requested: i64,
    pub commented: i64,
    pub dismissed: i64,
}

impl ReviewStateCounts {
    /// No review signal at all.
    pub fn is_empty(&self) -> bool {
        self.approved == 0 && self.changes_requested == 0 && self.commented == 0
    }
}

/// One worklist row per distinct PR observed in the input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorklistEntry {
    pub repo: String,
    pub pr: i64,
    pub pr_state: PrState,
    pub pr_title: String,
    pub pr_author: String,
    pub pr_branch: String,
    pub counts: TypeCounts,
    pub review_states: ReviewStateCounts,

    /// Max `created_at` across the PR's entries.
    pub last_activity_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub graphite: Option<GraphiteInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

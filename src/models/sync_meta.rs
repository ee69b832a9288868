//! Sync checkpoints, one per `(repo, scope)`.

use super::PrState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Partition of PR states a sync pass covers. Each scope carries its own
/// cursor so open-PR freshness is independent of closed-PR backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncScope {
    /// PRs in {open, draft}.
    Open,
    /// PRs in {closed, merged}.
    Closed,
}

impl SyncScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// The PR states this scope covers.
    pub fn states(&self) -> &'static [PrState] {
        match self {
            Self::Open => &[PrState::Open, PrState::Draft],
            Self::Closed => &[PrState::Closed, PrState::Merged],
        }
    }

    /// The scope a PR state belongs to.
    pub fn for_state(state: PrState) -> Self {
        if state.is_active() {
            Self::Open
        } else {
            Self::Closed
        }
    }
}

/// Checkpoint for one `(repo, scope)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMeta {
    pub repo: String,
    pub scope: SyncScope,

    /// When the scope last completed a clean pass.
    pub last_sync: DateTime<Utc>,

    /// PRs observed in that pass.
    pub pr_count: i64,

    /// Opaque listing cursor, reused only to resume an interrupted full
    /// listing; incremental correctness comes from the `since` cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_states() {
        assert_eq!(SyncScope::Open.states(), &[PrState::Open, PrState::Draft]);
        assert_eq!(
            SyncScope::Closed.states(),
            &[PrState::Closed, PrState::Merged]
        );
    }

    #[test]
    fn test_scope_for_state() {
        assert_eq!(SyncScope::for_state(PrState::Draft), SyncScope::Open);
        assert_eq!(SyncScope::for_state(PrState::Merged), SyncScope::Closed);
    }

    #[test]
    fn test_scope_roundtrip() {
        assert_eq!(SyncScope::parse("open"), Some(SyncScope::Open));
        assert_eq!(SyncScope::parse("closed"), Some(SyncScope::Closed));
        assert_eq!(SyncScope::parse("merged"), None);
    }
}

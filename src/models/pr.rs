//! Pull-request metadata cached per `(repo, pr)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Draft,
    Closed,
    Merged,
}

impl PrState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Draft => "draft",
            Self::Closed => "closed",
            Self::Merged => "merged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "draft" => Some(Self::Draft),
            "closed" => Some(Self::Closed),
            "merged" => Some(Self::Merged),
            _ => None,
        }
    }

    /// Open or draft: the PR still accepts activity.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::Draft)
    }

    /// Closed or merged.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Merged)
    }
}

/// One row per `(repo, pr)`, upserted on each sync, never deleted by sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrMeta {
    /// Repository slug (`owner/name`).
    pub repo: String,

    /// Pull request number.
    pub pr: i64,

    /// Current state.
    pub state: PrState,

    /// Title.
    pub title: String,

    /// Author login.
    pub author: String,

    /// Head branch.
    pub branch: String,

    /// Labels.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Draft flag as reported by GitHub (redundant with `state == Draft`,
    /// kept for surfaces that want the raw flag).
    pub draft: bool,

    /// Web URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Last remote activity timestamp.
    pub updated_at: DateTime<Utc>,

    /// When this row was last refreshed locally.
    pub cached_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for state in [PrState::Open, PrState::Draft, PrState::Closed, PrState::Merged] {
            assert_eq!(PrState::parse(state.as_str()), Some(state));
        }
        assert_eq!(PrState::parse("OPEN"), None);
    }

    #[test]
    fn test_active_vs_terminal() {
        assert!(PrState::Open.is_active());
        assert!(PrState::Draft.is_active());
        assert!(PrState::Closed.is_terminal());
        assert!(PrState::Merged.is_terminal());
        assert!(!PrState::Merged.is_active());
    }
}

//! Entry query predicates.
//!
//! Predicates compose by conjunction. The author include list is an OR
//! within; exclusion lists and bot patterns subtract. Everything that maps
//! to SQL is pushed into the WHERE clause; bot-pattern and label matching
//! happen as a post-filter in [`crate::db::entries`], before paging.

use crate::error::AppError;
use crate::models::{EntryType, PrState};
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};

/// Filter over the entries table.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    /// Exact repo slug.
    pub repo: Option<String>,

    /// Repo slug prefix (used instead of `repo` for owner-wide queries).
    pub repo_prefix: Option<String>,

    /// Restrict to these PR numbers.
    pub prs: Vec<i64>,

    /// Restrict to these entry types.
    pub types: Vec<EntryType>,

    /// Author include list (OR within; matched case-insensitively).
    pub authors: Vec<String>,

    /// Author deny list.
    pub exclude_authors: Vec<String>,

    /// Drop entries whose author matches any bot pattern.
    pub exclude_bots: bool,

    /// Case-insensitive regexes applied to `author` when `exclude_bots`.
    pub bot_patterns: Vec<String>,

    /// Case-insensitive substring over the PR's labels.
    pub label: Option<String>,

    /// Restrict to these PR states.
    pub states: Vec<PrState>,

    /// Keep entries with `created_at >= since`.
    pub since: Option<DateTime<Utc>>,

    /// Keep entries with `created_at < before`.
    pub before: Option<DateTime<Utc>>,

    /// Exact entry id.
    pub id: Option<String>,

    /// Exclude entries whose PR is closed/merged (ignored when `orphaned`).
    pub exclude_stale: bool,

    /// Restrict to closed/merged PRs that still have unresolved review
    /// threads.
    pub orphaned: bool,

    /// Bypass the freeze overlay (internal bulk-clear path only).
    pub include_frozen: bool,
}

impl EntryFilter {
    /// Filter scoped to one repo.
    pub fn for_repo(repo: impl Into<String>) -> Self {
        Self {
            repo: Some(repo.into()),
            ..Self::default()
        }
    }

    /// Filter scoped to one PR of a repo.
    pub fn for_pr(repo: impl Into<String>, pr: i64) -> Self {
        Self {
            repo: Some(repo.into()),
            prs: vec![pr],
            ..Self::default()
        }
    }

    /// Compile the configured bot patterns, case-insensitively.
    pub fn compiled_bot_patterns(&self) -> Result<Vec<Regex>, AppError> {
        self.bot_patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        AppError::validation_field(
                            format!("invalid bot pattern '{}': {}", p, e),
                            "bot_patterns",
                        )
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiled_bot_patterns() {
        let filter = EntryFilter {
            exclude_bots: true,
            bot_patterns: vec!["\\[bot\\]$".to_string(), "-bot$".to_string()],
            ..Default::default()
        };
        let regexes = filter.compiled_bot_patterns().unwrap();
        assert!(regexes.iter().any(|r| r.is_match("dependabot[bot]")));
        assert!(regexes.iter().any(|r| r.is_match("Sonar-Bot")));
        assert!(!regexes.iter().any(|r| r.is_match("bobalice")));
    }

    #[test]
    fn test_invalid_bot_pattern_is_validation_error() {
        let filter = EntryFilter {
            bot_patterns: vec!["([unclosed".to_string()],
            ..Default::default()
        };
        assert!(filter.compiled_bot_patterns().is_err());
    }
}

//! Per-PR aggregation of raw entries.

use crate::models::{Entry, EntryType, WorklistEntry};
use std::collections::HashMap;

/// Roll entries up into one row per distinct `(repo, pr)`.
///
/// PR fields come from the most recent entry; `last_activity_at` is the max
/// `created_at`; graphite metadata propagates from any carrying entry
/// (identical across a PR's entries by invariant). Output is ordered by
/// `last_activity_at` descending, then PR number ascending.
pub fn build_worklist(entries: &[Entry]) -> Vec<WorklistEntry> {
    let mut by_pr: HashMap<(String, i64), WorklistEntry> = HashMap::new();
    // Tracks which entry currently supplies each row's PR fields.
    let mut freshest: HashMap<(String, i64), chrono::DateTime<chrono::Utc>> = HashMap::new();

    for entry in entries {
        let key = (entry.repo.clone(), entry.pr);
        let row = by_pr.entry(key.clone()).or_insert_with(|| WorklistEntry {
            repo: entry.repo.clone(),
            pr: entry.pr,
            pr_state: entry.pr_state,
            pr_title: entry.pr_title.clone(),
            pr_author: entry.pr_author.clone(),
            pr_branch: entry.pr_branch.clone(),
            counts: Default::default(),
            review_states: Default::default(),
            last_activity_at: entry.created_at,
            graphite: None,
            url: Some(format!("https://github.com/{}/pull/{}", entry.repo, entry.pr)),
        });

        match entry.entry_type {
            EntryType::Comment => row.counts.comments += 1,
            EntryType::Review => row.counts.reviews += 1,
            EntryType::Commit => row.counts.commits += 1,
            EntryType::Ci => row.counts.ci += 1,
            EntryType::Event => row.counts.events += 1,
        }

        if entry.entry_type == EntryType::Review {
            match entry.state.as_deref().map(str::to_lowercase).as_deref() {
                Some("approved") => row.review_states.approved += 1,
                Some("changes_requested") => row.review_states.changes_requested += 1,
                Some("commented") => row.review_states.commented += 1,
                Some("dismissed") => row.review_states.dismissed += 1,
                _ => {}
            }
        }

        if entry.created_at > row.last_activity_at {
            row.last_activity_at = entry.created_at;
        }

        let newest = freshest.entry(key).or_insert(entry.created_at);
        if entry.created_at >= *newest {
            *newest = entry.created_at;
            row.pr_state = entry.pr_state;
            row.pr_title = entry.pr_title.clone();
            row.pr_author = entry.pr_author.clone();
            row.pr_branch = entry.pr_branch.clone();
        }

        if row.graphite.is_none() {
            row.graphite = entry.graphite.clone();
        }
    }

    let mut rows: Vec<WorklistEntry> = by_pr.into_values().collect();
    rows.sort_by(|a, b| {
        b.last_activity_at
            .cmp(&a.last_activity_at)
            .then(a.pr.cmp(&b.pr))
            .then(a.repo.cmp(&b.repo))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommentSubtype, PrState};
    use chrono::{TimeZone, Utc};

    fn entry(id: &str, pr: i64, entry_type: EntryType, hour: u32) -> Entry {
        Entry {
            id: id.to_string(),
            repo: "octo/widgets".to_string(),
            pr,
            pr_state: PrState::Open,
            pr_author: "alice".to_string(),
            pr_title: format!("PR {}", pr),
            pr_branch: "branch".to_string(),
            pr_labels: None,
            entry_type,
            subtype: (entry_type == EntryType::Comment).then_some(CommentSubtype::IssueComment),
            author: "bob".to_string(),
            author_login: None,
            body: None,
            state: None,
            file: None,
            line: None,
            database_id: None,
            thread_resolved: None,
            file_activity_after: None,
            reactions: None,
            graphite: None,
            url: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, hour, 0, 0).unwrap(),
            captured_at: Utc.with_ymd_and_hms(2025, 1, 2, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_counts_and_last_activity() {
        let mut review = entry("R_1", 1, EntryType::Review, 4);
        review.state = Some("APPROVED".to_string());

        let rows = build_worklist(&[
            entry("C_1", 1, EntryType::Comment, 2),
            entry("C_2", 1, EntryType::Comment, 3),
            review,
            entry("K_1", 1, EntryType::Commit, 5),
        ]);

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.counts.comments, 2);
        assert_eq!(row.counts.reviews, 1);
        assert_eq!(row.counts.commits, 1);
        assert_eq!(row.review_states.approved, 1);
        assert_eq!(
            row.last_activity_at,
            Utc.with_ymd_and_hms(2025, 1, 2, 5, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_pr_fields_follow_most_recent_entry() {
        let mut stale = entry("C_1", 1, EntryType::Comment, 2);
        stale.pr_title = "old title".to_string();
        let mut fresh = entry("C_2", 1, EntryType::Comment, 6);
        fresh.pr_title = "new title".to_string();
        fresh.pr_state = PrState::Merged;

        let rows = build_worklist(&[fresh, stale]);
        assert_eq!(rows[0].pr_title, "new title");
        assert_eq!(rows[0].pr_state, PrState::Merged);
    }

    #[test]
    fn test_ordering_last_activity_desc_pr_asc() {
        let rows = build_worklist(&[
            entry("A", 3, EntryType::Comment, 2),
            entry("B", 1, EntryType::Comment, 5),
            entry("C", 2, EntryType::Comment, 5),
        ]);
        let prs: Vec<i64> = rows.iter().map(|r| r.pr).collect();
        assert_eq!(prs, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        assert!(build_worklist(&[]).is_empty());
    }
}

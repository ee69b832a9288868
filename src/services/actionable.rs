//! Categorised "needs attention" derivation.
//!
//! Assigns each PR to at most one of four buckets, in priority order:
//! unaddressed feedback, changes requested, awaiting review, stale. The
//! ack overlay, bot patterns, and self-comment suppression apply here, not
//! in the query engine.

use crate::config::DEFAULT_BOT_PATTERNS;
use crate::error::AppError;
use crate::models::{
    ActionableItem, ActionableReport, Entry, EntryType, Perspective, PrState, WorklistEntry,
};
use crate::services::worklist::build_worklist;
use chrono::{DateTime, Duration, Utc};
use regex::{Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};

/// Days without activity before an open PR counts as stale.
pub const DEFAULT_STALE_DAYS: i64 = 3;

/// Author-count shown in an unaddressed description before "+N more".
const DESCRIPTION_AUTHOR_CAP: usize = 3;

/// Inputs to the derivation.
#[derive(Debug, Clone)]
pub struct DeriveOptions {
    /// Locally acknowledged comment ids.
    pub acked_ids: HashSet<String>,

    /// The configured user, for thumbs-up and commit signals.
    pub username: Option<String>,

    /// Treat the user's later commits as having read earlier comments.
    pub commit_implies_read: bool,

    /// PR states treated as live for the unaddressed check, overriding the
    /// open/draft default (bulk-ack on closed PRs passes these).
    pub pr_states: Option<Vec<PrState>>,

    /// Bot-author patterns, case-insensitive.
    pub bot_patterns: Vec<String>,

    /// Staleness bound in days.
    pub stale_days: i64,

    /// Frozen clock for the stale computation.
    pub now: DateTime<Utc>,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        Self {
            acked_ids: HashSet::new(),
            username: None,
            commit_implies_read: false,
            pr_states: None,
            bot_patterns: DEFAULT_BOT_PATTERNS.iter().map(|s| s.to_string()).collect(),
            stale_days: DEFAULT_STALE_DAYS,
            now: Utc::now(),
        }
    }
}

/// The raw comment entries currently unaddressed, in input order.
pub fn unaddressed_comments<'a>(
    entries: &'a [Entry],
    options: &DeriveOptions,
) -> Result<Vec<&'a Entry>, AppError> {
    let bots = compile_patterns(&options.bot_patterns)?;

    // Commits per (repo, pr), for the commit-implies-read signal.
    let mut commits: HashMap<(String, i64), Vec<&Entry>> = HashMap::new();
    for entry in entries.iter().filter(|e| e.entry_type == EntryType::Commit) {
        commits
            .entry((entry.repo.clone(), entry.pr))
            .or_default()
            .push(entry);
    }

    Ok(entries
        .iter()
        .filter(|e| e.entry_type == EntryType::Comment)
        .filter(|entry| {
            let key = (entry.repo.clone(), entry.pr);
            let pr_commits = commits.get(&key).map(Vec::as_slice).unwrap_or(&[]);
            is_unaddressed(entry, pr_commits, options, &bots)
        })
        .collect())
}

/// Derive the four-bucket report from raw entries.
pub fn derive_actionable(
    entries: &[Entry],
    options: &DeriveOptions,
) -> Result<ActionableReport, AppError> {
    let worklist = build_worklist(entries);

    // Unaddressed comments per (repo, pr).
    let mut unaddressed: HashMap<(String, i64), Vec<&Entry>> = HashMap::new();
    for entry in unaddressed_comments(entries, options)? {
        unaddressed
            .entry((entry.repo.clone(), entry.pr))
            .or_default()
            .push(entry);
    }

    let mut report = ActionableReport::default();
    for row in &worklist {
        let key = (row.repo.clone(), row.pr);

        if let Some(comments) = unaddressed.get(&key) {
            report
                .unaddressed
                .push(item(row, unaddressed_description(comments), comments.len() as i64));
            continue;
        }

        if row.pr_state.is_active() && row.review_states.changes_requested > 0 {
            report
                .changes_requested
                .push(item(row, "changes requested".to_string(), 1));
            continue;
        }

        if row.pr_state.is_active() && row.review_states.is_empty() {
            report
                .awaiting_review
                .push(item(row, "awaiting review".to_string(), 1));
            continue;
        }

        if row.pr_state == PrState::Open
            && row.review_states.changes_requested == 0
            && row.last_activity_at < options.now - Duration::days(options.stale_days)
        {
            let idle = (options.now - row.last_activity_at).num_days();
            report
                .stale
                .push(item(row, format!("no activity for {}d", idle), 1));
        }
    }

    Ok(report)
}

/// Drop items whose PR author does not match the requested perspective.
pub fn apply_perspective(
    report: &mut ActionableReport,
    perspective: Perspective,
    username: &str,
) {
    let keep = |item: &ActionableItem| -> bool {
        let mine = item.pr_author.eq_ignore_ascii_case(username);
        match perspective {
            Perspective::Mine => mine,
            Perspective::Reviews => !mine,
        }
    };
    report.unaddressed.retain(keep);
    report.changes_requested.retain(keep);
    report.awaiting_review.retain(keep);
    report.stale.retain(keep);
}

/// Whether one comment still needs a response.
fn is_unaddressed(
    entry: &Entry,
    pr_commits: &[&Entry],
    options: &DeriveOptions,
    bots: &[Regex],
) -> bool {
    let live = match &options.pr_states {
        Some(states) => states.contains(&entry.pr_state),
        None => entry.pr_state.is_active(),
    };
    if !live {
        return false;
    }
    if entry.is_self_comment() {
        return false;
    }
    if bots.iter().any(|r| r.is_match(&entry.author)) {
        return false;
    }

    if entry.is_review_comment() {
        // Remote resolution wins over everything, then the local ack.
        if entry.thread_resolved == Some(true) {
            return false;
        }
        return !options.acked_ids.contains(&entry.id);
    }

    // Issue comment signals, cheapest first.
    if options.acked_ids.contains(&entry.id) {
        return false;
    }
    if let Some(username) = &options.username {
        if entry
            .thumbs_up_by()
            .iter()
            .any(|login| login.eq_ignore_ascii_case(username))
        {
            return false;
        }
    }
    if entry
        .file_activity_after
        .as_ref()
        .map(|a| a.modified)
        .unwrap_or(false)
    {
        return false;
    }
    if options.commit_implies_read {
        if let Some(username) = &options.username {
            let read = pr_commits.iter().any(|c| {
                c.author.eq_ignore_ascii_case(username) && c.created_at > entry.created_at
            });
            if read {
                return false;
            }
        }
    }
    true
}

/// `N unaddressed comments (a: 2, b: 1 +2 more)`.
fn unaddressed_description(comments: &[&Entry]) -> String {
    let mut per_author: HashMap<&str, i64> = HashMap::new();
    for comment in comments {
        *per_author.entry(comment.author.as_str()).or_default() += 1;
    }

    let mut authors: Vec<(&str, i64)> = per_author.into_iter().collect();
    authors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let shown: Vec<String> = authors
        .iter()
        .take(DESCRIPTION_AUTHOR_CAP)
        .map(|(author, count)| format!("{}: {}", author, count))
        .collect();
    let more = authors.len().saturating_sub(DESCRIPTION_AUTHOR_CAP);

    let total = comments.len();
    let plural = if total == 1 { "" } else { "s" };
    if more > 0 {
        format!(
            "{} unaddressed comment{} ({} +{} more)",
            total,
            plural,
            shown.join(", "),
            more
        )
    } else {
        format!("{} unaddressed comment{} ({})", total, plural, shown.join(", "))
    }
}

fn item(row: &WorklistEntry, description: String, count: i64) -> ActionableItem {
    ActionableItem {
        pr: row.pr,
        pr_title: row.pr_title.clone(),
        pr_author: row.pr_author.clone(),
        pr_branch: row.pr_branch.clone(),
        pr_state: row.pr_state,
        description,
        count,
        url: row.url.clone(),
        graphite: row.graphite.clone(),
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, AppError> {
    patterns
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

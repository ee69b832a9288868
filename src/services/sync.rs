//! Incremental, scope-partitioned sync of PR activity into the store.
//!
//! A sync pass brings one `(repo, scope)` up to date: list PRs newest
//! activity first, stop once the listing falls behind the last checkpoint,
//! fetch each changed PR's child collections concurrently, normalise them
//! to entries, and commit each PR in a single transaction. The checkpoint
//! advances only after a clean pass.

use crate::db::{self, DbPool};
use crate::error::AppError;
use crate::models::{
    CommentSubtype, Entry, EntryType, FileActivity, PrMeta, Reactions, SyncMeta, SyncScope,
};
use crate::services::enrich::StackProvider;
use crate::services::github::{GithubClient, PrDetail, PrSummary};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Bounded fan-out across per-PR child fetches.
pub const DEFAULT_SYNC_CONCURRENCY: usize = 8;

/// Soft wall-clock bound for one scope pass.
pub const DEFAULT_SOFT_TIMEOUT_SECS: u64 = 600;

/// Full re-fetch or checkpoint-relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Incremental,
}

/// Knobs for one sync pass.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mode: SyncMode,
    pub concurrency: usize,
    pub soft_timeout: std::time::Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: SyncMode::Incremental,
            concurrency: DEFAULT_SYNC_CONCURRENCY,
            soft_timeout: std::time::Duration::from_secs(DEFAULT_SOFT_TIMEOUT_SECS),
        }
    }
}

/// Result of one scope pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncOutcome {
    pub repo: String,
    pub scope: SyncScope,

    /// PRs whose entries were refreshed.
    pub pr_count: i64,

    /// Entries upserted.
    pub entry_count: i64,

    /// Per-PR failures; these do not abort the pass.
    pub errors: Vec<String>,

    pub duration_ms: i64,

    /// Whether the checkpoint advanced (no cancellation, timeout, or
    /// per-PR failure).
    pub completed: bool,
}

/// Bring `(repo, scope)` up to date.
pub async fn sync_repo(
    pool: &DbPool,
    client: &GithubClient,
    repo: &str,
    scope: SyncScope,
    options: &SyncOptions,
    plugins: &[Box<dyn StackProvider>],
    cancel: &CancellationToken,
) -> Result<SyncOutcome, AppError> {
    let start = Instant::now();
    let deadline = start + options.soft_timeout;

    let meta = db::sync_meta::get_sync_meta(pool, repo, scope).await?;
    let (since, resume_cursor) = match (options.mode, &meta) {
        // Incremental correctness comes from the updated_at cutoff.
        (SyncMode::Incremental, Some(meta)) => (Some(meta.last_sync), None),
        // A full pass resumes a previously interrupted listing.
        (SyncMode::Full, Some(meta)) => (None, meta.cursor.clone()),
        _ => (None, None),
    };

    log::info!(
        "sync {} scope={} mode={:?} since={:?}",
        repo,
        scope.as_str(),
        options.mode,
        since
    );

    let mut outcome = SyncOutcome {
        repo: repo.to_string(),
        scope,
        pr_count: 0,
        entry_count: 0,
        errors: Vec::new(),
        duration_ms: 0,
        completed: true,
    };

    // Phase 1: list changed PRs, newest activity first.
    let mut changed: Vec<PrSummary> = Vec::new();
    let mut cursor = resume_cursor;
    let mut interrupted_cursor: Option<String> = None;
    loop {
        if cancel.is_cancelled() || Instant::now() > deadline {
            outcome.completed = false;
            interrupted_cursor = cursor;
            break;
        }

        let page = client
            .list_pull_requests(repo, scope.states(), cursor.as_deref())
            .await?;

        let mut fell_behind = false;
        for pr in page.nodes {
            if let Some(since) = since {
                if pr.updated_at <= since {
                    fell_behind = true;
                    break;
                }
            }
            changed.push(pr);
        }

        if fell_behind || !page.has_next_page {
            break;
        }
        cursor = page.end_cursor;
    }

    outcome.pr_count = changed.len() as i64;

    // Phase 2: per-PR child fetch + normalise + enrich + commit, bounded.
    let results: Vec<(i64, Result<usize, AppError>)> = stream::iter(changed)
        .map(|pr| {
            let client = client.clone();
            let pool = pool.clone();
            let repo = repo.to_string();
            let cancel = cancel.clone();
            async move {
                let number = pr.number;
                if cancel.is_cancelled() || Instant::now() > deadline {
                    return (number, Err(AppError::sync("skipped: pass interrupted")));
                }
                let result = sync_pr(&pool, &client, &repo, number, plugins).await;
                (number, result)
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    for (number, result) in results {
        match result {
            Ok(count) => outcome.entry_count += count as i64,
            Err(e) => {
                // Committed PRs stay; this one retries next pass via `since`
                log::warn!("sync {}#{}: {}", repo, number, e);
                outcome.errors.push(format!("PR #{}: {}", number, e));
                outcome.completed = false;
            }
        }
    }

    if cancel.is_cancelled() {
        outcome.completed = false;
    }

    // Phase 3: advance the checkpoint only after a clean pass. An
    // interrupted listing keeps its cursor so a full re-listing can resume.
    if outcome.completed {
        db::sync_meta::set_sync_meta(
            pool,
            &SyncMeta {
                repo: repo.to_string(),
                scope,
                last_sync: Utc::now(),
                pr_count: outcome.pr_count,
                cursor: None,
            },
        )
        .await?;
    } else if let (SyncMode::Full, Some(cursor)) = (options.mode, interrupted_cursor) {
        if let Some(mut meta) = meta {
            meta.cursor = Some(cursor);
            db::sync_meta::set_sync_meta(pool, &meta).await?;
        }
    }

    outcome.duration_ms = start.elapsed().as_millis() as i64;
    log::info!(
        "sync {} scope={}: {} PRs, {} entries, {} errors in {}ms",
        repo,
        scope.as_str(),
        outcome.pr_count,
        outcome.entry_count,
        outcome.errors.len(),
        outcome.duration_ms
    );

    Ok(outcome)
}

/// Sync one PR: fetch children, normalise, enrich, commit atomically.
async fn sync_pr(
    pool: &DbPool,
    client: &GithubClient,
    repo: &str,
    number: i64,
    plugins: &[Box<dyn StackProvider>],
) -> Result<usize, AppError> {
    let detail = client.fetch_pr_detail(repo, number).await?;
    let captured_at = Utc::now();
    let (meta, mut entries) = normalize_detail(repo, &detail, captured_at);

    for plugin in plugins {
        for entry in entries.iter_mut() {
            plugin.enrich(entry);
        }
    }

    let mut tx = pool.begin().await?;
    db::prs::upsert_pr_tx(&mut tx, &meta).await?;
    db::entries::upsert_entries_tx(&mut tx, &entries).await?;
    tx.commit().await?;

    Ok(entries.len())
}

/// Translate a fetched PR into its metadata row and entry batch. Pure.
pub fn normalize_detail(
    repo: &str,
    detail: &PrDetail,
    captured_at: DateTime<Utc>,
) -> (PrMeta, Vec<Entry>) {
    let pr = &detail.pr;
    let meta = PrMeta {
        repo: repo.to_string(),
        pr: pr.number,
        state: pr.state,
        title: pr.title.clone(),
        author: pr.author.clone(),
        branch: pr.branch.clone(),
        labels: pr.labels.clone(),
        draft: pr.draft,
        url: Some(pr.url.clone()),
        updated_at: pr.updated_at,
        cached_at: captured_at,
    };

    let labels = (!pr.labels.is_empty()).then(|| pr.labels.clone());
    let base = |id: &str, entry_type: EntryType, author: &str, created_at: DateTime<Utc>| Entry {
        id: id.to_string(),
        repo: repo.to_string(),
        pr: pr.number,
        pr_state: pr.state,
        pr_author: pr.author.clone(),
        pr_title: pr.title.clone(),
        pr_branch: pr.branch.clone(),
        pr_labels: labels.clone(),
        entry_type,
        subtype: None,
        author: author.to_string(),
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
        created_at,
        captured_at: captured_at.max(created_at),
    };

    let mut entries = Vec::new();

    for review in &detail.reviews {
        let mut entry = base(&review.id, EntryType::Review, &review.author, review.created_at);
        entry.state = Some(review.state.clone());
        entry.body = review.body.clone();
        entry.database_id = review.database_id;
        entry.url = review.url.clone();
        entries.push(entry);
    }

    for thread in &detail.threads {
        for comment in &thread.comments {
            let mut entry = base(
                &comment.id,
                EntryType::Comment,
                &comment.author,
                comment.created_at,
            );
            entry.subtype = Some(CommentSubtype::ReviewComment);
            entry.body = Some(comment.body.clone());
            entry.file = comment.file.clone();
            entry.line = comment.line;
            entry.database_id = comment.database_id;
            entry.thread_resolved = Some(thread.is_resolved);
            entry.url = comment.url.clone();
            entries.push(entry);
        }
    }

    for comment in &detail.issue_comments {
        let mut entry = base(
            &comment.id,
            EntryType::Comment,
            &comment.author,
            comment.created_at,
        );
        entry.subtype = Some(CommentSubtype::IssueComment);
        entry.body = Some(comment.body.clone());
        entry.database_id = comment.database_id;
        entry.reactions = Some(Reactions {
            thumbs_up_by: comment.thumbs_up_by.clone(),
        });
        entry.file_activity_after = file_activity_after(detail, &pr.author, comment.created_at);
        entry.url = comment.url.clone();
        entries.push(entry);
    }

    for commit in &detail.commits {
        let mut entry = base(&commit.id, EntryType::Commit, &commit.author, commit.committed_at);
        entry.body = Some(commit.message.clone());
        entry.state = Some(commit.oid.clone());
        entries.push(entry);
    }

    for check in &detail.checks {
        let mut entry = base(&check.id, EntryType::Ci, "ci", check.created_at);
        entry.body = Some(check.name.clone());
        entry.state = check.conclusion.clone().or_else(|| Some(check.status.clone()));
        entry.url = check.url.clone();
        entries.push(entry);
    }

    (meta, entries)
}

/// Author pushes after a comment count as addressing activity.
fn file_activity_after(
    detail: &PrDetail,
    pr_author: &str,
    comment_at: DateTime<Utc>,
) -> Option<FileActivity> {
    let mut later: Vec<_> = detail
        .commits
        .iter()
        .filter(|c| c.committed_at > comment_at && c.author.eq_ignore_ascii_case(pr_author))
        .collect();
    later.sort_by_key(|c| c.committed_at);
    let latest = later.last()?;
    Some(FileActivity {
        modified: true,
        commits_touching_file: later.len() as i64,
        latest_commit: Some(latest.oid.clone()),
        latest_commit_at: Some(latest.committed_at),
    })
}

/// Re-sync when the checkpoint is older than the staleness bound. With
/// `no_sync`, a cold cache is an error and a warm one is served as is.
#[allow(clippy::too_many_arguments)]
pub async fn ensure_fresh(
    pool: &DbPool,
    client: Option<&GithubClient>,
    repo: &str,
    scope: SyncScope,
    stale_threshold: Duration,
    no_sync: bool,
    plugins: &[Box<dyn StackProvider>],
    cancel: &CancellationToken,
) -> Result<Option<SyncOutcome>, AppError> {
    let meta = db::sync_meta::get_sync_meta(pool, repo, scope).await?;

    if no_sync {
        return match meta {
            Some(_) => Ok(None),
            None => Err(AppError::cache_miss(repo, scope.as_str())),
        };
    }

    let client = match client {
        Some(client) => client,
        None => {
            return match meta {
                Some(_) => Ok(None),
                None => Err(AppError::cache_miss(repo, scope.as_str())),
            }
        }
    };

    let options = match &meta {
        None => SyncOptions {
            mode: SyncMode::Full,
            ..Default::default()
        },
        Some(meta) if Utc::now() - meta.last_sync > stale_threshold => SyncOptions::default(),
        Some(_) => return Ok(None),
    };

    sync_repo(pool, client, repo, scope, &options, plugins, cancel)
        .await
        .map(Some)
}

/// Sync several repos in sequence, continuing past per-repo failures.
pub async fn sync_many(
    pool: &DbPool,
    client: &GithubClient,
    repos: &[String],
    scope: SyncScope,
    options: &SyncOptions,
    plugins: &[Box<dyn StackProvider>],
    cancel: &CancellationToken,
) -> Vec<(String, Result<SyncOutcome, AppError>)> {
    let mut results = Vec::with_capacity(repos.len());
    for repo in repos {
        if cancel.is_cancelled() {
            results.push((repo.clone(), Err(AppError::sync("cancelled"))));
            continue;
        }
        let result = sync_repo(pool, client, repo, scope, options, plugins, cancel).await;
        if let Err(e) = &result {
            log::warn!("sync {} failed: {}", repo, e);
        }
        results.push((repo.clone(), result));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PrState;
    use crate::services::github::{
        CheckData, CommitData, IssueCommentData, ReviewCommentData, ReviewData, ReviewThreadData,
    };
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, hour, 0, 0).unwrap()
    }

    fn detail() -> PrDetail {
        PrDetail {
            pr: PrSummary {
                node_id: "PR_1".into(),
                number: 10,
                title: "Add widgets".into(),
                state: PrState::Open,
                draft: false,
                author: "alice".into(),
                branch: "feature".into(),
                labels: vec!["bug".into()],
                updated_at: ts(6),
                url: "https://github.com/octo/widgets/pull/10".into(),
            },
            reviews: vec![ReviewData {
                id: "PRR_1".into(),
                database_id: Some(1),
                state: "changes_requested".into(),
                body: None,
                author: "bob".into(),
                created_at: ts(4),
                url: None,
            }],
            threads: vec![ReviewThreadData {
                thread_id: "PRT_1".into(),
                is_resolved: false,
                comments: vec![ReviewCommentData {
                    id: "PRRC_1".into(),
                    database_id: Some(2),
                    body: "rename this".into(),
                    author: "carol".into(),
                    created_at: ts(5),
                    file: Some("src/lib.rs".into()),
                    line: Some(10),
                    url: None,
                }],
            }],
            issue_comments: vec![IssueCommentData {
                id: "IC_1".into(),
                database_id: Some(3),
                body: "ping".into(),
                author: "bob".into(),
                created_at: ts(3),
                url: None,
                thumbs_up_by: vec!["alice".into()],
            }],
            commits: vec![CommitData {
                id: "C_1".into(),
                oid: "deadbeef".into(),
                message: "fix".into(),
                author: "alice".into(),
                committed_at: ts(7),
            }],
            checks: vec![CheckData {
                id: "CHK_1".into(),
                name: "ci/test".into(),
                status: "completed".into(),
                conclusion: Some("success".into()),
                created_at: ts(7),
                url: None,
            }],
        }
    }

    #[test]
    fn test_normalize_shapes() {
        let (meta, entries) = normalize_detail("octo/widgets", &detail(), ts(8));

        assert_eq!(meta.pr, 10);
        assert_eq!(meta.state, PrState::Open);
        assert_eq!(entries.len(), 5);

        let review = entries.iter().find(|e| e.id == "PRR_1").unwrap();
        assert_eq!(review.entry_type, EntryType::Review);
        assert_eq!(review.state.as_deref(), Some("changes_requested"));

        let thread_comment = entries.iter().find(|e| e.id == "PRRC_1").unwrap();
        assert_eq!(thread_comment.subtype, Some(CommentSubtype::ReviewComment));
        assert_eq!(thread_comment.thread_resolved, Some(false));
        assert_eq!(thread_comment.file.as_deref(), Some("src/lib.rs"));

        let issue_comment = entries.iter().find(|e| e.id == "IC_1").unwrap();
        assert_eq!(issue_comment.subtype, Some(CommentSubtype::IssueComment));
        assert_eq!(issue_comment.thumbs_up_by(), &["alice".to_string()]);
        // alice committed at 07:00, after bob's 03:00 comment
        let activity = issue_comment.file_activity_after.as_ref().unwrap();
        assert!(activity.modified);
        assert_eq!(activity.commits_touching_file, 1);

        let commit = entries.iter().find(|e| e.id == "C_1").unwrap();
        assert_eq!(commit.entry_type, EntryType::Commit);

        let check = entries.iter().find(|e| e.id == "CHK_1").unwrap();
        assert_eq!(check.entry_type, EntryType::Ci);
        assert_eq!(check.state.as_deref(), Some("success"));
    }

    #[test]
    fn test_captured_at_never_precedes_created_at() {
        let captured = ts(5);
        let (_, entries) = normalize_detail("octo/widgets", &detail(), captured);
        for entry in entries {
            assert!(entry.captured_at >= entry.created_at, "{}", entry.id);
        }
    }

    #[test]
    fn test_no_file_activity_without_later_author_commits() {
        let mut d = detail();
        d.commits[0].author = "mallory".into();
        let (_, entries) = normalize_detail("octo/widgets", &d, ts(8));
        let issue_comment = entries.iter().find(|e| e.id == "IC_1").unwrap();
        assert!(issue_comment.file_activity_after.is_none());
    }
}

//! Feedback actions: reply, resolve, ack, bulk ack, close.
//!
//! Each action calls GitHub first and then records the local overlay. The
//! remote thread state always wins at the next sync; local acks are
//! idempotent and lose their effect once `thread_resolved=true` is
//! observed. Bulk operations continue past per-item failures and report
//! per-item outcomes.

use crate::db::{self, DbPool, EntryFilter};
use crate::error::AppError;
use crate::models::{AckRecord, CommentSubtype, Entry, PrState};
use crate::services::actionable::{unaddressed_comments, DeriveOptions};
use crate::services::github::GithubClient;
use crate::services::ids::{short_id, IdResolver, Resolved};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Bounded fan-out for batch reactions and thread resolutions.
pub const DEFAULT_FEEDBACK_CONCURRENCY: usize = 8;

/// Structured payload for one feedback action, emitted as JSONL by the
/// surfaces.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedbackOutcome {
    pub ok: bool,
    pub repo: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr: Option<i64>,

    /// Short id of the affected comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Full node id of the affected comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gh_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub acked: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction_added: Option<bool>,

    /// Id of the comment a reply was posted under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed: Option<bool>,

    /// Comments handled by `close --feedback`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_count: Option<i64>,

    /// Threads resolved by `close --feedback`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_count: Option<i64>,

    /// Comments acked by a bulk ack.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acked_count: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeedbackOutcome {
    fn for_repo(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
            ..Default::default()
        }
    }
}

/// Aggregate status of a batch: used to pick the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    AllSucceeded,
    AllFailed,
    Partial,
}

/// Classify a batch by its per-item `ok` flags.
pub fn batch_status(outcomes: &[FeedbackOutcome]) -> BatchStatus {
    let ok = outcomes.iter().filter(|o| o.ok).count();
    if ok == outcomes.len() {
        BatchStatus::AllSucceeded
    } else if ok == 0 {
        BatchStatus::AllFailed
    } else {
        BatchStatus::Partial
    }
}

/// Coordinates feedback actions for one repo.
pub struct FeedbackPipeline<'a> {
    pool: &'a DbPool,
    client: &'a GithubClient,
    resolver: &'a IdResolver,
    repo: String,

    /// Configured login, recorded on ack rows and used by derivation.
    pub username: Option<String>,
    pub commit_implies_read: bool,
    pub bot_patterns: Vec<String>,
    pub concurrency: usize,
}

impl<'a> FeedbackPipeline<'a> {
    pub fn new(
        pool: &'a DbPool,
        client: &'a GithubClient,
        resolver: &'a IdResolver,
        repo: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            client,
            resolver,
            repo: repo.into(),
            username: None,
            commit_implies_read: false,
            bot_patterns: crate::config::DEFAULT_BOT_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            concurrency: DEFAULT_FEEDBACK_CONCURRENCY,
        }
    }

    /// Resolve a target to a comment entry or a bare PR number.
    async fn resolve_target(&self, target: &str) -> Result<ResolvedTarget, AppError> {
        match self.resolver.resolve(self.pool, &self.repo, target).await? {
            Resolved::Pr { pr } => Ok(ResolvedTarget::Pr(pr)),
            Resolved::Comment { entry, .. } => Ok(ResolvedTarget::Comment(*entry)),
            Resolved::Error { error, .. } => Err(error),
        }
    }

    /// Post a reply. On a PR number this is a conversation comment; on a
    /// review comment it lands in the comment's thread.
    pub async fn reply(&self, target: &str, body: &str) -> Result<FeedbackOutcome, AppError> {
        let mut outcome = FeedbackOutcome::for_repo(&self.repo);

        match self.resolve_target(target).await? {
            ResolvedTarget::Pr(pr) => {
                let node_id = self.client.pr_node_id(&self.repo, pr).await?;
                let created = self.client.add_issue_comment(&node_id, body).await?;
                outcome.ok = true;
                outcome.pr = Some(pr);
                outcome.id = Some(short_id(&created.id, &self.repo));
                outcome.gh_id = Some(created.id);
            }
            ResolvedTarget::Comment(entry) => {
                let created = if entry.is_review_comment() {
                    let threads = self
                        .client
                        .review_thread_map(&self.repo, entry.pr)
                        .await?;
                    let thread_id = threads.get(&entry.id).ok_or_else(|| {
                        AppError::not_found_with_id("review thread", entry.id.clone())
                    })?;
                    self.client.add_review_thread_reply(thread_id, body).await?
                } else {
                    let node_id = self.client.pr_node_id(&self.repo, entry.pr).await?;
                    self.client.add_issue_comment(&node_id, body).await?
                };
                outcome.ok = true;
                outcome.pr = Some(entry.pr);
                outcome.in_reply_to = Some(entry.id.clone());
                outcome.id = Some(short_id(&created.id, &self.repo));
                outcome.gh_id = Some(created.id);
            }
        }
        Ok(outcome)
    }

    /// Ack one comment: thumbs-up remotely (already-reacted is success),
    /// then record the overlay.
    pub async fn ack_comment(&self, entry: &Entry) -> Result<FeedbackOutcome, AppError> {
        let reaction_added = self.client.add_reaction(&entry.id).await?;

        let mut record =
            AckRecord::new(&self.repo, &entry.id, entry.pr).with_reaction(reaction_added);
        if let Some(username) = &self.username {
            record = record.by(username.clone());
        }
        db::acks::insert_ack(self.pool, &record).await?;

        let mut outcome = FeedbackOutcome::for_repo(&self.repo);
        outcome.ok = true;
        outcome.pr = Some(entry.pr);
        outcome.id = Some(short_id(&entry.id, &self.repo));
        outcome.gh_id = Some(entry.id.clone());
        outcome.acked = Some(true);
        outcome.reaction_added = Some(reaction_added);
        Ok(outcome)
    }

    /// Ack a target: a comment directly, or every unaddressed comment of a
    /// PR (reactions in parallel, one atomic ack batch regardless of
    /// individual reaction outcomes).
    pub async fn ack(
        &self,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<FeedbackOutcome, AppError> {
        match self.resolve_target(target).await? {
            ResolvedTarget::Comment(entry) => self.ack_comment(&entry).await,
            ResolvedTarget::Pr(pr) => self.ack_pr(pr, cancel).await,
        }
    }

    /// Bulk ack over every unaddressed comment of a PR.
    pub async fn ack_pr(
        &self,
        pr: i64,
        cancel: &CancellationToken,
    ) -> Result<FeedbackOutcome, AppError> {
        let targets = self.unaddressed_comments(pr).await?;

        let reaction_results = self.batch_reactions(&targets, cancel).await;

        let mut records = Vec::with_capacity(targets.len());
        for entry in &targets {
            let reaction_added = reaction_results.get(&entry.id).copied().unwrap_or(false);
            let mut record =
                AckRecord::new(&self.repo, &entry.id, entry.pr).with_reaction(reaction_added);
            if let Some(username) = &self.username {
                record = record.by(username.clone());
            }
            records.push(record);
        }
        db::acks::insert_acks(self.pool, &records).await?;

        let mut outcome = FeedbackOutcome::for_repo(&self.repo);
        outcome.ok = true;
        outcome.pr = Some(pr);
        outcome.acked = Some(true);
        outcome.acked_count = Some(targets.len() as i64);
        Ok(outcome)
    }

    /// Resolve a comment: review comments resolve their thread, issue
    /// comments fall back to a reaction ack (GitHub has no resolve for
    /// them). Both record the overlay.
    pub async fn resolve(&self, target: &str) -> Result<FeedbackOutcome, AppError> {
        let entry = match self.resolve_target(target).await? {
            ResolvedTarget::Comment(entry) => entry,
            ResolvedTarget::Pr(_) => {
                return Err(AppError::validation(
                    "resolve takes a comment id; use close --feedback for a whole PR",
                ))
            }
        };

        if entry.is_review_comment() {
            let threads = self.client.review_thread_map(&self.repo, entry.pr).await?;
            let thread_id = threads
                .get(&entry.id)
                .ok_or_else(|| AppError::not_found_with_id("review thread", entry.id.clone()))?;
            self.client.resolve_review_thread(thread_id).await?;

            let mut record = AckRecord::new(&self.repo, &entry.id, entry.pr);
            if let Some(username) = &self.username {
                record = record.by(username.clone());
            }
            db::acks::insert_ack(self.pool, &record).await?;

            let mut outcome = FeedbackOutcome::for_repo(&self.repo);
            outcome.ok = true;
            outcome.pr = Some(entry.pr);
            outcome.id = Some(short_id(&entry.id, &self.repo));
            outcome.gh_id = Some(entry.id.clone());
            outcome.resolved = Some(true);
            Ok(outcome)
        } else {
            let mut outcome = self.ack_comment(&entry).await?;
            outcome.resolved = Some(false);
            Ok(outcome)
        }
    }

    /// Close a PR (the human surface confirms before calling this).
    pub async fn close_pr(&self, pr: i64) -> Result<FeedbackOutcome, AppError> {
        let node_id = self.client.pr_node_id(&self.repo, pr).await?;
        self.client.close_pull_request(&node_id).await?;

        let mut outcome = FeedbackOutcome::for_repo(&self.repo);
        outcome.ok = true;
        outcome.pr = Some(pr);
        outcome.closed = Some(true);
        Ok(outcome)
    }

    /// Close out a PR's feedback: resolve every unresolved review thread
    /// and ack every comment without a resolvable thread.
    pub async fn close_feedback(
        &self,
        pr: i64,
        cancel: &CancellationToken,
    ) -> Result<FeedbackOutcome, AppError> {
        let targets = self.unaddressed_comments(pr).await?;

        let (review_comments, issue_comments): (Vec<&Entry>, Vec<&Entry>) = targets
            .iter()
            .partition(|e| e.subtype == Some(CommentSubtype::ReviewComment));

        // Thread resolutions, deduplicated (several comments share one
        // thread) and bounded.
        let mut resolved_count = 0i64;
        let mut errors: Vec<String> = Vec::new();
        if !review_comments.is_empty() {
            let threads = self.client.review_thread_map(&self.repo, pr).await?;
            let mut thread_ids: Vec<String> = review_comments
                .iter()
                .filter_map(|e| threads.get(&e.id).cloned())
                .collect();
            thread_ids.sort();
            thread_ids.dedup();

            let results: Vec<(String, Result<(), AppError>)> = stream::iter(thread_ids)
                .map(|thread_id| {
                    let client = self.client.clone();
                    let cancel = cancel.clone();
                    async move {
                        if cancel.is_cancelled() {
                            return (thread_id, Err(AppError::sync("cancelled")));
                        }
                        let result = client.resolve_review_thread(&thread_id).await;
                        (thread_id, result)
                    }
                })
                .buffer_unordered(self.concurrency.max(1))
                .collect()
                .await;

            for (thread_id, result) in results {
                match result {
                    Ok(()) => resolved_count += 1,
                    Err(e) => errors.push(format!("thread {}: {}", thread_id, e)),
                }
            }
        }

        // Reaction acks for the rest.
        let issue_refs: Vec<Entry> = issue_comments.iter().map(|e| (*e).clone()).collect();
        let reaction_results = self.batch_reactions(&issue_refs, cancel).await;

        // One overlay record per handled comment, atomically.
        let mut records = Vec::with_capacity(targets.len());
        for entry in &targets {
            let reaction_added = reaction_results.get(&entry.id).copied().unwrap_or(false);
            let mut record =
                AckRecord::new(&self.repo, &entry.id, entry.pr).with_reaction(reaction_added);
            if let Some(username) = &self.username {
                record = record.by(username.clone());
            }
            records.push(record);
        }
        db::acks::insert_acks(self.pool, &records).await?;

        let mut outcome = FeedbackOutcome::for_repo(&self.repo);
        outcome.ok = errors.is_empty();
        outcome.pr = Some(pr);
        outcome.closed_count = Some(targets.len() as i64);
        outcome.resolved_count = Some(resolved_count);
        if !errors.is_empty() {
            outcome.error = Some(errors.join("; "));
        }
        Ok(outcome)
    }

    /// Dispatch `close`: comment targets resolve-or-ack; PR numbers close
    /// the PR, or close its feedback with the flag.
    pub async fn close(
        &self,
        target: &str,
        feedback_only: bool,
        cancel: &CancellationToken,
    ) -> Result<FeedbackOutcome, AppError> {
        match self.resolve_target(target).await? {
            ResolvedTarget::Comment(entry) => self.resolve(&entry.id).await,
            ResolvedTarget::Pr(pr) if feedback_only => self.close_feedback(pr, cancel).await,
            ResolvedTarget::Pr(pr) => self.close_pr(pr).await,
        }
    }

    /// Fire thumbs-up reactions in parallel. Per-item failures are logged
    /// and reported as `reaction_added=false`, never fatal.
    async fn batch_reactions(
        &self,
        entries: &[Entry],
        cancel: &CancellationToken,
    ) -> HashMap<String, bool> {
        let results: Vec<(String, bool)> = stream::iter(entries.to_vec())
            .map(|entry| {
                let client = self.client.clone();
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return (entry.id, false);
                    }
                    match client.add_reaction(&entry.id).await {
                        Ok(added) => (entry.id, added),
                        Err(e) => {
                            log::warn!("reaction on {} failed: {}", entry.id, e);
                            (entry.id, false)
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency.max(1))
            .collect()
            .await;
        results.into_iter().collect()
    }

    /// The PR's currently unaddressed comments, via the derivation. For a
    /// closed/merged PR the PR's own state overrides the open/draft gate
    /// so bulk ack still works.
    async fn unaddressed_comments(&self, pr: i64) -> Result<Vec<Entry>, AppError> {
        let filter = EntryFilter::for_pr(&self.repo, pr);
        let entries = db::entries::query_entries(self.pool, &filter, None, None).await?;

        let pr_states: Option<Vec<PrState>> = entries
            .iter()
            .find(|e| e.pr == pr)
            .map(|e| vec![e.pr_state, PrState::Open, PrState::Draft]);

        let options = DeriveOptions {
            acked_ids: db::acks::acked_ids_for(self.pool, &self.repo).await?,
            username: self.username.clone(),
            commit_implies_read: self.commit_implies_read,
            pr_states,
            bot_patterns: self.bot_patterns.clone(),
            ..Default::default()
        };

        let unaddressed: Vec<Entry> = unaddressed_comments(&entries, &options)?
            .into_iter()
            .cloned()
            .collect();
        Ok(unaddressed)
    }
}

enum ResolvedTarget {
    Pr(i64),
    Comment(Entry),
}

//! Classification flow over a real store.
//!
//! Entries go in through the store, come back out through the query
//! engine, and land in the actionable derivation with the ack overlay
//! applied, the way the status surface drives the core.

use chrono::{DateTime, TimeZone, Utc};
use firewatch::db::{self, EntryFilter};
use firewatch::models::{AckRecord, CommentSubtype, Entry, EntryType, PrState};
use firewatch::services::actionable::{derive_actionable, DeriveOptions};
use tempfile::tempdir;

const REPO: &str = "octo/widgets";

fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
}

fn entry(id: &str, pr: i64, author: &str, created_at: DateTime<Utc>) -> Entry {
    Entry {
        id: id.to_string(),
        repo: REPO.to_string(),
        pr,
        pr_state: PrState::Open,
        pr_author: "alice".to_string(),
        pr_title: format!("PR {}", pr),
        pr_branch: "feature".to_string(),
        pr_labels: None,
        entry_type: EntryType::Comment,
        subtype: Some(CommentSubtype::IssueComment),
        author: author.to_string(),
        author_login: None,
        body: Some("comment body".to_string()),
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
        captured_at: created_at,
    }
}

fn review(id: &str, pr: i64, author: &str, state: &str, created_at: DateTime<Utc>) -> Entry {
    let mut e = entry(id, pr, author, created_at);
    e.entry_type = EntryType::Review;
    e.subtype = None;
    e.body = None;
    e.state = Some(state.to_string());
    e
}

fn review_comment(
    id: &str,
    pr: i64,
    author: &str,
    resolved: bool,
    created_at: DateTime<Utc>,
) -> Entry {
    let mut e = entry(id, pr, author, created_at);
    e.subtype = Some(CommentSubtype::ReviewComment);
    e.thread_resolved = Some(resolved);
    e.file = Some("src/lib.rs".to_string());
    e.line = Some(12);
    e
}

async fn setup() -> (tempfile::TempDir, firewatch::db::DbPool) {
    let dir = tempdir().unwrap();
    let pool = db::initialize(&db::db_path(dir.path())).await.unwrap();
    (dir, pool)
}

async fn derive(
    pool: &firewatch::db::DbPool,
    now: DateTime<Utc>,
) -> firewatch::models::ActionableReport {
    let entries = db::entries::query_entries(pool, &EntryFilter::for_repo(REPO), None, None)
        .await
        .unwrap();
    let options = DeriveOptions {
        acked_ids: db::acks::acked_ids_for(pool, REPO).await.unwrap(),
        now,
        ..Default::default()
    };
    derive_actionable(&entries, &options).unwrap()
}

#[tokio::test]
async fn classification_matrix_progression() {
    let (_dir, pool) = setup().await;
    let now = ts(3, 0);

    // S1: a changes-requested review plus a self comment.
    db::entries::upsert_entries(
        &pool,
        &[
            review("R_bob", 10, "bob", "changes_requested", ts(2, 4)),
            entry("IC_alice", 10, "alice", ts(2, 3)),
        ],
    )
    .await
    .unwrap();

    let report = derive(&pool, now).await;
    assert!(report.unaddressed.is_empty());
    assert_eq!(report.changes_requested.len(), 1);
    assert_eq!(report.changes_requested[0].pr, 10);

    // S2: an unresolved review comment now outranks changes-requested.
    db::entries::upsert_entries(
        &pool,
        &[review_comment("RC_carol", 10, "carol", false, ts(2, 5))],
    )
    .await
    .unwrap();

    let report = derive(&pool, now).await;
    assert_eq!(report.unaddressed.len(), 1);
    assert_eq!(report.unaddressed[0].pr, 10);
    assert!(report.changes_requested.is_empty());

    // S3: acking carol's comment restores changes-requested.
    db::acks::insert_ack(&pool, &AckRecord::new(REPO, "RC_carol", 10))
        .await
        .unwrap();

    let report = derive(&pool, now).await;
    assert!(report.unaddressed.is_empty());
    assert_eq!(report.changes_requested.len(), 1);

    // The raw entry is still visible to the query engine (overlay only
    // applies in the derivation).
    let raw = db::entries::query_entries(
        &pool,
        &EntryFilter {
            repo: Some(REPO.to_string()),
            id: Some("RC_carol".to_string()),
            ..Default::default()
        },
        None,
        None,
    )
    .await
    .unwrap();
    assert_eq!(raw.len(), 1);
}

#[tokio::test]
async fn stale_pr_surfaces_after_threshold() {
    let (_dir, pool) = setup().await;

    // S4: PR 13, open, one reviewed-with-comment entry ten days old.
    db::entries::upsert_entries(
        &pool,
        &[review("R_old", 13, "bob", "commented", ts(1, 0))],
    )
    .await
    .unwrap();

    let report = derive(&pool, ts(11, 0)).await;
    assert!(report.changes_requested.is_empty());
    assert!(report.awaiting_review.is_empty());
    assert_eq!(report.stale.len(), 1);
    assert_eq!(report.stale[0].pr, 13);

    // Within the threshold the same PR is quiet.
    let report = derive(&pool, ts(2, 0)).await;
    assert!(report.stale.is_empty());
}

#[tokio::test]
async fn resolved_thread_beats_missing_ack() {
    let (_dir, pool) = setup().await;

    db::entries::upsert_entries(
        &pool,
        &[review_comment("RC_done", 7, "carol", true, ts(2, 5))],
    )
    .await
    .unwrap();

    let report = derive(&pool, ts(3, 0)).await;
    assert!(report.unaddressed.is_empty());
    // No review signal either, so the PR awaits review.
    assert_eq!(report.awaiting_review.len(), 1);
}

#[tokio::test]
async fn remote_resolution_shadows_stale_ack() {
    let (_dir, pool) = setup().await;

    // Ack recorded first, then a sync observes the thread as resolved.
    db::acks::insert_ack(&pool, &AckRecord::new(REPO, "RC_x", 7))
        .await
        .unwrap();
    db::entries::upsert_entries(
        &pool,
        &[review_comment("RC_x", 7, "carol", true, ts(2, 5))],
    )
    .await
    .unwrap();

    let report = derive(&pool, ts(3, 0)).await;
    assert!(report.unaddressed.is_empty());
}

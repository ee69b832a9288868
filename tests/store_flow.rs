//! Store-level properties: upsert stability, re-sync idempotence, freeze
//! masking, bot exclusion, repo clearing.

use chrono::{DateTime, TimeZone, Utc};
use firewatch::db::{self, EntryFilter};
use firewatch::models::{
    AckRecord, CommentSubtype, Entry, EntryType, PrMeta, PrState, SyncMeta, SyncScope,
};
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
        pr_title: "title".to_string(),
        pr_branch: "feature".to_string(),
        pr_labels: Some(vec!["bug".to_string()]),
        entry_type: EntryType::Comment,
        subtype: Some(CommentSubtype::IssueComment),
        author: author.to_string(),
        author_login: None,
        body: Some("first".to_string()),
        state: None,
        file: None,
        line: None,
        database_id: Some(99),
        thread_resolved: None,
        file_activity_after: None,
        reactions: None,
        graphite: None,
        url: None,
        created_at,
        captured_at: created_at,
    }
}

async fn setup() -> (tempfile::TempDir, firewatch::db::DbPool) {
    let dir = tempdir().unwrap();
    let pool = db::initialize(&db::db_path(dir.path())).await.unwrap();
    (dir, pool)
}

#[tokio::test]
async fn reobservation_keeps_first_capture_and_newest_content() {
    let (_dir, pool) = setup().await;

    let first = entry("IC_1", 1, "bob", ts(2, 3));
    db::entries::upsert_entries(&pool, &[first.clone()])
        .await
        .unwrap();

    let mut second = first.clone();
    second.body = Some("edited".to_string());
    second.thread_resolved = None;
    second.captured_at = ts(5, 0);
    db::entries::upsert_entries(&pool, &[second]).await.unwrap();

    let got = db::entries::get_entry(&pool, REPO, "IC_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.body.as_deref(), Some("edited"));
    assert_eq!(got.captured_at, first.captured_at);
}

#[tokio::test]
async fn repeated_upsert_is_idempotent() {
    let (_dir, pool) = setup().await;

    let batch = vec![
        entry("IC_1", 1, "bob", ts(2, 3)),
        entry("IC_2", 1, "carol", ts(2, 4)),
        entry("IC_3", 2, "bob", ts(2, 5)),
    ];
    db::entries::upsert_entries(&pool, &batch).await.unwrap();
    let first_pass =
        db::entries::query_entries(&pool, &EntryFilter::for_repo(REPO), None, None)
            .await
            .unwrap();

    db::entries::upsert_entries(&pool, &batch).await.unwrap();
    let second_pass =
        db::entries::query_entries(&pool, &EntryFilter::for_repo(REPO), None, None)
            .await
            .unwrap();

    assert_eq!(
        serde_json::to_string(&first_pass).unwrap(),
        serde_json::to_string(&second_pass).unwrap()
    );
}

#[tokio::test]
async fn freeze_masks_newer_entries_only() {
    let (_dir, pool) = setup().await;

    db::entries::upsert_entries(
        &pool,
        &[
            entry("IC_old", 7, "bob", ts(2, 3)),
            entry("IC_new", 7, "bob", ts(4, 0)),
            entry("IC_other", 8, "bob", ts(4, 0)),
        ],
    )
    .await
    .unwrap();

    db::freeze::set_freeze(&pool, REPO, 7, ts(3, 0)).await.unwrap();

    let visible = db::entries::query_entries(&pool, &EntryFilter::for_repo(REPO), None, None)
        .await
        .unwrap();
    let ids: Vec<&str> = visible.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&"IC_old"));
    assert!(!ids.contains(&"IC_new"), "frozen-out entry leaked");
    // Other PRs are unaffected.
    assert!(ids.contains(&"IC_other"));

    // The internal bulk path can still see through the mask.
    let all = db::entries::query_entries(
        &pool,
        &EntryFilter {
            repo: Some(REPO.to_string()),
            include_frozen: true,
            ..Default::default()
        },
        None,
        None,
    )
    .await
    .unwrap();
    assert_eq!(all.len(), 3);

    db::freeze::clear_freeze(&pool, REPO, 7).await.unwrap();
    let visible = db::entries::query_entries(&pool, &EntryFilter::for_repo(REPO), None, None)
        .await
        .unwrap();
    assert_eq!(visible.len(), 3);
}

#[tokio::test]
async fn bot_patterns_exclude_matching_authors() {
    let (_dir, pool) = setup().await;

    db::entries::upsert_entries(
        &pool,
        &[
            entry("IC_1", 1, "dependabot[bot]", ts(2, 1)),
            entry("IC_2", 1, "sonar-bot", ts(2, 2)),
            entry("IC_3", 1, "bobalice", ts(2, 3)),
        ],
    )
    .await
    .unwrap();

    let filter = EntryFilter {
        repo: Some(REPO.to_string()),
        exclude_bots: true,
        bot_patterns: vec!["\\[bot\\]$".to_string(), "-bot$".to_string()],
        ..Default::default()
    };
    let kept = db::entries::query_entries(&pool, &filter, None, None)
        .await
        .unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].author, "bobalice");
}

#[tokio::test]
async fn clear_repo_removes_all_repo_state() {
    let (_dir, pool) = setup().await;

    db::entries::upsert_entries(&pool, &[entry("IC_1", 1, "bob", ts(2, 3))])
        .await
        .unwrap();
    db::prs::upsert_pr(
        &pool,
        &PrMeta {
            repo: REPO.to_string(),
            pr: 1,
            state: PrState::Open,
            title: "t".to_string(),
            author: "alice".to_string(),
            branch: "b".to_string(),
            labels: vec![],
            draft: false,
            url: None,
            updated_at: ts(2, 3),
            cached_at: ts(2, 3),
        },
    )
    .await
    .unwrap();
    db::acks::insert_ack(&pool, &AckRecord::new(REPO, "IC_1", 1))
        .await
        .unwrap();
    db::freeze::set_freeze(&pool, REPO, 1, ts(2, 3)).await.unwrap();
    db::sync_meta::set_sync_meta(
        &pool,
        &SyncMeta {
            repo: REPO.to_string(),
            scope: SyncScope::Open,
            last_sync: ts(2, 3),
            pr_count: 1,
            cursor: None,
        },
    )
    .await
    .unwrap();

    // A second repo that must survive.
    let mut other = entry("IC_9", 5, "bob", ts(2, 3));
    other.repo = "octo/gadgets".to_string();
    db::entries::upsert_entries(&pool, &[other]).await.unwrap();

    let removed = db::clear_repo(&pool, REPO).await.unwrap();
    assert_eq!(removed, 1);

    assert!(
        db::entries::query_entries(&pool, &EntryFilter::for_repo(REPO), None, None)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(db::acks::acked_ids_for(&pool, REPO).await.unwrap().is_empty());
    assert!(db::freeze::frozen_prs(&pool, Some(REPO)).await.unwrap().is_empty());
    assert!(db::sync_meta::get_sync_meta(&pool, REPO, SyncScope::Open)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        db::entries::query_entries(&pool, &EntryFilter::for_repo("octo/gadgets"), None, None)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn orphaned_selects_closed_prs_with_unresolved_threads() {
    let (_dir, pool) = setup().await;

    let mut resolved = entry("RC_ok", 1, "carol", ts(2, 1));
    resolved.subtype = Some(CommentSubtype::ReviewComment);
    resolved.thread_resolved = Some(true);
    resolved.pr_state = PrState::Merged;

    let mut dangling = entry("RC_bad", 2, "carol", ts(2, 2));
    dangling.subtype = Some(CommentSubtype::ReviewComment);
    dangling.thread_resolved = Some(false);
    dangling.pr_state = PrState::Closed;

    let mut open = entry("RC_open", 3, "carol", ts(2, 3));
    open.subtype = Some(CommentSubtype::ReviewComment);
    open.thread_resolved = Some(false);

    db::entries::upsert_entries(&pool, &[resolved, dangling, open])
        .await
        .unwrap();

    let filter = EntryFilter {
        repo: Some(REPO.to_string()),
        orphaned: true,
        ..Default::default()
    };
    let got = db::entries::query_entries(&pool, &filter, None, None)
        .await
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].id, "RC_bad");
}

#[tokio::test]
async fn atomic_ack_batch_lands_together() {
    let (_dir, pool) = setup().await;

    let records: Vec<AckRecord> = (0..5)
        .map(|i| AckRecord::new(REPO, format!("IC_{}", i), 42).with_reaction(i % 2 == 0))
        .collect();
    db::acks::insert_acks(&pool, &records).await.unwrap();

    let ids = db::acks::acked_ids_for(&pool, REPO).await.unwrap();
    assert_eq!(ids.len(), 5);
    for i in 0..5 {
        assert!(ids.contains(&format!("IC_{}", i)));
    }
}

//! Short-id round trips against a real store.

use chrono::{TimeZone, Utc};
use firewatch::db;
use firewatch::models::{CommentSubtype, Entry, EntryType, PrState};
use firewatch::services::ids::{short_id, IdResolver, Resolved};
use tempfile::tempdir;

const REPO: &str = "octo/widgets";

fn comment(id: &str, pr: i64) -> Entry {
    let created_at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 0, 0).unwrap();
    Entry {
        id: id.to_string(),
        repo: REPO.to_string(),
        pr,
        pr_state: PrState::Open,
        pr_author: "alice".to_string(),
        pr_title: "title".to_string(),
        pr_branch: "feature".to_string(),
        pr_labels: None,
        entry_type: EntryType::Comment,
        subtype: Some(CommentSubtype::ReviewComment),
        author: "carol".to_string(),
        author_login: None,
        body: Some("body".to_string()),
        state: None,
        file: Some("src/lib.rs".to_string()),
        line: Some(3),
        database_id: Some(17),
        thread_resolved: Some(false),
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
async fn batch_resolves_pr_numbers_and_short_ids() {
    let (_dir, pool) = setup().await;
    db::entries::upsert_entries(&pool, &[comment("PRRC_abc123xyz", 42)])
        .await
        .unwrap();

    let short = format!("@{}", short_id("PRRC_abc123xyz", REPO));
    let resolver = IdResolver::new();
    let results = resolver
        .resolve_batch(&pool, REPO, &["42".to_string(), short])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    match &results[0] {
        Resolved::Pr { pr } => assert_eq!(*pr, 42),
        other => panic!("expected pr, got {:?}", other),
    }
    match &results[1] {
        Resolved::Comment { id, short_id, entry } => {
            assert_eq!(id, "PRRC_abc123xyz");
            assert_eq!(short_id.len(), 5);
            assert_eq!(entry.pr, 42);
        }
        other => panic!("expected comment, got {:?}", other),
    }
}

#[tokio::test]
async fn warm_cache_resolves_without_store_reads() {
    let (_dir, pool) = setup().await;
    db::entries::upsert_entries(&pool, &[comment("PRRC_abc123xyz", 42)])
        .await
        .unwrap();

    let short = format!("@{}", short_id("PRRC_abc123xyz", REPO));
    let resolver = IdResolver::new();

    // First call rebuilds the index lazily.
    let first = resolver.resolve(&pool, REPO, &short).await.unwrap();
    assert!(matches!(first, Resolved::Comment { .. }));

    // Dropping the underlying rows proves the second call never touches
    // the store.
    db::clear_repo(&pool, REPO).await.unwrap();
    let second = resolver.resolve(&pool, REPO, &short).await.unwrap();
    match second {
        Resolved::Comment { id, .. } => assert_eq!(id, "PRRC_abc123xyz"),
        other => panic!("expected cached comment, got {:?}", other),
    }
}

#[tokio::test]
async fn full_ids_resolve_directly() {
    let (_dir, pool) = setup().await;
    db::entries::upsert_entries(&pool, &[comment("PRRC_abc123xyz", 42)])
        .await
        .unwrap();

    let resolver = IdResolver::new();
    let result = resolver
        .resolve(&pool, REPO, "PRRC_abc123xyz")
        .await
        .unwrap();
    match result {
        Resolved::Comment { entry, .. } => assert_eq!(entry.database_id, Some(17)),
        other => panic!("expected comment, got {:?}", other),
    }
}

#[tokio::test]
async fn bad_inputs_come_back_as_per_item_errors() {
    let (_dir, pool) = setup().await;

    let resolver = IdResolver::new();
    let results = resolver
        .resolve_batch(
            &pool,
            REPO,
            &["!!!".to_string(), "@fffff".to_string(), "7".to_string()],
        )
        .await
        .unwrap();

    assert!(matches!(results[0], Resolved::Error { .. }));
    // Valid shape, nothing behind it.
    assert!(matches!(results[1], Resolved::Error { .. }));
    assert!(matches!(results[2], Resolved::Pr { pr: 7 }));
}

#[tokio::test]
async fn short_ids_are_stable_across_resolvers() {
    let (_dir, pool) = setup().await;
    db::entries::upsert_entries(&pool, &[comment("PRRC_abc123xyz", 42)])
        .await
        .unwrap();

    let short = format!("@{}", short_id("PRRC_abc123xyz", REPO));
    for _ in 0..3 {
        let resolver = IdResolver::new();
        let result = resolver.resolve(&pool, REPO, &short).await.unwrap();
        match result {
            Resolved::Comment { id, .. } => assert_eq!(id, "PRRC_abc123xyz"),
            other => panic!("expected comment, got {:?}", other),
        }
    }
}

//! Local store: entries, PR metadata, sync checkpoints, acks, freezes.
//!
//! All access goes through free functions over a shared [`DbPool`]. The
//! entries table is an append-only observation log; nothing in this module
//! mutates an entry after first capture except content-field refresh on
//! re-observation.

pub mod acks;
pub mod entries;
pub mod filter;
pub mod freeze;
pub mod pool;
pub mod prs;
pub mod sync_meta;

pub use filter::EntryFilter;
pub use pool::DbPool;

use crate::error::AppError;
use std::path::{Path, PathBuf};

/// Path of the SQLite database file inside the data directory.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("firewatch.db")
}

/// Open the pool and create the schema if missing.
pub async fn initialize(path: &Path) -> Result<DbPool, AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::store_with_op(e.to_string(), "create data dir"))?;
    }

    let pool = pool::create_pool(path)
        .await
        .map_err(|e| AppError::store_with_op(e.to_string(), "open pool"))?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Idempotent schema creation. Schema evolution is out of scope; every
/// statement is `IF NOT EXISTS`.
async fn create_schema(pool: &DbPool) -> Result<(), AppError> {
    const STATEMENTS: &[&str] = &[
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            id TEXT NOT NULL,
            repo TEXT NOT NULL,
            pr INTEGER NOT NULL,
            pr_state TEXT NOT NULL,
            pr_author TEXT NOT NULL,
            pr_title TEXT NOT NULL,
            pr_branch TEXT NOT NULL,
            pr_labels TEXT,
            entry_type TEXT NOT NULL,
            subtype TEXT,
            author TEXT NOT NULL,
            author_login TEXT,
            body TEXT,
            state TEXT,
            file TEXT,
            line INTEGER,
            database_id INTEGER,
            thread_resolved INTEGER,
            file_activity TEXT,
            reactions TEXT,
            graphite TEXT,
            url TEXT,
            created_at TEXT NOT NULL,
            captured_at TEXT NOT NULL,
            PRIMARY KEY (id, repo)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_entries_repo_pr ON entries(repo, pr)",
        "CREATE INDEX IF NOT EXISTS idx_entries_repo_created ON entries(repo, created_at)",
        r#"
        CREATE TABLE IF NOT EXISTS pull_requests (
            repo TEXT NOT NULL,
            pr INTEGER NOT NULL,
            state TEXT NOT NULL,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            branch TEXT NOT NULL,
            labels TEXT NOT NULL DEFAULT '[]',
            draft INTEGER NOT NULL DEFAULT 0,
            url TEXT,
            updated_at TEXT NOT NULL,
            cached_at TEXT NOT NULL,
            PRIMARY KEY (repo, pr)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sync_meta (
            repo TEXT NOT NULL,
            scope TEXT NOT NULL,
            last_sync TEXT NOT NULL,
            pr_count INTEGER NOT NULL DEFAULT 0,
            cursor TEXT,
            PRIMARY KEY (repo, scope)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS acks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repo TEXT NOT NULL,
            comment_id TEXT NOT NULL,
            pr INTEGER NOT NULL,
            acked_at TEXT NOT NULL,
            acked_by TEXT,
            reaction_added INTEGER NOT NULL DEFAULT 0
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_acks_repo_comment ON acks(repo, comment_id)",
        r#"
        CREATE TABLE IF NOT EXISTS freezes (
            repo TEXT NOT NULL,
            pr INTEGER NOT NULL,
            frozen_at TEXT NOT NULL,
            PRIMARY KEY (repo, pr)
        )
        "#,
    ];

    for stmt in STATEMENTS {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(|e| AppError::store_with_op(e.to_string(), "create schema"))?;
    }

    Ok(())
}

/// Remove everything the store knows about a repo: entries, PR metadata,
/// acks, freezes, and sync checkpoints, in one transaction.
pub async fn clear_repo(pool: &DbPool, repo: &str) -> Result<u64, AppError> {
    let mut tx = pool.begin().await?;

    let entries = sqlx::query("DELETE FROM entries WHERE repo = ?")
        .bind(repo)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM pull_requests WHERE repo = ?")
        .bind(repo)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM acks WHERE repo = ?")
        .bind(repo)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM freezes WHERE repo = ?")
        .bind(repo)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM sync_meta WHERE repo = ?")
        .bind(repo)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_initialize_creates_schema() {
        let dir = tempdir().unwrap();
        let pool = initialize(&db_path(dir.path())).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        for expected in ["entries", "pull_requests", "sync_meta", "acks", "freezes"] {
            assert!(names.contains(&expected), "missing table {}", expected);
        }
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = db_path(dir.path());
        initialize(&path).await.unwrap();
        initialize(&path).await.unwrap();
    }
}

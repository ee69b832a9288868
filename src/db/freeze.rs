//! Freeze table: per-PR timestamps masking newer activity from queries.

use crate::db::DbPool;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One freeze row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FreezeRow {
    pub repo: String,
    pub pr: i64,
    pub frozen_at: DateTime<Utc>,
}

/// Freeze a PR at a timestamp. Re-freezing overwrites the timestamp.
pub async fn set_freeze(
    pool: &DbPool,
    repo: &str,
    pr: i64,
    frozen_at: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO freezes (repo, pr, frozen_at)
        VALUES (?, ?, ?)
        ON CONFLICT(repo, pr) DO UPDATE SET frozen_at = excluded.frozen_at
        "#,
    )
    .bind(repo)
    .bind(pr)
    .bind(frozen_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Unfreeze a PR. Returns whether a freeze row existed.
pub async fn clear_freeze(pool: &DbPool, repo: &str, pr: i64) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM freezes WHERE repo = ? AND pr = ?")
        .bind(repo)
        .bind(pr)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Frozen PRs, optionally restricted to one repo.
pub async fn frozen_prs(pool: &DbPool, repo: Option<&str>) -> Result<Vec<FreezeRow>, AppError> {
    let rows = match repo {
        Some(repo) => {
            sqlx::query_as("SELECT * FROM freezes WHERE repo = ? ORDER BY pr")
                .bind(repo)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM freezes ORDER BY repo, pr")
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}

/// The freeze timestamp for one PR, if frozen.
pub async fn get_freeze(
    pool: &DbPool,
    repo: &str,
    pr: i64,
) -> Result<Option<DateTime<Utc>>, AppError> {
    let row: Option<(DateTime<Utc>,)> =
        sqlx::query_as("SELECT frozen_at FROM freezes WHERE repo = ? AND pr = ?")
            .bind(repo)
            .bind(pr)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(ts,)| ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_freeze_roundtrip() {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&db::db_path(dir.path())).await.unwrap();

        let ts = Utc::now();
        set_freeze(&pool, "octo/widgets", 7, ts).await.unwrap();

        let rows = frozen_prs(&pool, Some("octo/widgets")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pr, 7);

        assert!(clear_freeze(&pool, "octo/widgets", 7).await.unwrap());
        assert!(!clear_freeze(&pool, "octo/widgets", 7).await.unwrap());
        assert!(get_freeze(&pool, "octo/widgets", 7).await.unwrap().is_none());
    }
}

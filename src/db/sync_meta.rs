//! Sync checkpoint persistence.

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::{SyncMeta, SyncScope};
use chrono::{DateTime, Utc};

#[derive(Debug, sqlx::FromRow)]
struct SyncMetaRow {
    repo: String,
    scope: String,
    last_sync: DateTime<Utc>,
    pr_count: i64,
    cursor: Option<String>,
}

impl SyncMetaRow {
    fn into_meta(self) -> Result<SyncMeta, AppError> {
        let scope = SyncScope::parse(&self.scope).ok_or_else(|| {
            AppError::store_with_op(format!("unknown scope '{}'", self.scope), "decode sync meta")
        })?;
        Ok(SyncMeta {
            repo: self.repo,
            scope,
            last_sync: self.last_sync,
            pr_count: self.pr_count,
            cursor: self.cursor,
        })
    }
}

/// Write the checkpoint for a `(repo, scope)`.
pub async fn set_sync_meta(pool: &DbPool, meta: &SyncMeta) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO sync_meta (repo, scope, last_sync, pr_count, cursor)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(repo, scope) DO UPDATE SET
            last_sync = excluded.last_sync,
            pr_count = excluded.pr_count,
            cursor = excluded.cursor
        "#,
    )
    .bind(&meta.repo)
    .bind(meta.scope.as_str())
    .bind(meta.last_sync)
    .bind(meta.pr_count)
    .bind(&meta.cursor)
    .execute(pool)
    .await?;
    Ok(())
}

/// Read the checkpoint for a `(repo, scope)`.
pub async fn get_sync_meta(
    pool: &DbPool,
    repo: &str,
    scope: SyncScope,
) -> Result<Option<SyncMeta>, AppError> {
    let row: Option<SyncMetaRow> =
        sqlx::query_as("SELECT * FROM sync_meta WHERE repo = ? AND scope = ?")
            .bind(repo)
            .bind(scope.as_str())
            .fetch_optional(pool)
            .await?;
    row.map(SyncMetaRow::into_meta).transpose()
}

/// Every checkpoint in the store.
pub async fn all_sync_meta(pool: &DbPool) -> Result<Vec<SyncMeta>, AppError> {
    let rows: Vec<SyncMetaRow> =
        sqlx::query_as("SELECT * FROM sync_meta ORDER BY repo, scope")
            .fetch_all(pool)
            .await?;
    rows.into_iter().map(SyncMetaRow::into_meta).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_checkpoint_roundtrip() {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&db::db_path(dir.path())).await.unwrap();

        let meta = SyncMeta {
            repo: "octo/widgets".to_string(),
            scope: SyncScope::Open,
            last_sync: Utc::now(),
            pr_count: 4,
            cursor: Some("Y3Vyc29y".to_string()),
        };
        set_sync_meta(&pool, &meta).await.unwrap();

        let got = get_sync_meta(&pool, "octo/widgets", SyncScope::Open)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.pr_count, 4);
        assert_eq!(got.cursor.as_deref(), Some("Y3Vyc29y"));

        assert!(get_sync_meta(&pool, "octo/widgets", SyncScope::Closed)
            .await
            .unwrap()
            .is_none());
        assert_eq!(all_sync_meta(&pool).await.unwrap().len(), 1);
    }
}

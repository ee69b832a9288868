//! Pull-request metadata persistence.

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::{PrMeta, PrState};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};

#[derive(Debug, sqlx::FromRow)]
struct PrRow {
    repo: String,
    pr: i64,
    state: String,
    title: String,
    author: String,
    branch: String,
    labels: String,
    draft: bool,
    url: Option<String>,
    updated_at: DateTime<Utc>,
    cached_at: DateTime<Utc>,
}

impl PrRow {
    fn into_meta(self) -> Result<PrMeta, AppError> {
        let state = PrState::parse(&self.state).ok_or_else(|| {
            AppError::store_with_op(format!("unknown pr state '{}'", self.state), "decode pr")
        })?;
        let labels = serde_json::from_str(&self.labels)
            .map_err(|e| AppError::store_with_op(e.to_string(), "decode pr labels"))?;
        Ok(PrMeta {
            repo: self.repo,
            pr: self.pr,
            state,
            title: self.title,
            author: self.author,
            branch: self.branch,
            labels,
            draft: self.draft,
            url: self.url,
            updated_at: self.updated_at,
            cached_at: self.cached_at,
        })
    }
}

/// Upsert one PR metadata row inside an open transaction.
pub async fn upsert_pr_tx(tx: &mut Transaction<'_, Sqlite>, meta: &PrMeta) -> Result<(), AppError> {
    let labels = serde_json::to_string(&meta.labels)
        .map_err(|e| AppError::store_with_op(e.to_string(), "encode pr labels"))?;

    sqlx::query(
        r#"
        INSERT INTO pull_requests (
            repo, pr, state, title, author, branch, labels, draft, url, updated_at, cached_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(repo, pr) DO UPDATE SET
            state = excluded.state,
            title = excluded.title,
            author = excluded.author,
            branch = excluded.branch,
            labels = excluded.labels,
            draft = excluded.draft,
            url = excluded.url,
            updated_at = excluded.updated_at,
            cached_at = excluded.cached_at
        "#,
    )
    .bind(&meta.repo)
    .bind(meta.pr)
    .bind(meta.state.as_str())
    .bind(&meta.title)
    .bind(&meta.author)
    .bind(&meta.branch)
    .bind(labels)
    .bind(meta.draft)
    .bind(&meta.url)
    .bind(meta.updated_at)
    .bind(meta.cached_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Upsert one PR metadata row in its own transaction.
pub async fn upsert_pr(pool: &DbPool, meta: &PrMeta) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    upsert_pr_tx(&mut tx, meta).await?;
    tx.commit().await?;
    Ok(())
}

/// Fetch one PR's metadata.
pub async fn get_pr(pool: &DbPool, repo: &str, pr: i64) -> Result<Option<PrMeta>, AppError> {
    let row: Option<PrRow> =
        sqlx::query_as("SELECT * FROM pull_requests WHERE repo = ? AND pr = ?")
            .bind(repo)
            .bind(pr)
            .fetch_optional(pool)
            .await?;
    row.map(PrRow::into_meta).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_upsert_overwrites_state() {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&db::db_path(dir.path())).await.unwrap();

        let mut meta = PrMeta {
            repo: "octo/widgets".to_string(),
            pr: 7,
            state: PrState::Open,
            title: "Add widgets".to_string(),
            author: "alice".to_string(),
            branch: "feature/widgets".to_string(),
            labels: vec!["bug".to_string()],
            draft: false,
            url: None,
            updated_at: Utc::now(),
            cached_at: Utc::now(),
        };
        upsert_pr(&pool, &meta).await.unwrap();

        meta.state = PrState::Merged;
        meta.title = "Add widgets (v2)".to_string();
        upsert_pr(&pool, &meta).await.unwrap();

        let got = get_pr(&pool, "octo/widgets", 7).await.unwrap().unwrap();
        assert_eq!(got.state, PrState::Merged);
        assert_eq!(got.title, "Add widgets (v2)");
        assert_eq!(got.labels, vec!["bug".to_string()]);
    }
}

//! Acknowledgement overlay persistence.
//!
//! Records are append-only; reads collapse to the newest record per
//! `(repo, comment_id)`.

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::AckRecord;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

#[derive(Debug, sqlx::FromRow)]
struct AckRow {
    repo: String,
    comment_id: String,
    pr: i64,
    acked_at: DateTime<Utc>,
    acked_by: Option<String>,
    reaction_added: bool,
}

impl From<AckRow> for AckRecord {
    fn from(row: AckRow) -> Self {
        AckRecord {
            repo: row.repo,
            comment_id: row.comment_id,
            pr: row.pr,
            acked_at: row.acked_at,
            acked_by: row.acked_by,
            reaction_added: row.reaction_added,
        }
    }
}

/// Insert one ack record.
pub async fn insert_ack(pool: &DbPool, record: &AckRecord) -> Result<(), AppError> {
    insert_acks(pool, std::slice::from_ref(record)).await
}

/// Insert a batch of ack records atomically: either every record commits
/// or none do.
pub async fn insert_acks(pool: &DbPool, records: &[AckRecord]) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    for record in records {
        sqlx::query(
            r#"
            INSERT INTO acks (repo, comment_id, pr, acked_at, acked_by, reaction_added)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.repo)
        .bind(&record.comment_id)
        .bind(record.pr)
        .bind(record.acked_at)
        .bind(&record.acked_by)
        .bind(record.reaction_added)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Every acked comment id for a repo.
pub async fn acked_ids_for(pool: &DbPool, repo: &str) -> Result<HashSet<String>, AppError> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT DISTINCT comment_id FROM acks WHERE repo = ?")
            .bind(repo)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// The newest ack record for a comment, if any.
pub async fn latest_ack(
    pool: &DbPool,
    repo: &str,
    comment_id: &str,
) -> Result<Option<AckRecord>, AppError> {
    let row: Option<AckRow> = sqlx::query_as(
        r#"
        SELECT repo, comment_id, pr, acked_at, acked_by, reaction_added
        FROM acks
        WHERE repo = ? AND comment_id = ?
        ORDER BY acked_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(repo)
    .bind(comment_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(AckRecord::from))
}

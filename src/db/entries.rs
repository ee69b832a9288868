//! Entry log persistence and the query path.

use crate::db::filter::EntryFilter;
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::{CommentSubtype, Entry, EntryType, PrState};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};

/// Raw row shape of the entries table.
#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: String,
    repo: String,
    pr: i64,
    pr_state: String,
    pr_author: String,
    pr_title: String,
    pr_branch: String,
    pr_labels: Option<String>,
    entry_type: String,
    subtype: Option<String>,
    author: String,
    author_login: Option<String>,
    body: Option<String>,
    state: Option<String>,
    file: Option<String>,
    line: Option<i64>,
    database_id: Option<i64>,
    thread_resolved: Option<bool>,
    file_activity: Option<String>,
    reactions: Option<String>,
    graphite: Option<String>,
    url: Option<String>,
    created_at: DateTime<Utc>,
    captured_at: DateTime<Utc>,
}

impl EntryRow {
    fn into_entry(self) -> Result<Entry, AppError> {
        let entry_type = EntryType::parse(&self.entry_type).ok_or_else(|| {
            AppError::store_with_op(
                format!("unknown entry type '{}'", self.entry_type),
                "decode entry",
            )
        })?;
        let subtype = match self.subtype.as_deref() {
            None => None,
            Some(s) => Some(CommentSubtype::parse(s).ok_or_else(|| {
                AppError::store_with_op(format!("unknown subtype '{}'", s), "decode entry")
            })?),
        };
        let pr_state = PrState::parse(&self.pr_state).ok_or_else(|| {
            AppError::store_with_op(
                format!("unknown pr state '{}'", self.pr_state),
                "decode entry",
            )
        })?;

        Ok(Entry {
            id: self.id,
            repo: self.repo,
            pr: self.pr,
            pr_state,
            pr_author: self.pr_author,
            pr_title: self.pr_title,
            pr_branch: self.pr_branch,
            pr_labels: decode_json(self.pr_labels.as_deref())?,
            entry_type,
            subtype,
            author: self.author,
            author_login: self.author_login,
            body: self.body,
            state: self.state,
            file: self.file,
            line: self.line,
            database_id: self.database_id,
            thread_resolved: self.thread_resolved,
            file_activity_after: decode_json(self.file_activity.as_deref())?,
            reactions: decode_json(self.reactions.as_deref())?,
            graphite: decode_json(self.graphite.as_deref())?,
            url: self.url,
            created_at: self.created_at,
            captured_at: self.captured_at,
        })
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: Option<&str>) -> Result<Option<T>, AppError> {
    match raw {
        None => Ok(None),
        Some(s) => serde_json::from_str(s)
            .map(Some)
            .map_err(|e| AppError::store_with_op(e.to_string(), "decode entry json")),
    }
}

fn encode_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>, AppError> {
    match value {
        None => Ok(None),
        Some(v) => serde_json::to_string(v)
            .map(Some)
            .map_err(|e| AppError::store_with_op(e.to_string(), "encode entry json")),
    }
}

/// Upsert a batch of entries inside an open transaction.
///
/// Idempotent by `(id, repo)`: a re-observed entry keeps its original
/// `captured_at` and has every content field overwritten.
pub async fn upsert_entries_tx(
    tx: &mut Transaction<'_, Sqlite>,
    entries: &[Entry],
) -> Result<(), AppError> {
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO entries (
                id, repo, pr, pr_state, pr_author, pr_title, pr_branch, pr_labels,
                entry_type, subtype, author, author_login, body, state, file, line,
                database_id, thread_resolved, file_activity, reactions, graphite, url,
                created_at, captured_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id, repo) DO UPDATE SET
                pr = excluded.pr,
                pr_state = excluded.pr_state,
                pr_author = excluded.pr_author,
                pr_title = excluded.pr_title,
                pr_branch = excluded.pr_branch,
                pr_labels = excluded.pr_labels,
                entry_type = excluded.entry_type,
                subtype = excluded.subtype,
                author = excluded.author,
                author_login = excluded.author_login,
                body = excluded.body,
                state = excluded.state,
                file = excluded.file,
                line = excluded.line,
                database_id = excluded.database_id,
                thread_resolved = excluded.thread_resolved,
                file_activity = excluded.file_activity,
                reactions = excluded.reactions,
                graphite = excluded.graphite,
                url = excluded.url,
                created_at = excluded.created_at
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.repo)
        .bind(entry.pr)
        .bind(entry.pr_state.as_str())
        .bind(&entry.pr_author)
        .bind(&entry.pr_title)
        .bind(&entry.pr_branch)
        .bind(encode_json(&entry.pr_labels)?)
        .bind(entry.entry_type.as_str())
        .bind(entry.subtype.map(|s| s.as_str()))
        .bind(&entry.author)
        .bind(&entry.author_login)
        .bind(&entry.body)
        .bind(&entry.state)
        .bind(&entry.file)
        .bind(entry.line)
        .bind(entry.database_id)
        .bind(entry.thread_resolved)
        .bind(encode_json(&entry.file_activity_after)?)
        .bind(encode_json(&entry.reactions)?)
        .bind(encode_json(&entry.graphite)?)
        .bind(&entry.url)
        .bind(entry.created_at)
        .bind(entry.captured_at)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Upsert a batch of entries in a transaction of its own.
pub async fn upsert_entries(pool: &DbPool, entries: &[Entry]) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    upsert_entries_tx(&mut tx, entries).await?;
    tx.commit().await?;
    Ok(())
}

enum Bind {
    Text(String),
    Int(i64),
    Ts(DateTime<Utc>),
}

/// Translate the SQL-expressible part of a filter into a WHERE clause.
fn build_where(filter: &EntryFilter) -> (String, Vec<Bind>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut binds: Vec<Bind> = Vec::new();

    if let Some(repo) = &filter.repo {
        clauses.push("e.repo = ?".into());
        binds.push(Bind::Text(repo.clone()));
    } else if let Some(prefix) = &filter.repo_prefix {
        clauses.push("e.repo LIKE ?".into());
        binds.push(Bind::Text(format!("{}%", prefix)));
    }

    if !filter.prs.is_empty() {
        let marks = vec!["?"; filter.prs.len()].join(", ");
        clauses.push(format!("e.pr IN ({})", marks));
        binds.extend(filter.prs.iter().map(|pr| Bind::Int(*pr)));
    }

    if !filter.types.is_empty() {
        let marks = vec!["?"; filter.types.len()].join(", ");
        clauses.push(format!("e.entry_type IN ({})", marks));
        binds.extend(
            filter
                .types
                .iter()
                .map(|t| Bind::Text(t.as_str().to_string())),
        );
    }

    if !filter.authors.is_empty() {
        let marks = vec!["?"; filter.authors.len()].join(", ");
        clauses.push(format!("lower(e.author) IN ({})", marks));
        binds.extend(
            filter
                .authors
                .iter()
                .map(|a| Bind::Text(a.to_lowercase())),
        );
    }

    if !filter.exclude_authors.is_empty() {
        let marks = vec!["?"; filter.exclude_authors.len()].join(", ");
        clauses.push(format!("lower(e.author) NOT IN ({})", marks));
        binds.extend(
            filter
                .exclude_authors
                .iter()
                .map(|a| Bind::Text(a.to_lowercase())),
        );
    }

    if !filter.states.is_empty() {
        let marks = vec!["?"; filter.states.len()].join(", ");
        clauses.push(format!("e.pr_state IN ({})", marks));
        binds.extend(
            filter
                .states
                .iter()
                .map(|s| Bind::Text(s.as_str().to_string())),
        );
    }

    if let Some(since) = filter.since {
        clauses.push("e.created_at >= ?".into());
        binds.push(Bind::Ts(since));
    }
    if let Some(before) = filter.before {
        clauses.push("e.created_at < ?".into());
        binds.push(Bind::Ts(before));
    }

    if let Some(id) = &filter.id {
        clauses.push("e.id = ?".into());
        binds.push(Bind::Text(id.clone()));
    }

    if filter.orphaned {
        // Closed/merged PRs whose review threads are still unresolved.
        clauses.push(
            "e.pr_state IN ('closed', 'merged') AND EXISTS (
                SELECT 1 FROM entries t
                WHERE t.repo = e.repo AND t.pr = e.pr
                  AND t.subtype = 'review_comment' AND t.thread_resolved = 0
            )"
            .into(),
        );
    } else if filter.exclude_stale {
        clauses.push("e.pr_state NOT IN ('closed', 'merged')".into());
    }

    if !filter.include_frozen {
        clauses.push(
            "NOT EXISTS (
                SELECT 1 FROM freezes f
                WHERE f.repo = e.repo AND f.pr = e.pr AND e.created_at > f.frozen_at
            )"
            .into(),
        );
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (where_sql, binds)
}

async fn fetch_filtered(pool: &DbPool, filter: &EntryFilter) -> Result<Vec<Entry>, AppError> {
    let (where_sql, binds) = build_where(filter);
    let sql = format!(
        "SELECT * FROM entries e {} ORDER BY e.created_at DESC, e.id ASC",
        where_sql
    );

    let mut query = sqlx::query_as::<_, EntryRow>(&sql);
    for bind in binds {
        query = match bind {
            Bind::Text(s) => query.bind(s),
            Bind::Int(i) => query.bind(i),
            Bind::Ts(t) => query.bind(t),
        };
    }

    let rows = query.fetch_all(pool).await?;
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        entries.push(row.into_entry()?);
    }

    // Regex and label predicates run here so paging sees the final sequence.
    if filter.exclude_bots && !filter.bot_patterns.is_empty() {
        let regexes = filter.compiled_bot_patterns()?;
        entries.retain(|e| !regexes.iter().any(|r| r.is_match(&e.author)));
    }
    if let Some(label) = &filter.label {
        let needle = label.to_lowercase();
        entries.retain(|e| {
            e.pr_labels
                .as_ref()
                .map(|labels| labels.iter().any(|l| l.to_lowercase().contains(&needle)))
                .unwrap_or(false)
        });
    }

    Ok(entries)
}

/// Query entries ordered `created_at DESC, id ASC`, paged after filtering.
pub async fn query_entries(
    pool: &DbPool,
    filter: &EntryFilter,
    limit: Option<usize>,
    offset: Option<usize>,
) -> Result<Vec<Entry>, AppError> {
    let mut entries = fetch_filtered(pool, filter).await?;

    let offset = offset.unwrap_or(0);
    if offset > 0 {
        entries = entries.split_off(offset.min(entries.len()));
    }
    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    Ok(entries)
}

/// Count entries matching a filter.
pub async fn count_entries(pool: &DbPool, filter: &EntryFilter) -> Result<i64, AppError> {
    let entries = fetch_filtered(pool, filter).await?;
    Ok(entries.len() as i64)
}

/// A single entry by id, freeze overlay not applied.
pub async fn get_entry(pool: &DbPool, repo: &str, id: &str) -> Result<Option<Entry>, AppError> {
    let row: Option<EntryRow> =
        sqlx::query_as("SELECT * FROM entries WHERE repo = ? AND id = ?")
            .bind(repo)
            .bind(id)
            .fetch_optional(pool)
            .await?;
    row.map(EntryRow::into_entry).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::PrState;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn entry(id: &str, pr: i64, author: &str, hour: u32) -> Entry {
        Entry {
            id: id.to_string(),
            repo: "octo/widgets".to_string(),
            pr,
            pr_state: PrState::Open,
            pr_author: "alice".to_string(),
            pr_title: "title".to_string(),
            pr_branch: "branch".to_string(),
            pr_labels: Some(vec!["Bug".to_string(), "P1".to_string()]),
            entry_type: EntryType::Comment,
            subtype: Some(CommentSubtype::IssueComment),
            author: author.to_string(),
            author_login: None,
            body: Some("body".to_string()),
            state: None,
            file: None,
            line: None,
            database_id: None,
            thread_resolved: None,
            file_activity_after: None,
            reactions: None,
            graphite: None,
            url: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, hour, 0, 0).unwrap(),
            captured_at: Utc.with_ymd_and_hms(2025, 1, 2, hour, 30, 0).unwrap(),
        }
    }

    async fn pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&db::db_path(dir.path())).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn test_upsert_preserves_captured_at() {
        let (_dir, pool) = pool().await;

        let first = entry("C_1", 1, "bob", 3);
        upsert_entries(&pool, &[first.clone()]).await.unwrap();

        let mut second = first.clone();
        second.body = Some("edited".to_string());
        second.captured_at = Utc.with_ymd_and_hms(2025, 1, 3, 9, 0, 0).unwrap();
        upsert_entries(&pool, &[second]).await.unwrap();

        let got = get_entry(&pool, "octo/widgets", "C_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.body.as_deref(), Some("edited"));
        assert_eq!(got.captured_at, first.captured_at);
    }

    #[tokio::test]
    async fn test_ordering_created_desc_id_asc() {
        let (_dir, pool) = pool().await;
        upsert_entries(
            &pool,
            &[
                entry("C_b", 1, "bob", 3),
                entry("C_a", 1, "bob", 3),
                entry("C_c", 1, "bob", 5),
            ],
        )
        .await
        .unwrap();

        let got = query_entries(&pool, &EntryFilter::for_repo("octo/widgets"), None, None)
            .await
            .unwrap();
        let ids: Vec<&str> = got.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["C_c", "C_a", "C_b"]);
    }

    #[tokio::test]
    async fn test_bot_and_label_filters() {
        let (_dir, pool) = pool().await;
        upsert_entries(
            &pool,
            &[
                entry("C_1", 1, "dependabot[bot]", 3),
                entry("C_2", 1, "sonar-bot", 4),
                entry("C_3", 1, "bobalice", 5),
            ],
        )
        .await
        .unwrap();

        let filter = EntryFilter {
            repo: Some("octo/widgets".to_string()),
            exclude_bots: true,
            bot_patterns: vec!["\\[bot\\]$".to_string(), "-bot$".to_string()],
            ..Default::default()
        };
        let got = query_entries(&pool, &filter, None, None).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].author, "bobalice");

        let filter = EntryFilter {
            repo: Some("octo/widgets".to_string()),
            label: Some("bug".to_string()),
            ..Default::default()
        };
        assert_eq!(count_entries(&pool, &filter).await.unwrap(), 3);

        let filter = EntryFilter {
            repo: Some("octo/widgets".to_string()),
            label: Some("wontfix".to_string()),
            ..Default::default()
        };
        assert_eq!(count_entries(&pool, &filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_paging_after_filtering() {
        let (_dir, pool) = pool().await;
        upsert_entries(
            &pool,
            &[
                entry("C_1", 1, "bob", 1),
                entry("C_2", 1, "bob", 2),
                entry("C_3", 1, "bob", 3),
                entry("C_4", 1, "bob", 4),
            ],
        )
        .await
        .unwrap();

        let filter = EntryFilter::for_repo("octo/widgets");
        let page = query_entries(&pool, &filter, Some(2), Some(1)).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["C_3", "C_2"]);
    }
}

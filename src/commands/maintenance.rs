//! `firewatch freeze|unfreeze|clear` — local store maintenance.

use super::{CommandContext, EXIT_FAILED, EXIT_OK};
use crate::db;
use crate::error::AppError;
use chrono::{DateTime, Utc};

/// Freeze a PR at a timestamp (now when omitted). Newer activity is
/// masked from queries until unfrozen.
pub async fn freeze(
    ctx: &CommandContext,
    repo_flag: Option<&str>,
    pr: i64,
    at: Option<&str>,
) -> Result<u8, AppError> {
    let repo = ctx.resolve_repo(repo_flag)?;
    let frozen_at: DateTime<Utc> = match at {
        None => Utc::now(),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| {
                AppError::freeze(format!("invalid timestamp '{}': expected RFC 3339", raw))
            })?,
    };

    db::freeze::set_freeze(&ctx.pool, &repo, pr, frozen_at).await?;
    ctx.emit(&serde_json::json!({
        "ok": true,
        "repo": repo,
        "pr": pr,
        "frozen_at": frozen_at,
    }))?;
    if !ctx.jsonl {
        println!("froze #{} at {}", pr, frozen_at.to_rfc3339());
    }
    Ok(EXIT_OK)
}

/// Unfreeze a PR.
pub async fn unfreeze(
    ctx: &CommandContext,
    repo_flag: Option<&str>,
    pr: i64,
) -> Result<u8, AppError> {
    let repo = ctx.resolve_repo(repo_flag)?;
    let existed = db::freeze::clear_freeze(&ctx.pool, &repo, pr).await?;
    ctx.emit(&serde_json::json!({
        "ok": existed,
        "repo": repo,
        "pr": pr,
    }))?;
    if !ctx.jsonl {
        if existed {
            println!("unfroze #{}", pr);
        } else {
            println!("#{} was not frozen", pr);
        }
    }
    Ok(if existed { EXIT_OK } else { EXIT_FAILED })
}

/// List frozen PRs.
pub async fn frozen(ctx: &CommandContext, repo_flag: Option<&str>) -> Result<u8, AppError> {
    let repo = ctx.resolve_repo(repo_flag)?;
    let rows = db::freeze::frozen_prs(&ctx.pool, Some(&repo)).await?;
    for row in &rows {
        ctx.emit(row)?;
        if !ctx.jsonl {
            println!("#{:<4} frozen at {}", row.pr, row.frozen_at.to_rfc3339());
        }
    }
    if !ctx.jsonl && rows.is_empty() {
        println!("no frozen PRs");
    }
    Ok(EXIT_OK)
}

/// Drop everything the store holds for a repo.
pub async fn clear(
    ctx: &CommandContext,
    repo_flag: Option<&str>,
    confirmed: bool,
) -> Result<u8, AppError> {
    let repo = ctx.resolve_repo(repo_flag)?;
    if !confirmed {
        return Err(AppError::validation(format!(
            "clearing {} drops its cached entries, acks, and freezes; pass --yes",
            repo
        )));
    }

    let removed = db::clear_repo(&ctx.pool, &repo).await?;
    ctx.resolver.invalidate();
    ctx.emit(&serde_json::json!({
        "ok": true,
        "repo": repo,
        "entries_removed": removed,
    }))?;
    if !ctx.jsonl {
        println!("cleared {} ({} entries)", repo, removed);
    }
    Ok(EXIT_OK)
}

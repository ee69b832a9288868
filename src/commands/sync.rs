//! `firewatch sync` — refresh the cache for one or more repos.

use super::{CommandContext, EXIT_FAILED, EXIT_OK, EXIT_PARTIAL};
use crate::error::AppError;
use crate::models::SyncScope;
use crate::services::sync::{sync_many, SyncMode, SyncOptions};

/// Sync the named repos (or the resolved default) in both scopes.
pub async fn run(
    ctx: &CommandContext,
    repos: Vec<String>,
    repo_flag: Option<&str>,
    full: bool,
) -> Result<u8, AppError> {
    let client = ctx.client()?;
    let repos = if !repos.is_empty() {
        repos
    } else if repo_flag.is_some() || ctx.config.repos.is_empty() {
        vec![ctx.resolve_repo(repo_flag)?]
    } else {
        ctx.config.repos.clone()
    };

    let options = SyncOptions {
        mode: if full { SyncMode::Full } else { SyncMode::Incremental },
        ..Default::default()
    };

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    for scope in [SyncScope::Open, SyncScope::Closed] {
        let results = sync_many(
            &ctx.pool,
            client,
            &repos,
            scope,
            &options,
            &ctx.plugins,
            &ctx.cancel,
        )
        .await;

        for (repo, result) in results {
            match result {
                Ok(outcome) => {
                    succeeded += 1;
                    ctx.emit(&outcome)?;
                    if !ctx.jsonl {
                        println!(
                            "{} [{}]: {} PRs, {} entries in {}ms{}",
                            repo,
                            scope.as_str(),
                            outcome.pr_count,
                            outcome.entry_count,
                            outcome.duration_ms,
                            if outcome.completed { "" } else { " (incomplete)" }
                        );
                    }
                }
                Err(e) => {
                    failed += 1;
                    if !ctx.jsonl {
                        eprintln!("{} [{}]: {}", repo, scope.as_str(), e);
                    }
                    ctx.emit(&serde_json::json!({
                        "ok": false,
                        "repo": repo,
                        "scope": scope.as_str(),
                        "error": e,
                    }))?;
                }
            }
        }
    }

    Ok(if failed == 0 {
        EXIT_OK
    } else if succeeded == 0 {
        EXIT_FAILED
    } else {
        EXIT_PARTIAL
    })
}

//! `firewatch list` and `firewatch status` — cached reads.

use super::{CommandContext, EXIT_OK};
use crate::config::parse_duration;
use crate::db::{self, EntryFilter};
use crate::error::AppError;
use crate::models::{EntryType, Perspective, PrState, SyncScope};
use crate::services::actionable::{apply_perspective, derive_actionable, DeriveOptions};
use crate::services::ids::display_short_id;
use crate::services::sync::ensure_fresh;
use crate::services::worklist::build_worklist;
use chrono::{DateTime, NaiveDate, Utc};

/// Parsed `list` arguments.
#[derive(Debug, Default)]
pub struct ListArgs {
    pub repo: Option<String>,
    pub prs: Vec<i64>,
    pub types: Vec<String>,
    pub authors: Vec<String>,
    pub exclude_authors: Vec<String>,
    pub label: Option<String>,
    pub states: Vec<String>,
    pub since: Option<String>,
    pub before: Option<String>,
    pub id: Option<String>,
    pub orphaned: bool,
    pub exclude_stale: bool,
    pub include_bots: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// ISO-8601 date (or datetime) for `--before`.
fn parse_before(input: &str) -> Result<DateTime<Utc>, AppError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map(|d| {
            DateTime::from_naive_utc_and_offset(d.and_hms_opt(0, 0, 0).expect("midnight"), Utc)
        })
        .map_err(|_| {
            AppError::validation_field(
                format!("invalid --before '{}': expected an ISO-8601 date", input),
                "before",
            )
        })
}

fn build_filter(ctx: &CommandContext, repo: &str, args: &ListArgs) -> Result<EntryFilter, AppError> {
    let mut filter = EntryFilter::for_repo(repo);
    filter.prs = args.prs.clone();

    for raw in &args.types {
        let entry_type = EntryType::parse(raw).ok_or_else(|| {
            AppError::validation_field(format!("unknown type '{}'", raw), "type")
        })?;
        filter.types.push(entry_type);
    }

    let state_names: Vec<String> = if args.states.is_empty() {
        ctx.config.default_states.clone()
    } else {
        args.states.clone()
    };
    for raw in &state_names {
        let state = PrState::parse(raw).ok_or_else(|| {
            AppError::validation_field(format!("unknown state '{}'", raw), "state")
        })?;
        filter.states.push(state);
    }

    filter.authors = args.authors.clone();
    filter.exclude_authors = args.exclude_authors.clone();
    filter
        .exclude_authors
        .extend(ctx.config.filters.exclude_authors.iter().cloned());
    filter.exclude_bots = ctx.config.filters.exclude_bots && !args.include_bots;
    filter.bot_patterns = ctx.config.filters.bot_patterns.clone();
    filter.label = args.label.clone();
    filter.id = args.id.clone();
    filter.orphaned = args.orphaned;
    filter.exclude_stale = args.exclude_stale;

    if let Some(since) = args.since.as_deref().or(ctx.config.default_since.as_deref()) {
        filter.since = Some(Utc::now() - parse_duration(since)?);
    }
    if let Some(before) = &args.before {
        filter.before = Some(parse_before(before)?);
    }

    Ok(filter)
}

/// Which scopes a filter's states touch; default is the open scope.
fn scopes_for(filter: &EntryFilter) -> Vec<SyncScope> {
    if filter.orphaned {
        return vec![SyncScope::Closed];
    }
    if filter.states.is_empty() {
        return vec![SyncScope::Open];
    }
    let mut scopes: Vec<SyncScope> = filter.states.iter().map(|s| SyncScope::for_state(*s)).collect();
    scopes.sort_by_key(|s| s.as_str());
    scopes.dedup();
    scopes
}

async fn refresh(ctx: &CommandContext, repo: &str, filter: &EntryFilter) -> Result<(), AppError> {
    let no_sync = ctx.no_sync || !ctx.config.sync.auto_sync;
    for scope in scopes_for(filter) {
        ensure_fresh(
            &ctx.pool,
            ctx.client.as_ref(),
            repo,
            scope,
            ctx.config.stale_threshold(),
            no_sync,
            &ctx.plugins,
            &ctx.cancel,
        )
        .await?;
    }
    Ok(())
}

/// List raw entries.
pub async fn list(ctx: &CommandContext, args: ListArgs) -> Result<u8, AppError> {
    let repo = ctx.resolve_repo(args.repo.as_deref())?;
    let filter = build_filter(ctx, &repo, &args)?;
    refresh(ctx, &repo, &filter).await?;

    let entries = db::entries::query_entries(&ctx.pool, &filter, args.limit, args.offset).await?;

    for entry in &entries {
        if ctx.jsonl {
            ctx.emit(entry)?;
        } else {
            let body = entry
                .body
                .as_deref()
                .map(|b| b.lines().next().unwrap_or(""))
                .unwrap_or("");
            println!(
                "{} #{:<4} {:<8} {} {:<16} {}",
                entry.created_at.format("%Y-%m-%d %H:%M"),
                entry.pr,
                entry.entry_type.as_str(),
                display_short_id(&entry.id, &repo),
                entry.author,
                body
            );
        }
    }
    if !ctx.jsonl && entries.is_empty() {
        println!("no entries");
    }
    Ok(EXIT_OK)
}

/// Show one PR (metadata plus recent activity) or one comment.
pub async fn view(ctx: &CommandContext, repo_flag: Option<&str>, target: &str) -> Result<u8, AppError> {
    let repo = ctx.resolve_repo(repo_flag)?;
    let filter = EntryFilter::for_repo(&repo);
    refresh(ctx, &repo, &filter).await?;

    match ctx.resolver.resolve(&ctx.pool, &repo, target).await? {
        crate::services::ids::Resolved::Pr { pr } => {
            let meta = db::prs::get_pr(&ctx.pool, &repo, pr)
                .await?
                .ok_or_else(|| AppError::not_found_with_id("pull request", pr.to_string()))?;
            let entries = db::entries::query_entries(
                &ctx.pool,
                &EntryFilter::for_pr(&repo, pr),
                Some(20),
                None,
            )
            .await?;

            if ctx.jsonl {
                ctx.emit(&serde_json::json!({ "pr": meta, "entries": entries }))?;
            } else {
                println!(
                    "#{} {} [{}] by {} on {}",
                    meta.pr,
                    meta.title,
                    meta.state.as_str(),
                    meta.author,
                    meta.branch
                );
                for entry in &entries {
                    let body = entry
                        .body
                        .as_deref()
                        .map(|b| b.lines().next().unwrap_or(""))
                        .unwrap_or("");
                    println!(
                        "  {} {:<8} {} {:<16} {}",
                        entry.created_at.format("%Y-%m-%d %H:%M"),
                        entry.entry_type.as_str(),
                        display_short_id(&entry.id, &repo),
                        entry.author,
                        body
                    );
                }
            }
        }
        crate::services::ids::Resolved::Comment { entry, short_id, .. } => {
            if ctx.jsonl {
                ctx.emit(&entry)?;
            } else {
                println!(
                    "@{} on #{} by {} at {}",
                    short_id,
                    entry.pr,
                    entry.author,
                    entry.created_at.to_rfc3339()
                );
                if let (Some(file), Some(line)) = (&entry.file, entry.line) {
                    println!("  {}:{}", file, line);
                }
                if let Some(resolved) = entry.thread_resolved {
                    println!("  thread resolved: {}", resolved);
                }
                if let Some(body) = &entry.body {
                    println!("{}", body);
                }
            }
        }
        crate::services::ids::Resolved::Error { error, .. } => return Err(error),
    }
    Ok(EXIT_OK)
}

/// Worklist plus actionable report.
pub async fn status(
    ctx: &CommandContext,
    repo_flag: Option<&str>,
    perspective: Option<Perspective>,
) -> Result<u8, AppError> {
    let repo = ctx.resolve_repo(repo_flag)?;
    let mut filter = EntryFilter::for_repo(&repo);
    filter.exclude_bots = ctx.config.filters.exclude_bots;
    filter.bot_patterns = ctx.config.filters.bot_patterns.clone();
    refresh(ctx, &repo, &filter).await?;

    // Derivation wants the unfiltered comment stream; bots are handled by
    // its own pattern set.
    let entries =
        db::entries::query_entries(&ctx.pool, &EntryFilter::for_repo(&repo), None, None).await?;
    let worklist = build_worklist(&entries);

    let options = DeriveOptions {
        acked_ids: db::acks::acked_ids_for(&ctx.pool, &repo).await?,
        username: ctx.config.user.github_username.clone(),
        commit_implies_read: ctx.config.feedback.commit_implies_read,
        bot_patterns: ctx.config.filters.bot_patterns.clone(),
        ..Default::default()
    };
    let mut report = derive_actionable(&entries, &options)?;

    if let (Some(perspective), Some(username)) =
        (perspective, ctx.config.user.github_username.as_deref())
    {
        apply_perspective(&mut report, perspective, username);
    }

    if ctx.jsonl {
        ctx.emit(&serde_json::json!({
            "repo": repo,
            "worklist": worklist,
            "actionable": report,
        }))?;
        return Ok(EXIT_OK);
    }

    for (title, items) in [
        ("unaddressed", &report.unaddressed),
        ("changes requested", &report.changes_requested),
        ("awaiting review", &report.awaiting_review),
        ("stale", &report.stale),
    ] {
        if items.is_empty() {
            continue;
        }
        println!("{}:", title);
        for item in items {
            println!(
                "  #{:<4} {:<40} {} [{}]",
                item.pr,
                item.pr_title.chars().take(40).collect::<String>(),
                item.description,
                item.pr_author
            );
        }
    }
    if report.is_empty() {
        println!("nothing needs attention");
    }
    Ok(EXIT_OK)
}

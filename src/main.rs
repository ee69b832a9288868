//! Firewatch CLI entry point.

use anyhow::Context;
use clap::{Parser, Subcommand};
use firewatch::commands::{self, query::ListArgs, CommandContext};
use firewatch::config::Config;
use firewatch::models::Perspective;
use firewatch::services::enrich::active_plugins;
use firewatch::services::github::{GithubClient, GithubClientConfig};
use firewatch::services::ids::IdResolver;
use firewatch::db;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "firewatch", version, about = "Local-first GitHub PR activity cache")]
struct Cli {
    /// Repository slug (owner/name); defaults to config, then the git
    /// remote of the working directory.
    #[arg(long, global = true)]
    repo: Option<String>,

    /// Emit one JSON object per line.
    #[arg(long, global = true)]
    jsonl: bool,

    /// Operate offline; fail if the cache is cold.
    #[arg(long, global = true)]
    no_sync: bool,

    /// Alternate config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh the cache for one or more repos.
    Sync {
        /// Repos to sync (defaults to config, then the detected repo).
        repos: Vec<String>,

        /// Ignore checkpoints and re-fetch everything.
        #[arg(long)]
        full: bool,
    },

    /// List cached activity entries.
    List {
        /// Restrict to PR numbers.
        #[arg(long = "pr")]
        prs: Vec<i64>,

        /// Entry types (comment, review, commit, ci, event).
        #[arg(long = "type")]
        types: Vec<String>,

        /// Author include list.
        #[arg(long = "author")]
        authors: Vec<String>,

        /// Author deny list.
        #[arg(long = "exclude-author")]
        exclude_authors: Vec<String>,

        /// Label substring (case-insensitive).
        #[arg(long)]
        label: Option<String>,

        /// PR states (open, draft, closed, merged).
        #[arg(long = "state")]
        states: Vec<String>,

        /// Lookback window (30s, 5m, 2h, 3d, 1w).
        #[arg(long)]
        since: Option<String>,

        /// Upper bound as an ISO-8601 date.
        #[arg(long)]
        before: Option<String>,

        /// Exact entry id.
        #[arg(long)]
        id: Option<String>,

        /// Only closed/merged PRs with unresolved threads.
        #[arg(long)]
        orphaned: bool,

        /// Hide entries of closed/merged PRs.
        #[arg(long)]
        exclude_stale: bool,

        /// Keep bot-authored entries.
        #[arg(long)]
        include_bots: bool,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        offset: Option<usize>,
    },

    /// Worklist and actionable report.
    Status {
        /// Only my PRs.
        #[arg(long, conflicts_with = "reviews")]
        mine: bool,

        /// Only PRs I review.
        #[arg(long)]
        reviews: bool,
    },

    /// Show one PR or comment.
    View {
        /// PR number, @short id, or full node id.
        target: String,
    },

    /// Reply to a PR or comment.
    Reply {
        /// PR number, @short id, or full node id.
        target: String,

        /// Comment body.
        body: String,
    },

    /// Acknowledge comments (or every unaddressed comment of a PR).
    Ack {
        /// PR numbers, @short ids, or full node ids.
        targets: Vec<String>,
    },

    /// Resolve review threads (issue comments get a reaction ack).
    Resolve {
        targets: Vec<String>,
    },

    /// Close PRs, their feedback, or individual comments.
    Close {
        targets: Vec<String>,

        /// Resolve/ack the PR's feedback instead of closing the PR.
        #[arg(long)]
        feedback: bool,

        /// Confirm closing the PR itself.
        #[arg(long)]
        yes: bool,
    },

    /// Mask a PR's newer activity from queries.
    Freeze {
        pr: i64,

        /// Freeze point (RFC 3339); defaults to now.
        #[arg(long)]
        at: Option<String>,
    },

    /// Remove a PR's freeze mask.
    Unfreeze { pr: i64 },

    /// List frozen PRs.
    Frozen,

    /// Drop everything cached for a repo.
    Clear {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

fn jsonl_requested(flag: bool) -> bool {
    if flag {
        return true;
    }
    ["FIREWATCH_JSONL", "FIREWATCH_JSON"].iter().any(|var| {
        std::env::var(var)
            .map(|v| !v.is_empty() && v != "0")
            .unwrap_or(false)
    })
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("loading config")?;

    let data_dir = Config::data_dir().context("resolving data directory")?;
    let pool = db::initialize(&db::db_path(&data_dir))
        .await
        .context("opening store")?;

    // A missing credential only blocks mutations and sync; warm-cache
    // reads continue.
    let client = match config.resolve_token() {
        Ok(token) => Some(
            GithubClient::new(GithubClientConfig {
                token,
                ..Default::default()
            })
            .context("building GitHub client")?,
        ),
        Err(e) => {
            log::debug!("no GitHub credential: {}", e);
            None
        }
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("interrupt received, stopping after committed work");
                cancel.cancel();
            }
        });
    }

    let ctx = CommandContext {
        plugins: active_plugins(&config),
        pool,
        config,
        client,
        resolver: IdResolver::new(),
        jsonl: jsonl_requested(cli.jsonl),
        no_sync: cli.no_sync,
        cancel,
    };

    let repo_flag = cli.repo.as_deref();
    let code = match cli.command {
        Command::Sync { repos, full } => commands::sync::run(&ctx, repos, repo_flag, full).await?,
        Command::List {
            prs,
            types,
            authors,
            exclude_authors,
            label,
            states,
            since,
            before,
            id,
            orphaned,
            exclude_stale,
            include_bots,
            limit,
            offset,
        } => {
            commands::query::list(
                &ctx,
                ListArgs {
                    repo: cli.repo.clone(),
                    prs,
                    types,
                    authors,
                    exclude_authors,
                    label,
                    states,
                    since,
                    before,
                    id,
                    orphaned,
                    exclude_stale,
                    include_bots,
                    limit,
                    offset,
                },
            )
            .await?
        }
        Command::Status { mine, reviews } => {
            let perspective = if mine {
                Some(Perspective::Mine)
            } else if reviews {
                Some(Perspective::Reviews)
            } else {
                None
            };
            commands::query::status(&ctx, repo_flag, perspective).await?
        }
        Command::View { target } => commands::query::view(&ctx, repo_flag, &target).await?,
        Command::Reply { target, body } => {
            commands::feedback::reply(&ctx, repo_flag, &target, &body).await?
        }
        Command::Ack { targets } => commands::feedback::ack(&ctx, repo_flag, &targets).await?,
        Command::Resolve { targets } => {
            commands::feedback::resolve(&ctx, repo_flag, &targets).await?
        }
        Command::Close {
            targets,
            feedback,
            yes,
        } => commands::feedback::close(&ctx, repo_flag, &targets, feedback, yes).await?,
        Command::Freeze { pr, at } => {
            commands::maintenance::freeze(&ctx, repo_flag, pr, at.as_deref()).await?
        }
        Command::Unfreeze { pr } => commands::maintenance::unfreeze(&ctx, repo_flag, pr).await?,
        Command::Frozen => commands::maintenance::frozen(&ctx, repo_flag).await?,
        Command::Clear { yes } => commands::maintenance::clear(&ctx, repo_flag, yes).await?,
    };

    Ok(code)
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code as i32),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

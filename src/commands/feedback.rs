//! `firewatch reply|ack|resolve|close` — mutating feedback actions.

use super::{CommandContext, EXIT_FAILED, EXIT_OK, EXIT_PARTIAL};
use crate::error::AppError;
use crate::services::feedback::{batch_status, BatchStatus, FeedbackOutcome, FeedbackPipeline};
use crate::services::ids::classify;

fn pipeline<'a>(ctx: &'a CommandContext, repo: &str) -> Result<FeedbackPipeline<'a>, AppError> {
    let client = ctx.client()?;
    let mut pipeline = FeedbackPipeline::new(&ctx.pool, client, &ctx.resolver, repo);
    pipeline.username = ctx.config.user.github_username.clone();
    pipeline.commit_implies_read = ctx.config.feedback.commit_implies_read;
    pipeline.bot_patterns = ctx.config.filters.bot_patterns.clone();
    Ok(pipeline)
}

fn report(ctx: &CommandContext, outcome: &FeedbackOutcome) -> Result<(), AppError> {
    ctx.emit(outcome)?;
    if !ctx.jsonl {
        if outcome.ok {
            let what = if outcome.resolved == Some(true) {
                "resolved"
            } else if outcome.acked == Some(true) {
                "acked"
            } else if outcome.closed == Some(true) {
                "closed"
            } else if outcome.closed_count.is_some() {
                "feedback closed"
            } else {
                "done"
            };
            match (&outcome.id, outcome.pr) {
                (Some(id), _) => println!("{} @{}", what, id),
                (None, Some(pr)) => println!("{} #{}", what, pr),
                _ => println!("{}", what),
            }
        } else if let Some(error) = &outcome.error {
            eprintln!("failed: {}", error);
        }
    }
    Ok(())
}

fn exit_code(outcomes: &[FeedbackOutcome]) -> u8 {
    match batch_status(outcomes) {
        BatchStatus::AllSucceeded => EXIT_OK,
        BatchStatus::AllFailed => EXIT_FAILED,
        BatchStatus::Partial => EXIT_PARTIAL,
    }
}

/// Run one action over many targets, continuing past failures.
async fn run_batch<F, Fut>(
    ctx: &CommandContext,
    repo: &str,
    targets: &[String],
    action: F,
) -> Result<u8, AppError>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<FeedbackOutcome, AppError>>,
{
    let mut outcomes = Vec::with_capacity(targets.len());
    for target in targets {
        let outcome = match action(target.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("{}: {}", target, e);
                FeedbackOutcome {
                    ok: false,
                    repo: repo.to_string(),
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        };
        report(ctx, &outcome)?;
        outcomes.push(outcome);
    }
    Ok(exit_code(&outcomes))
}

/// Post a reply to a PR or comment.
pub async fn reply(
    ctx: &CommandContext,
    repo_flag: Option<&str>,
    target: &str,
    body: &str,
) -> Result<u8, AppError> {
    let repo = ctx.resolve_repo(repo_flag)?;
    let pipeline = pipeline(ctx, &repo)?;
    let outcome = pipeline.reply(target, body).await?;
    report(ctx, &outcome)?;
    Ok(if outcome.ok { EXIT_OK } else { EXIT_FAILED })
}

/// Ack comments or whole PRs.
pub async fn ack(
    ctx: &CommandContext,
    repo_flag: Option<&str>,
    targets: &[String],
) -> Result<u8, AppError> {
    let repo = ctx.resolve_repo(repo_flag)?;
    let pipeline = pipeline(ctx, &repo)?;
    run_batch(ctx, &repo, targets, |target| {
        let pipeline = &pipeline;
        let cancel = &ctx.cancel;
        async move { pipeline.ack(&target, cancel).await }
    })
    .await
}

/// Resolve comment threads (or reaction-ack issue comments).
pub async fn resolve(
    ctx: &CommandContext,
    repo_flag: Option<&str>,
    targets: &[String],
) -> Result<u8, AppError> {
    let repo = ctx.resolve_repo(repo_flag)?;
    let pipeline = pipeline(ctx, &repo)?;
    run_batch(ctx, &repo, targets, |target| {
        let pipeline = &pipeline;
        async move { pipeline.resolve(&target).await }
    })
    .await
}

/// Close PRs (confirmed), close their feedback, or resolve comments.
pub async fn close(
    ctx: &CommandContext,
    repo_flag: Option<&str>,
    targets: &[String],
    feedback_only: bool,
    confirmed: bool,
) -> Result<u8, AppError> {
    let repo = ctx.resolve_repo(repo_flag)?;

    if !feedback_only && !confirmed {
        // Closing a PR is destructive; require the explicit flag when any
        // target is a PR number.
        let closes_pr = targets
            .iter()
            .any(|t| matches!(classify(t), Ok(crate::services::ids::IdKind::PrNumber(_))));
        if closes_pr {
            return Err(AppError::validation(
                "closing a PR needs --yes (or use --feedback to only close its feedback)",
            ));
        }
    }

    let pipeline = pipeline(ctx, &repo)?;
    run_batch(ctx, &repo, targets, |target| {
        let pipeline = &pipeline;
        let cancel = &ctx.cancel;
        async move { pipeline.close(&target, feedback_only, cancel).await }
    })
    .await
}

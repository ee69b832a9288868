//! CLI command handlers.
//!
//! Thin wrappers binding parsed arguments to the core services. Every
//! handler resolves the repo, runs the freshness gate where reads are
//! involved, and emits either human text or one JSON object per line.

pub mod feedback;
pub mod maintenance;
pub mod query;
pub mod sync;

use crate::config::Config;
use crate::db::DbPool;
use crate::error::AppError;
use crate::services::enrich::StackProvider;
use crate::services::github::GithubClient;
use crate::services::ids::IdResolver;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Process exit codes: 0 success, 1 failure, 2 partial success.
pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILED: u8 = 1;
pub const EXIT_PARTIAL: u8 = 2;

/// Shared state for one invocation.
pub struct CommandContext {
    pub pool: DbPool,
    pub config: Config,

    /// Absent when no credential was found; warm-cache reads still work.
    pub client: Option<GithubClient>,

    pub resolver: IdResolver,
    pub plugins: Vec<Box<dyn StackProvider>>,

    /// Emit one JSON object per line instead of text.
    pub jsonl: bool,

    /// Force offline operation.
    pub no_sync: bool,

    pub cancel: CancellationToken,
}

impl CommandContext {
    /// The repo to operate on: explicit flag, then config, then the git
    /// remote of the working directory.
    pub fn resolve_repo(&self, explicit: Option<&str>) -> Result<String, AppError> {
        if let Some(repo) = explicit {
            return Ok(repo.to_string());
        }
        if let Some(repo) = self.config.repos.first() {
            return Ok(repo.clone());
        }
        crate::config::detect_repo()
    }

    /// The client, or the auth hint when operating without one.
    pub fn client(&self) -> Result<&GithubClient, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::auth("this operation needs a GitHub token"))
    }

    /// Emit one structured payload line.
    pub fn emit<T: Serialize>(&self, payload: &T) -> Result<(), AppError> {
        if self.jsonl {
            println!("{}", serde_json::to_string(payload)?);
        }
        Ok(())
    }
}

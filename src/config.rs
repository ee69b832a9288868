//! Firewatch configuration subsystem.
//!
//! Loads the on-disk TOML config, resolves the GitHub credential, and
//! detects the working repository from the git remote. The config is read
//! once per invocation; there is no live reload.

use crate::error::AppError;
use crate::models::PrState;
use chrono::Duration;
use directories::ProjectDirs;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Bot-author patterns applied when the config does not override them.
pub const DEFAULT_BOT_PATTERNS: &[&str] = &["\\[bot\\]$", "-bot$", "^github-actions$"];

/// Cache freshness bound before a query triggers a re-sync.
pub const DEFAULT_STALE_THRESHOLD: &str = "5m";

fn default_true() -> bool {
    true
}

fn default_stale_threshold() -> String {
    DEFAULT_STALE_THRESHOLD.to_string()
}

fn default_bot_patterns() -> Vec<String> {
    DEFAULT_BOT_PATTERNS.iter().map(|s| s.to_string()).collect()
}

fn default_format() -> String {
    "text".to_string()
}

/// Top-level config mirroring the on-disk TOML layout.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Personal access token; overrides every other credential source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,

    /// Repos to operate on when none is given or detected.
    #[serde(default)]
    pub repos: Vec<String>,

    /// PR states queried when the caller does not name any.
    #[serde(default)]
    pub default_states: Vec<String>,

    /// Default lookback window (`Ns|Nm|Nh|Nd|Nw`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_since: Option<String>,

    /// Whether the Graphite stack-provider plugin is active.
    #[serde(default)]
    pub graphite_enabled: bool,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub user: UserConfig,

    #[serde(default)]
    pub feedback: FeedbackConfig,

    /// Resolved on-disk location, kept for rewrite without re-deriving.
    #[serde(skip)]
    config_path: PathBuf,
}

/// Sync behaviour.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    /// Sync automatically before queries when the cache is stale.
    #[serde(default = "default_true")]
    pub auto_sync: bool,

    /// Staleness bound, e.g. `5m`, `1h`.
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            stale_threshold: default_stale_threshold(),
        }
    }
}

/// Author filtering applied by default to queries and derivations.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FilterConfig {
    #[serde(default = "default_true")]
    pub exclude_bots: bool,

    #[serde(default)]
    pub exclude_authors: Vec<String>,

    /// Case-insensitive regexes matched against the entry author.
    #[serde(default = "default_bot_patterns")]
    pub bot_patterns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exclude_bots: true,
            exclude_authors: Vec::new(),
            bot_patterns: default_bot_patterns(),
        }
    }
}

/// Surface output defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    /// `text` or `jsonl`.
    #[serde(default = "default_format")]
    pub default_format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: default_format(),
        }
    }
}

/// Identity of the local user, used for self-comment suppression and the
/// perspective filter.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct UserConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_username: Option<String>,
}

/// Feedback-derivation knobs.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct FeedbackConfig {
    /// Treat a later commit by the user as having read earlier comments.
    #[serde(default)]
    pub commit_implies_read: bool,
}

impl Config {
    /// Load from the platform config directory, falling back to defaults
    /// when no file exists yet.
    pub fn load() -> Result<Self, AppError> {
        let dirs = ProjectDirs::from("", "", "firewatch")
            .ok_or_else(|| AppError::config("cannot determine config directory"))?;
        let path = dirs.config_dir().join("config.toml");
        Self::load_from(&path)
    }

    /// Load from an explicit path (used by tests and `--config`).
    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| AppError::config(format!("read {}: {}", path.display(), e)))?;
            toml::from_str::<Config>(&raw)
                .map_err(|e| AppError::config(format!("parse {}: {}", path.display(), e)))?
        } else {
            Config::default()
        };
        config.config_path = path.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Where the database lives.
    pub fn data_dir() -> Result<PathBuf, AppError> {
        let dirs = ProjectDirs::from("", "", "firewatch")
            .ok_or_else(|| AppError::config("cannot determine data directory"))?;
        Ok(dirs.data_dir().to_path_buf())
    }

    fn validate(&self) -> Result<(), AppError> {
        for pattern in &self.filters.bot_patterns {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    AppError::config(format!("invalid bot_pattern '{}': {}", pattern, e))
                })?;
        }
        for state in &self.default_states {
            if PrState::parse(state).is_none() {
                return Err(AppError::config(format!(
                    "invalid default_states entry '{}'",
                    state
                )));
            }
        }
        parse_duration(&self.sync.stale_threshold)
            .map_err(|e| AppError::config(format!("invalid sync.stale_threshold: {}", e)))?;
        if let Some(since) = &self.default_since {
            parse_duration(since)
                .map_err(|e| AppError::config(format!("invalid default_since: {}", e)))?;
        }
        Ok(())
    }

    /// Staleness bound as a duration.
    pub fn stale_threshold(&self) -> Duration {
        // Validated at load time
        parse_duration(&self.sync.stale_threshold).unwrap_or_else(|_| Duration::minutes(5))
    }

    /// Resolve the bearer token. Precedence: config > `GH_TOKEN` >
    /// `GITHUB_TOKEN` > the gh-cli credential store.
    pub fn resolve_token(&self) -> Result<String, AppError> {
        if let Some(token) = &self.github_token {
            if !token.is_empty() {
                return Ok(token.clone());
            }
        }
        for var in ["GH_TOKEN", "GITHUB_TOKEN"] {
            if let Ok(token) = std::env::var(var) {
                if !token.is_empty() {
                    return Ok(token);
                }
            }
        }
        if let Some(token) = gh_cli_token() {
            return Ok(token);
        }
        Err(AppError::auth(
            "no GitHub token found (set github_token in config, GH_TOKEN, or run `gh auth login`)",
        ))
    }
}

/// Token stored by the gh CLI, if any.
fn gh_cli_token() -> Option<String> {
    let hosts = directories::BaseDirs::new()?
        .home_dir()
        .join(".config/gh/hosts.yml");
    let raw = std::fs::read_to_string(hosts).ok()?;
    let mut in_github = false;
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("github.com:") {
            in_github = true;
            continue;
        }
        if in_github {
            if !line.starts_with(' ') && !trimmed.is_empty() {
                break;
            }
            if let Some(rest) = trimmed.strip_prefix("oauth_token:") {
                let token = rest.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    None
}

/// Detect the working repo from the `origin` remote of the current
/// directory's git checkout.
pub fn detect_repo() -> Result<String, AppError> {
    let output = Command::new("git")
        .args(["remote", "get-url", "origin"])
        .output()
        .map_err(|e| AppError::config(format!("git not available: {}", e)))?;
    if !output.status.success() {
        return Err(AppError::config("no origin remote in current directory"));
    }
    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    parse_remote_url(&url)
        .ok_or_else(|| AppError::config(format!("cannot parse remote url '{}'", url)))
}

/// Extract `owner/name` from ssh and https GitHub remote forms.
pub fn parse_remote_url(url: &str) -> Option<String> {
    let path = if let Some(rest) = url.strip_prefix("git@github.com:") {
        rest
    } else if let Some(rest) = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))
        .or_else(|| url.strip_prefix("http://github.com/"))
    {
        rest
    } else {
        return None;
    };
    let slug = path.trim_end_matches('/').trim_end_matches(".git");
    let mut parts = slug.splitn(2, '/');
    let owner = parts.next()?;
    let name = parts.next()?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some(format!("{}/{}", owner, name))
}

/// Parse `Ns|Nm|Nh|Nd|Nw` durations. Zero is valid, negatives are not;
/// a bare `0` is accepted.
pub fn parse_duration(input: &str) -> Result<Duration, AppError> {
    let trimmed = input.trim();
    if trimmed == "0" {
        return Ok(Duration::zero());
    }
    if trimmed.len() < 2 {
        return Err(AppError::validation(format!(
            "invalid duration '{}': expected <number><s|m|h|d|w>",
            input
        )));
    }
    let (number, unit) = trimmed.split_at(trimmed.len() - 1);
    let value: i64 = number.parse().map_err(|_| {
        AppError::validation(format!("invalid duration '{}': bad number '{}'", input, number))
    })?;
    if value < 0 {
        return Err(AppError::validation(format!(
            "invalid duration '{}': negative values are not allowed",
            input
        )));
    }
    match unit {
        "s" => Ok(Duration::seconds(value)),
        "m" => Ok(Duration::minutes(value)),
        "h" => Ok(Duration::hours(value)),
        "d" => Ok(Duration::days(value)),
        "w" => Ok(Duration::weeks(value)),
        _ => Err(AppError::validation(format!(
            "invalid duration '{}': unknown unit '{}'",
            input, unit
        ))),
    }
}

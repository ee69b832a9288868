//! Short-id generation and resolution.
//!
//! Every interactive surface accepts PR numbers, 5-hex short ids, or full
//! GitHub node ids interchangeably. Short ids are the first five hex
//! characters of `sha256("{repo}:{full_id}")`, displayed as `@xxxxx`.

use crate::db::{self, DbPool, EntryFilter};
use crate::error::AppError;
use crate::models::{Entry, EntryType};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::hash_map::Entry as Slot;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// Derive the 5-hex short id for a comment in a repo.
pub fn short_id(full_id: &str, repo: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repo.as_bytes());
    hasher.update(b":");
    hasher.update(full_id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..5].to_string()
}

/// Display form (`@xxxxx`).
pub fn display_short_id(full_id: &str, repo: &str) -> String {
    format!("@{}", short_id(full_id, repo))
}

/// What shape an input id has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdKind {
    PrNumber(i64),
    ShortId(String),
    FullId(String),
}

fn short_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^@?[0-9a-f]{5}$").expect("static regex"))
}

fn node_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[A-Z_]+[A-Za-z0-9_-]+$").expect("static regex"))
}

/// Classify an input id.
pub fn classify(input: &str) -> Result<IdKind, AppError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::id_format(input));
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return trimmed
            .parse::<i64>()
            .map(IdKind::PrNumber)
            .map_err(|_| AppError::id_format(input));
    }
    if short_id_re().is_match(trimmed) {
        return Ok(IdKind::ShortId(trimmed.trim_start_matches('@').to_string()));
    }
    if trimmed.len() > 10 && node_id_re().is_match(trimmed) {
        return Ok(IdKind::FullId(trimmed.to_string()));
    }
    Err(AppError::id_format(input))
}

/// Per-input resolution result.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Resolved {
    Pr { pr: i64 },
    Comment {
        id: String,
        short_id: String,
        entry: Box<Entry>,
    },
    Error { id: String, error: AppError },
}

/// Process-lifetime short-id index, rebuilt lazily from the store.
///
/// Surfaces may hold one as a global; the core takes it by reference so
/// tests can inject a fresh instance.
#[derive(Default)]
pub struct IdResolver {
    /// `(repo, short_id)` → entry. Holding whole entries lets a warm cache
    /// resolve without touching the store.
    cache: Mutex<HashMap<(String, String), Entry>>,
}

impl IdResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a batch of ids against one repo. Individual failures come
    /// back as [`Resolved::Error`]; only store faults abort the batch.
    pub async fn resolve_batch(
        &self,
        pool: &DbPool,
        repo: &str,
        inputs: &[String],
    ) -> Result<Vec<Resolved>, AppError> {
        let mut results = Vec::with_capacity(inputs.len());
        let mut rebuilt = false;

        for input in inputs {
            let kind = match classify(input) {
                Ok(kind) => kind,
                Err(error) => {
                    results.push(Resolved::Error {
                        id: input.clone(),
                        error,
                    });
                    continue;
                }
            };

            let resolved = match kind {
                IdKind::PrNumber(pr) => Resolved::Pr { pr },
                IdKind::ShortId(short) => {
                    let mut hit = self.lookup(repo, &short);
                    if hit.is_none() && !rebuilt {
                        self.rebuild(pool, repo).await?;
                        rebuilt = true;
                        hit = self.lookup(repo, &short);
                    }
                    match hit {
                        Some(entry) => Resolved::Comment {
                            id: entry.id.clone(),
                            short_id: short,
                            entry: Box::new(entry),
                        },
                        None => Resolved::Error {
                            id: input.clone(),
                            error: AppError::id_not_found(input.clone()),
                        },
                    }
                }
                IdKind::FullId(full) => {
                    let short = short_id(&full, repo);
                    let mut hit = self
                        .lookup(repo, &short)
                        .filter(|entry| entry.id == full);
                    if hit.is_none() {
                        hit = db::entries::get_entry(pool, repo, &full).await?;
                    }
                    match hit {
                        Some(entry) => Resolved::Comment {
                            id: entry.id.clone(),
                            short_id: short,
                            entry: Box::new(entry),
                        },
                        None => Resolved::Error {
                            id: input.clone(),
                            error: AppError::id_not_found(input.clone()),
                        },
                    }
                }
            };
            results.push(resolved);
        }

        Ok(results)
    }

    /// Resolve a single id.
    pub async fn resolve(
        &self,
        pool: &DbPool,
        repo: &str,
        input: &str,
    ) -> Result<Resolved, AppError> {
        let inputs = [input.to_string()];
        let mut batch = self.resolve_batch(pool, repo, &inputs).await?;
        Ok(batch.remove(0))
    }

    fn lookup(&self, repo: &str, short: &str) -> Option<Entry> {
        let cache = self.cache.lock().expect("short-id cache poisoned");
        cache.get(&(repo.to_string(), short.to_string())).cloned()
    }

    /// Rebuild the index for a repo from its comment entries. On a 5-hex
    /// collision the lexicographically smallest full id wins.
    async fn rebuild(&self, pool: &DbPool, repo: &str) -> Result<(), AppError> {
        let filter = EntryFilter {
            repo: Some(repo.to_string()),
            types: vec![EntryType::Comment],
            include_frozen: true,
            ..Default::default()
        };
        let comments = db::entries::query_entries(pool, &filter, None, None).await?;

        let mut fresh: HashMap<(String, String), Entry> = HashMap::new();
        for entry in comments {
            let key = (repo.to_string(), short_id(&entry.id, repo));
            match fresh.entry(key) {
                Slot::Occupied(mut slot) => {
                    let kept = if slot.get().id <= entry.id {
                        slot.get().id.clone()
                    } else {
                        let id = entry.id.clone();
                        slot.insert(entry);
                        id
                    };
                    log::warn!(
                        "short id @{} collides in {}; keeping {}",
                        slot.key().1,
                        repo,
                        kept
                    );
                }
                Slot::Vacant(slot) => {
                    slot.insert(entry);
                }
            }
        }

        let mut cache = self.cache.lock().expect("short-id cache poisoned");
        // Drop the repo's stale mappings, keep other repos' warm ones.
        cache.retain(|(cached_repo, _), _| cached_repo != repo);
        cache.extend(fresh);
        Ok(())
    }

    /// Forget everything (tests and `clear`).
    pub fn invalidate(&self) {
        self.cache.lock().expect("short-id cache poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_shape_and_determinism() {
        let a = short_id("PRRC_kwDOAbc123", "octo/widgets");
        let b = short_id("PRRC_kwDOAbc123", "octo/widgets");
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_short_id_repo_scoped() {
        let a = short_id("PRRC_kwDOAbc123", "octo/widgets");
        let b = short_id("PRRC_kwDOAbc123", "octo/gadgets");
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_form() {
        let display = display_short_id("PRRC_kwDOAbc123", "octo/widgets");
        assert!(display.starts_with('@'));
        assert_eq!(display.len(), 6);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("42").unwrap(), IdKind::PrNumber(42));
        assert_eq!(
            classify("@a1b2c").unwrap(),
            IdKind::ShortId("a1b2c".to_string())
        );
        assert_eq!(
            classify("a1b2c").unwrap(),
            IdKind::ShortId("a1b2c".to_string())
        );
        assert_eq!(
            classify("PRRC_kwDOAbc123").unwrap(),
            IdKind::FullId("PRRC_kwDOAbc123".to_string())
        );
        assert!(classify("!!!").is_err());
        assert!(classify("").is_err());
        // Node-id shape but too short
        assert!(classify("IC_a").is_err());
    }
}

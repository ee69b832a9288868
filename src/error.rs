//! Application error types.
//!
//! All fallible core operations return `Result<_, AppError>`. The variants
//! serialize to a structured JSON object so surfaces (CLI JSONL, tool-call
//! responses) can report errors without string parsing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Application-level errors raised by the core.
///
/// All variants serialize to a structured JSON object for surface consumption.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// Config file is malformed or carries out-of-range values.
    #[error("Config error: {message}")]
    Config { message: String },

    /// No usable credential, or GitHub rejected the one we sent.
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Transport-level failure (DNS, TCP, TLS, timeout).
    #[error("Network error: {message}")]
    Network { message: String },

    /// GitHub rate limit exhausted.
    #[error("Rate limited until {reset_at:?}")]
    RateLimit {
        #[serde(skip_serializing_if = "Option::is_none")]
        reset_at: Option<DateTime<Utc>>,
    },

    /// Requested resource does not exist.
    #[error("Not found: {resource}")]
    NotFound {
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// The remote rejected a write that is already in the requested state.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// GitHub API request failed in a way we will not retry.
    #[error("GitHub API error: {message}")]
    Api {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },

    /// Local store IO or serialization fault.
    #[error("Store error: {message}")]
    Store {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },

    /// Sync pass failed as a whole.
    #[error("Sync error: {message}")]
    Sync { message: String },

    /// Offline operation requested but the cache has never been populated.
    #[error("No cached data for {repo} ({scope}); run a sync first")]
    CacheMiss { repo: String, scope: String },

    /// Input does not match any recognised id shape.
    #[error("Unrecognised id format: {input}")]
    IdFormat { input: String },

    /// A short id maps to more than one comment in the repo.
    #[error("Ambiguous short id: {short_id}")]
    IdAmbiguous { short_id: String },

    /// An id of valid shape that resolves to nothing.
    #[error("Unknown id: {input}")]
    IdNotFound { input: String },

    /// Freeze/unfreeze user-input issue.
    #[error("Freeze error: {message}")]
    Freeze { message: String },

    /// Invalid user input.
    #[error("Invalid input: {message}")]
    Validation {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    /// Internal invariant violation.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a rate-limit error with an optional reset time.
    pub fn rate_limit(reset_at: Option<DateTime<Utc>>) -> Self {
        Self::RateLimit { reset_at }
    }

    /// Create a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: None,
        }
    }

    /// Create a not found error with the offending id.
    pub fn not_found_with_id(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.into()),
        }
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create an API error.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
            status_code: None,
            endpoint: None,
        }
    }

    /// Create an API error with status code and endpoint context.
    pub fn api_full(
        message: impl Into<String>,
        status_code: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::Api {
            message: message.into(),
            status_code: Some(status_code),
            endpoint: Some(endpoint.into()),
        }
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            operation: None,
        }
    }

    /// Create a store error with operation context.
    pub fn store_with_op(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            operation: Some(operation.into()),
        }
    }

    /// Create a sync error.
    pub fn sync(message: impl Into<String>) -> Self {
        Self::Sync {
            message: message.into(),
        }
    }

    /// Create a cache-miss error for a (repo, scope).
    pub fn cache_miss(repo: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::CacheMiss {
            repo: repo.into(),
            scope: scope.into(),
        }
    }

    /// Create an id-format error.
    pub fn id_format(input: impl Into<String>) -> Self {
        Self::IdFormat {
            input: input.into(),
        }
    }

    /// Create an id-not-found error.
    pub fn id_not_found(input: impl Into<String>) -> Self {
        Self::IdNotFound {
            input: input.into(),
        }
    }

    /// Create a freeze error.
    pub fn freeze(message: impl Into<String>) -> Self {
        Self::Freeze {
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error with field name.
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the operation may succeed on retry (network faults, 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Api { status_code, .. } => {
                matches!(status_code, Some(code) if *code >= 500)
            }
            _ => false,
        }
    }

}

// Conversions from common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::store(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network("Request timed out")
        } else if err.is_connect() {
            Self::network("Failed to connect to server")
        } else if err.is_status() {
            Self::api(format!("HTTP error: {}", err))
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = AppError::store("disk full");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"Store\""));
        assert!(json.contains("disk full"));
    }

    #[test]
    fn test_api_error_full() {
        let err = AppError::api_full("Not Found", 404, "/graphql");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"status_code\":404"));
        assert!(json.contains("/graphql"));
    }

    #[test]
    fn test_optional_fields_not_serialized() {
        let err = AppError::store("error");
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("operation"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::network("dns").is_transient());
        assert!(AppError::api_full("bad gateway", 502, "/graphql").is_transient());
        assert!(!AppError::api_full("forbidden", 403, "/graphql").is_transient());
        assert!(!AppError::auth("no token").is_transient());
    }

    #[test]
    fn test_display_impl() {
        let err = AppError::auth("invalid token");
        assert_eq!(format!("{}", err), "Authentication error: invalid token");
    }
}

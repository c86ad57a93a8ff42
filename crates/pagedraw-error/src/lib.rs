//! Error types for pagedraw.
//!
//! Two families live here:
//! - [`DrawError`] for library operations that return `Result` (persistence,
//!   configuration, storage keys).
//! - [`AbortReason`] for the terminal outcome of a selection session. A session
//!   never propagates a `DrawError`; every failure inside it is resolved to an
//!   `AbortReason` before the host is notified.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Library-level error.
#[derive(Debug, thiserror::Error)]
pub enum DrawError {
    /// Reading or writing durable storage failed.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value could not be encoded for persistence.
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Persisted bytes could not be decoded.
    #[error("failed to deserialize {what}: {detail}")]
    Deserialize { what: &'static str, detail: String },

    /// Configuration value rejected by validation or parsing.
    #[error("invalid config field `{field}`: {reason}")]
    InvalidConfig { field: String, reason: String },

    /// A storage key is not usable (empty or contains path separators).
    #[error("invalid storage key `{key}`")]
    InvalidKey { key: String },
}

impl DrawError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used across the workspace.
pub type Result<T, E = DrawError> = std::result::Result<T, E>;

/// Why a selection session ended without a resolved item.
///
/// `TransportFailure` and `StaleCache` are recoverable inside a session: the
/// controller only surfaces them if they can no longer be absorbed by the
/// phase-specific recovery rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The remote call itself failed (distinct from an empty page).
    #[error("remote request failed: {detail}")]
    TransportFailure { detail: String },

    /// The collection has no items, either at the first probe or at the
    /// discovered boundary.
    #[error("{detail}")]
    EmptyCollection { detail: String },

    /// A cached boundary no longer matches the remote collection.
    #[error("cached boundary for {fingerprint} is stale")]
    StaleCache { fingerprint: String },

    /// The filtered-mode retry cap was exceeded.
    #[error("connection failed or timed out after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },

    /// The resolved slot was out of range after clamping.
    #[error("invalid slot index {slot} on a page of {count}")]
    InvalidSelection { slot: i64, count: usize },

    /// The host could not produce a filter set for a smart start.
    #[error("failed to read the active search filters")]
    FilterUnavailable,
}

impl AbortReason {
    pub fn empty(detail: impl Into<String>) -> Self {
        Self::EmptyCollection {
            detail: detail.into(),
        }
    }

    /// Stable short identifier for structured logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TransportFailure { .. } => "transport_failure",
            Self::EmptyCollection { .. } => "empty_collection",
            Self::StaleCache { .. } => "stale_cache",
            Self::ExhaustedRetries { .. } => "exhausted_retries",
            Self::InvalidSelection { .. } => "invalid_selection",
            Self::FilterUnavailable => "filter_unavailable",
        }
    }

    /// Text handed to the presenter.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::EmptyCollection { detail } => detail.clone(),
            Self::ExhaustedRetries { .. } => "Connection failed or timed out.".to_owned(),
            Self::InvalidSelection { .. } => "Invalid slot index.".to_owned(),
            Self::FilterUnavailable => "Failed to create search object.".to_owned(),
            other => other.to_string(),
        }
    }
}

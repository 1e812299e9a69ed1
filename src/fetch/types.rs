// src/fetch/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::schema::{ColumnFallbacks, NormalizedRecord, SchemaError};

/// Shape of the payload a source returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Scraped page with one or more `<table>` elements.
    HtmlTable,
    /// Published spreadsheet exported as CSV.
    Csv,
    /// REST endpoint returning an array of objects (or rows).
    Json,
    /// Inline CSV shipped with the configuration; never hits the network.
    Snapshot,
}

/// One entry of a cascade. Immutable once configuration is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: String,
    /// Endpoint template; `{query}` is replaced with the URL-encoded caller argument.
    #[serde(default)]
    pub url: String,
    pub kind: SourceKind,
    /// Per-source timeout; the HTTP client default applies when absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Per-source client identity; the HTTP client default applies when absent.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// JSON pointer to the array holding the rows (JSON sources only).
    #[serde(default)]
    pub json_pointer: Option<String>,
    /// Provider-specific column positions used when keyword matching fails.
    #[serde(default)]
    pub fallback_columns: ColumnFallbacks,
    /// Inline CSV body for `Snapshot` sources.
    #[serde(default)]
    pub snapshot: Option<String>,
}

impl SourceDescriptor {
    pub fn new(id: impl Into<String>, url: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            kind,
            timeout_ms: None,
            user_agent: None,
            json_pointer: None,
            fallback_columns: ColumnFallbacks::new(),
            snapshot: None,
        }
    }

    pub fn snapshot(id: impl Into<String>, csv: impl Into<String>) -> Self {
        let mut s = Self::new(id, "", SourceKind::Snapshot);
        s.snapshot = Some(csv.into());
        s
    }

    pub fn with_timeout(mut self, t: Duration) -> Self {
        self.timeout_ms = Some(t.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Substitute `{query}` in the endpoint template.
    pub fn resolve_url(&self, query: Option<&str>) -> String {
        let q = query.unwrap_or_default();
        self.url.replace("{query}", &urlencoding::encode(q))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("unparseable payload: {0}")]
    Parse(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Coarse classification used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Schema,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } | FetchError::Status { .. } => {
                FailureKind::Network
            }
            FetchError::Parse(_) | FetchError::Schema(_) => FailureKind::Schema,
        }
    }
}

/// What happened to one source during a cascade run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Ok { records: usize },
    Empty,
    Failed { kind: FailureKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub source: String,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Tagged overall result of a cascade run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CascadeStatus {
    /// A source delivered at least one record.
    Fresh { source: String },
    /// Every source answered, none had rows (or there were no sources).
    Empty,
    /// Exhausted; the last failure was a transport/HTTP failure.
    NetworkFailure,
    /// Exhausted; the last failure was a payload/schema failure.
    SchemaFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeReport {
    pub records: Vec<NormalizedRecord>,
    pub status: CascadeStatus,
    pub attempts: Vec<Attempt>,
    pub fetched_at: DateTime<Utc>,
}

impl CascadeReport {
    pub fn is_fresh(&self) -> bool {
        matches!(self.status, CascadeStatus::Fresh { .. })
    }

    /// Failures are retried on the next call instead of pinning an empty
    /// result for a whole TTL.
    pub fn is_cacheable(&self) -> bool {
        matches!(self.status, CascadeStatus::Fresh { .. } | CascadeStatus::Empty)
    }
}

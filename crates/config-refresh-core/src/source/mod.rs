//! Remote source abstraction.
//!
//! The coordinator only needs two operations from the remote store: read the
//! current value of a sentinel entry and fetch the full entry set for a label
//! filter. Transport, authentication and retries inside a call are the
//! source's own business; any failure surfaces as a [`FetchError`].

use async_trait::async_trait;
use thiserror::Error;

use crate::entry::{ConfigEntry, LabelFilter, SentinelKey};

mod file;
mod memory;

pub use file::{FileSource, SourceDocument};
pub use memory::InMemorySource;

/// Failure while contacting the remote source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The source could not be reached or reported a service failure.
    #[error("remote source unavailable: {0}")]
    Unavailable(String),
    /// The source rejected the configured identity.
    #[error("remote source rejected credentials: {0}")]
    Unauthorized(String),
    #[error("remote source timed out")]
    Timeout,
    /// The source answered with data that could not be interpreted.
    #[error("malformed response from remote source: {0}")]
    Malformed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FetchError {
    /// Short, stable name of the error family used for log-level escalation.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Unauthorized(_) => "unauthorized",
            Self::Timeout => "timeout",
            Self::Malformed(_) => "malformed",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

/// External configuration store polled by the refresh coordinator.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Returns the sentinel's current value (or version tag), `None` when the
    /// sentinel does not exist in the source.
    async fn fetch_sentinel(&self, sentinel: &SentinelKey) -> Result<Option<String>, FetchError>;

    /// Returns every entry selected by `filter`.
    async fn fetch_all(&self, filter: &LabelFilter) -> Result<Vec<ConfigEntry>, FetchError>;
}

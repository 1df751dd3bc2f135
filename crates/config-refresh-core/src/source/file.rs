//! File-backed remote source.
//!
//! Reads a JSON document on every call, so edits to the file behave like
//! updates published to a remote store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FetchError, RemoteSource};
use crate::entry::{ConfigEntry, LabelFilter, SentinelKey};

/// On-disk layout read by [`FileSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    #[serde(default)]
    pub entries: Vec<ConfigEntry>,
}

/// Remote source reading a [`SourceDocument`] from disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<SourceDocument, FetchError> {
        let raw = tokio::fs::read(&self.path).await?;
        let document: SourceDocument = serde_json::from_slice(&raw)?;
        debug!(
            path = %self.path.display(),
            entries = document.entries.len(),
            "config-refresh: read source document"
        );
        Ok(document)
    }
}

#[async_trait]
impl RemoteSource for FileSource {
    async fn fetch_sentinel(&self, sentinel: &SentinelKey) -> Result<Option<String>, FetchError> {
        let document = self.read_document().await?;
        Ok(document
            .entries
            .into_iter()
            .find(|entry| entry.key == sentinel.key && entry.label == sentinel.label)
            .map(|entry| entry.value))
    }

    async fn fetch_all(&self, filter: &LabelFilter) -> Result<Vec<ConfigEntry>, FetchError> {
        let document = self.read_document().await?;
        Ok(document
            .entries
            .into_iter()
            .filter(|entry| filter.matches(&entry.label))
            .collect())
    }
}

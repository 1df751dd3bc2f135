//! In-process remote source.
//!
//! Holds entries in memory and lets callers script failures and latency,
//! which makes it the stand-in for a real store in tests and local embedding.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use super::{FetchError, RemoteSource};
use crate::entry::{ConfigEntry, LabelFilter, SentinelKey};

#[derive(Debug, Default)]
struct Script {
    entries: Vec<ConfigEntry>,
    sentinel_failures: VecDeque<FetchError>,
    fetch_all_failures: VecDeque<FetchError>,
    /// Persistent outage message; every call fails while set.
    outage: Option<String>,
    sentinel_delay: Duration,
    fetch_all_delay: Duration,
}

/// Remote source backed by an in-memory entry list.
#[derive(Debug, Default)]
pub struct InMemorySource {
    script: Mutex<Script>,
    sentinel_calls: AtomicUsize,
    fetch_all_calls: AtomicUsize,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a source pre-populated with `entries`.
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = ConfigEntry>,
    {
        let source = Self::new();
        source.replace_all(entries);
        source
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or overwrites the entry with the same `(key, label)`.
    pub fn set(&self, entry: ConfigEntry) {
        let mut script = self.script();
        match script
            .entries
            .iter_mut()
            .find(|existing| existing.key == entry.key && existing.label == entry.label)
        {
            Some(existing) => *existing = entry,
            None => script.entries.push(entry),
        }
    }

    /// Convenience wrapper around [`InMemorySource::set`].
    pub fn set_value(&self, key: &str, value: &str, label: &str) {
        self.set(ConfigEntry::new(key, value, label));
    }

    pub fn remove(&self, key: &str, label: &str) {
        self.script()
            .entries
            .retain(|entry| !(entry.key == key && entry.label == label));
    }

    pub fn replace_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = ConfigEntry>,
    {
        self.script().entries = entries.into_iter().collect();
    }

    /// Makes the next `fetch_sentinel` call fail with `error`.
    pub fn fail_next_sentinel(&self, error: FetchError) {
        self.script().sentinel_failures.push_back(error);
    }

    /// Makes the next `fetch_all` call fail with `error`.
    pub fn fail_next_fetch_all(&self, error: FetchError) {
        self.script().fetch_all_failures.push_back(error);
    }

    /// Starts (`Some`) or ends (`None`) a persistent outage.
    pub fn set_outage(&self, message: Option<&str>) {
        self.script().outage = message.map(str::to_owned);
    }

    /// Delays every `fetch_sentinel` call, simulating remote round-trip latency.
    pub fn set_sentinel_delay(&self, delay: Duration) {
        self.script().sentinel_delay = delay;
    }

    /// Delays every `fetch_all` call, simulating a slow full fetch.
    pub fn set_fetch_all_delay(&self, delay: Duration) {
        self.script().fetch_all_delay = delay;
    }

    pub fn sentinel_calls(&self) -> usize {
        self.sentinel_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_all_calls(&self) -> usize {
        self.fetch_all_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource for InMemorySource {
    async fn fetch_sentinel(&self, sentinel: &SentinelKey) -> Result<Option<String>, FetchError> {
        self.sentinel_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.script().sentinel_delay;
        if !delay.is_zero() {
            sleep(delay).await;
        }
        let mut script = self.script();
        if let Some(message) = script.outage.as_ref() {
            return Err(FetchError::Unavailable(message.clone()));
        }
        if let Some(error) = script.sentinel_failures.pop_front() {
            return Err(error);
        }
        Ok(script
            .entries
            .iter()
            .find(|entry| entry.key == sentinel.key && entry.label == sentinel.label)
            .map(|entry| entry.value.clone()))
    }

    async fn fetch_all(&self, filter: &LabelFilter) -> Result<Vec<ConfigEntry>, FetchError> {
        self.fetch_all_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.script().fetch_all_delay;
        if !delay.is_zero() {
            sleep(delay).await;
        }
        let mut script = self.script();
        if let Some(message) = script.outage.as_ref() {
            return Err(FetchError::Unavailable(message.clone()));
        }
        if let Some(error) = script.fetch_all_failures.pop_front() {
            return Err(error);
        }
        Ok(script
            .entries
            .iter()
            .filter(|entry| filter.matches(&entry.label))
            .cloned()
            .collect())
    }
}

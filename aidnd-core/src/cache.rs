//! Fetch-and-cache for full catalog records.
//!
//! Lookups go memory, then disk, then the remote source. Concurrent callers
//! asking for the same record share one in-flight fetch; callers for other
//! records never wait on it. Successful results land in memory and on disk
//! before the in-flight marker is dropped. Failures are handed to every
//! caller that joined the flight but are never stored, so the next call
//! retries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::{slugify, ResourceKind};
use crate::persist::write_atomic;

/// On-disk cache entry format version.
pub const CACHE_VERSION: u32 = 1;

/// Default bound on a single remote fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from fetching a record.
///
/// Cloneable so one failed flight can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("No {kind} record with slug {slug:?}")]
    NotFound { kind: ResourceKind, slug: String },

    #[error("Failed to parse record: {0}")]
    Parse(String),

    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cache storage error: {0}")]
    Storage(String),

    #[error("Invalid slug: {0:?}")]
    InvalidSlug(String),
}

/// Source of full record bodies.
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    async fn fetch(&self, kind: ResourceKind, slug: &str) -> Result<Value, FetchError>;
}

#[async_trait]
impl RecordFetcher for open5e::Open5e {
    async fn fetch(&self, kind: ResourceKind, slug: &str) -> Result<Value, FetchError> {
        self.get_record(kind.as_str(), slug).await.map_err(|e| match e {
            open5e::Error::NotFound { .. } => FetchError::NotFound {
                kind,
                slug: slug.to_string(),
            },
            open5e::Error::Timeout => FetchError::Timeout(self.timeout()),
            open5e::Error::Api { status, message } => FetchError::Status { status, message },
            open5e::Error::Network(message) => FetchError::Network(message),
            open5e::Error::Parse(message) => FetchError::Parse(message),
            open5e::Error::Config(message) => FetchError::InvalidSlug(message),
        })
    }
}

/// Identity of a cached record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub kind: ResourceKind,
    pub slug: String,
}

impl CacheKey {
    /// Normalize the slug; rejects slugs that fold to nothing.
    pub fn new(kind: ResourceKind, slug: &str) -> Result<Self, FetchError> {
        let normalized = slugify(slug);
        if normalized.is_empty() {
            return Err(FetchError::InvalidSlug(slug.to_string()));
        }
        Ok(Self {
            kind,
            slug: normalized,
        })
    }
}

/// A full record body and when it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub kind: ResourceKind,
    pub slug: String,
    pub fetched_at: DateTime<Utc>,
    pub body: Value,
}

impl CacheEntry {
    /// Whether the entry is still usable under `max_age`.
    pub fn is_fresh(&self, max_age: Option<Duration>) -> bool {
        let Some(max_age) = max_age else {
            return true;
        };
        Utc::now()
            .signed_duration_since(self.fetched_at)
            .to_std()
            .map_or(true, |age| age <= max_age)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    version: u32,
    #[serde(flatten)]
    entry: CacheEntry,
}

/// Cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory for `<kind>/<slug>.json` files; memory only when unset.
    pub dir: Option<PathBuf>,
    pub timeout: Duration,
    /// Entries older than this count as misses.
    pub max_age: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_age: None,
        }
    }
}

impl CacheConfig {
    pub fn memory_only() -> Self {
        Self::default()
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

type Flight = Shared<BoxFuture<'static, Result<Arc<CacheEntry>, FetchError>>>;

struct Inner {
    fetcher: Arc<dyn RecordFetcher>,
    config: CacheConfig,
    entries: Mutex<HashMap<CacheKey, Arc<CacheEntry>>>,
    in_flight: Mutex<HashMap<CacheKey, Flight>>,
}

/// Single-flight record cache. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct FetchCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FetchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCache")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl FetchCache {
    pub fn new(fetcher: Arc<dyn RecordFetcher>, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                config,
                entries: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Return the full record, fetching it at most once per key.
    pub async fn fetch_and_cache(
        &self,
        kind: ResourceKind,
        slug: &str,
    ) -> Result<Arc<CacheEntry>, FetchError> {
        let key = CacheKey::new(kind, slug)?;

        if let Some(entry) = self.inner.fresh_in_memory(&key).await {
            debug!(kind = %key.kind, slug = %key.slug, "cache hit (memory)");
            return Ok(entry);
        }

        let flight = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(flight) => {
                    debug!(kind = %key.kind, slug = %key.slug, "joining in-flight fetch");
                    flight.clone()
                }
                None => {
                    // A flight may have finished between the first check and this lock.
                    if let Some(entry) = self.inner.fresh_in_memory(&key).await {
                        return Ok(entry);
                    }
                    let flight = Inner::run_flight(self.inner.clone(), key.clone())
                        .boxed()
                        .shared();
                    in_flight.insert(key, flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    /// Peek at the memory cache without fetching.
    pub async fn cached(&self, kind: ResourceKind, slug: &str) -> Option<Arc<CacheEntry>> {
        let key = CacheKey::new(kind, slug).ok()?;
        self.inner.entries.lock().await.get(&key).cloned()
    }

    /// Drop one entry from memory and disk. Returns whether anything was removed.
    pub async fn evict(&self, kind: ResourceKind, slug: &str) -> Result<bool, FetchError> {
        let key = CacheKey::new(kind, slug)?;
        let in_memory = self.inner.entries.lock().await.remove(&key).is_some();

        let on_disk = match self.inner.entry_path(&key) {
            Some(path) => match tokio::fs::remove_file(&path).await {
                Ok(()) => true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => return Err(FetchError::Storage(format!("{}: {e}", path.display()))),
            },
            None => false,
        };

        if in_memory || on_disk {
            info!(kind = %key.kind, slug = %key.slug, "evicted cache entry");
        }
        Ok(in_memory || on_disk)
    }

    /// Number of entries held in memory.
    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Inner {
    async fn fresh_in_memory(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.entries
            .lock()
            .await
            .get(key)
            .filter(|entry| entry.is_fresh(self.config.max_age))
            .cloned()
    }

    async fn run_flight(self: Arc<Self>, key: CacheKey) -> Result<Arc<CacheEntry>, FetchError> {
        let result = self.load_or_fetch(&key).await.map(Arc::new);

        if let Ok(entry) = &result {
            self.entries.lock().await.insert(key.clone(), entry.clone());
        }
        self.in_flight.lock().await.remove(&key);

        if let Err(e) = &result {
            warn!(kind = %key.kind, slug = %key.slug, error = %e, "fetch failed");
        }
        result
    }

    async fn load_or_fetch(&self, key: &CacheKey) -> Result<CacheEntry, FetchError> {
        if let Some(entry) = self.read_disk(key).await {
            debug!(kind = %key.kind, slug = %key.slug, "cache hit (disk)");
            return Ok(entry);
        }

        debug!(kind = %key.kind, slug = %key.slug, "fetching record");
        let body = tokio::time::timeout(self.config.timeout, self.fetcher.fetch(key.kind, &key.slug))
            .await
            .map_err(|_| FetchError::Timeout(self.config.timeout))??;

        let entry = CacheEntry {
            kind: key.kind,
            slug: key.slug.clone(),
            fetched_at: Utc::now(),
            body,
        };
        self.write_disk(&entry).await?;
        info!(kind = %key.kind, slug = %key.slug, "fetched and cached record");
        Ok(entry)
    }

    fn entry_path(&self, key: &CacheKey) -> Option<PathBuf> {
        self.config
            .dir
            .as_ref()
            .map(|dir| dir.join(key.kind.as_str()).join(format!("{}.json", key.slug)))
    }

    /// A usable disk entry, or `None` on any kind of miss.
    async fn read_disk(&self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.entry_path(key)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable cache entry");
                return None;
            }
        };

        let stored: StoredEntry = match serde_json::from_str(&content) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache entry ignored");
                return None;
            }
        };
        if stored.version != CACHE_VERSION {
            warn!(path = %path.display(), version = stored.version, "cache entry version mismatch");
            return None;
        }
        if stored.entry.kind != key.kind || stored.entry.slug != key.slug {
            warn!(path = %path.display(), "cache entry does not match its key");
            return None;
        }
        if !stored.entry.is_fresh(self.config.max_age) {
            debug!(kind = %key.kind, slug = %key.slug, "stale cache entry");
            return None;
        }
        Some(stored.entry)
    }

    async fn write_disk(&self, entry: &CacheEntry) -> Result<(), FetchError> {
        let key = CacheKey {
            kind: entry.kind,
            slug: entry.slug.clone(),
        };
        let Some(path) = self.entry_path(&key) else {
            return Ok(());
        };

        let stored = StoredEntry {
            version: CACHE_VERSION,
            entry: entry.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&stored).map_err(|e| FetchError::Storage(e.to_string()))?;
        write_atomic(&path, &bytes)
            .await
            .map_err(|e| FetchError::Storage(format!("{}: {e}", path.display())))
    }
}

//! Cache-or-fetch-or-fallback pipeline shared by every provider
//!
//! A provider call walks `CACHE_CHECK → FETCH → (CACHE_WRITE | FALLBACK)`:
//!
//! 1. A fresh cache entry is returned as-is.
//! 2. Otherwise the provider's sources are fetched and merged.
//! 3. A merged result is written to the cache and returned.
//! 4. If nothing usable came back, the fallback value is returned and the
//!    cache is left untouched, so the next call retries the network.
//!
//! Callers always get a value. Failures only surface through [`DataOrigin`]
//! and the logs.

mod error;
mod http;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheStore, TimedCache};
use crate::clock::Clock;

pub use error::{FetchError, SourceFailure};
pub use http::{all_settled, build_client, send_json, Settled, Source};

/// Shared resources handed to every provider
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub client: Client,
    /// Upper bound on each individual source call
    pub timeout: Duration,
    pub store: Arc<dyn CacheStore>,
    pub clock: Arc<dyn Clock>,
}

impl FetchContext {
    /// Creates a cache for one domain over the shared store
    pub fn cache<T>(&self, ttl: Duration) -> TimedCache<T>
    where
        T: Serialize + DeserializeOwned,
    {
        TimedCache::new(Arc::clone(&self.store), Arc::clone(&self.clock), ttl)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Where a provided value came from
#[derive(Debug)]
pub enum DataOrigin {
    /// A fresh cache entry
    Cache,
    /// A live fetch; `failed` lists sources that failed while others succeeded
    Network { failed: Vec<SourceFailure> },
    /// The static fallback dataset, because no source produced usable data
    Fallback { failures: Vec<SourceFailure> },
}

impl DataOrigin {
    pub fn label(&self) -> &'static str {
        match self {
            DataOrigin::Cache => "cache",
            DataOrigin::Network { .. } => "network",
            DataOrigin::Fallback { .. } => "fallback",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, DataOrigin::Fallback { .. })
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, DataOrigin::Cache)
    }
}

/// A value handed to the caller together with its provenance
#[derive(Debug)]
pub struct Provided<T> {
    pub data: T,
    pub origin: DataOrigin,
    /// When the data was produced or cached ("last updated")
    pub updated_at: DateTime<Utc>,
}

impl<T> Provided<T> {
    pub fn fallback(data: T, failures: Vec<SourceFailure>, now: DateTime<Utc>) -> Self {
        Self {
            data,
            origin: DataOrigin::Fallback { failures },
            updated_at: now,
        }
    }

    /// Wraps a fetch outcome without going through a cache
    pub fn uncached(
        result: Result<Gathered<T>, Vec<SourceFailure>>,
        fallback: impl FnOnce() -> T,
        now: DateTime<Utc>,
    ) -> Self {
        match result {
            Ok(gathered) => Self {
                data: gathered.value,
                origin: DataOrigin::Network {
                    failed: gathered.failed,
                },
                updated_at: now,
            },
            Err(failures) => {
                warn!(failed_sources = failures.len(), "all sources failed, serving fallback data");
                Self::fallback(fallback(), failures, now)
            }
        }
    }
}

/// Result of a fetch attempt that produced something usable
#[derive(Debug)]
pub struct Gathered<T> {
    pub value: T,
    /// Sources that failed while others succeeded
    pub failed: Vec<SourceFailure>,
}

impl<R> Settled<R> {
    /// Merges the successful results
    ///
    /// `merge` returns `None` when the successes carry no usable data (e.g.,
    /// every source answered with an empty list); that counts as total failure.
    pub fn merge<T>(
        self,
        merge: impl FnOnce(Vec<(&'static str, R)>) -> Option<T>,
    ) -> Result<Gathered<T>, Vec<SourceFailure>> {
        if self.successes.is_empty() {
            return Err(self.failures);
        }
        match merge(self.successes) {
            Some(value) => Ok(Gathered {
                value,
                failed: self.failures,
            }),
            None => {
                debug!("sources succeeded but returned no usable data");
                Err(self.failures)
            }
        }
    }
}

/// Options for one provider call
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Skip the cache read; a successful fetch still refreshes the cache
    pub force_refresh: bool,
}

/// Serves `key` from `cache`, or runs `fetch` and caches its result, or falls back
pub async fn read_through<T, F, Fut, FB>(
    cache: &TimedCache<T>,
    key: &CacheKey,
    options: FetchOptions,
    fetch: F,
    fallback: FB,
) -> Provided<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Gathered<T>, Vec<SourceFailure>>>,
    FB: FnOnce() -> T,
{
    if !options.force_refresh {
        if let Some(cached) = cache.read(key) {
            return Provided {
                data: cached.data,
                origin: DataOrigin::Cache,
                updated_at: cached.cached_at,
            };
        }
    }

    match fetch().await {
        Ok(gathered) => {
            let updated_at = match cache.write(key, &gathered.value) {
                Ok(stored_at) => stored_at,
                Err(e) => {
                    warn!(%key, error = %e, "failed to write cache entry");
                    cache.now()
                }
            };
            Provided {
                data: gathered.value,
                origin: DataOrigin::Network {
                    failed: gathered.failed,
                },
                updated_at,
            }
        }
        Err(failures) => {
            warn!(%key, failed_sources = failures.len(), "all sources failed, serving fallback data");
            Provided::fallback(fallback(), failures, cache.now())
        }
    }
}

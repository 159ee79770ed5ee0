//! Timed read-through cache over a [`CacheStore`]
//!
//! Entries are stored as `{"data": ..., "timestamp": <epoch millis>}` and are
//! valid while `now - timestamp < ttl`. Anything unreadable is a miss.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::key::CacheKey;
use super::store::CacheStore;
use crate::clock::{millis_to_datetime, Clock};

/// Wrapper stored on disk for each entry
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    /// The cached value
    #[serde(rename = "data")]
    value: T,
    /// Wall-clock time of the write, in epoch milliseconds
    #[serde(rename = "timestamp")]
    stored_at_ms: i64,
}

/// A fresh value read from the cache
#[derive(Debug, Clone, PartialEq)]
pub struct CachedData<T> {
    /// The cached value
    pub data: T,
    /// When the value was written
    pub cached_at: DateTime<Utc>,
}

/// Errors that can occur when writing a cache entry
#[derive(Debug, Error)]
pub enum CacheError {
    /// The value could not be serialized
    #[error("Failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The backing store rejected the write
    #[error("Cache store error: {0}")]
    Store(#[from] std::io::Error),
}

/// Single-slot-per-key cache with a fixed time-to-live
///
/// There is no eviction policy besides the TTL: the key space is a small set
/// of domains times the distinct request parameters seen by this process.
pub struct TimedCache<T> {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for TimedCache<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            ttl: self.ttl,
            _value: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TimedCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedCache")
            .field("store", &self.store)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<T> TimedCache<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            _value: PhantomData,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current time according to the cache's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Reads a fresh entry
    ///
    /// Returns `None` when the entry is missing, expired, unreadable or fails
    /// to deserialize. Never panics and never returns an error.
    pub fn read(&self, key: &CacheKey) -> Option<CachedData<T>> {
        let content = match self.store.load(key.as_str()) {
            Ok(Some(content)) => content,
            Ok(None) => {
                debug!(%key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(%key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(%key, error = %e, "corrupted cache entry, treating as miss");
                return None;
            }
        };

        let age_ms = self.clock.now_millis().saturating_sub(entry.stored_at_ms);
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        if age_ms >= ttl_ms {
            debug!(%key, age_ms, "cache entry expired");
            return None;
        }

        debug!(%key, age_ms, "cache hit");
        Some(CachedData {
            data: entry.value,
            cached_at: millis_to_datetime(entry.stored_at_ms),
        })
    }

    /// Stores `value` stamped with the current time, overwriting any previous entry
    ///
    /// Returns the timestamp that was written.
    pub fn write(&self, key: &CacheKey, value: &T) -> Result<DateTime<Utc>, CacheError> {
        let stored_at_ms = self.clock.now_millis();
        let entry = CacheEntry {
            value,
            stored_at_ms,
        };
        let json = serde_json::to_string(&entry)?;
        self.store.save(key.as_str(), &json)?;
        debug!(%key, "cache entry written");
        Ok(millis_to_datetime(stored_at_ms))
    }
}

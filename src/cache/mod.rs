//! Cache module for storing fetched data between runs
//!
//! A [`TimedCache`] keeps one entry per [`CacheKey`] with a fixed TTL on top of
//! a pluggable [`CacheStore`]. Expired or corrupted entries read as misses, so
//! a broken cache degrades to a network fetch instead of an error.

mod key;
mod manager;
mod store;

pub use key::CacheKey;
pub use manager::{CacheError, CachedData, TimedCache};
pub use store::{CacheStore, FileStore, MemoryStore};

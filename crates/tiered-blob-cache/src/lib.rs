//! Two-tier blob cache with per-entry expiration
//!
//! Caches values under string keys in a bounded memory tier backed by a
//! persistent disk tier. Memory answers synchronously; disk I/O runs on a
//! per-instance FIFO lane. The disk tier keeps its metadata entirely in
//! file timestamps, so a directory listing alone drives cleanup.

mod disk;
mod error;
mod expiration;
mod memory;
mod tiered;
mod types;

pub use disk::{DiskCache, DiskConfig};
pub use error::{CacheError, Result};
pub use expiration::{AccessExtension, Expiration};
pub use memory::{MemoryCache, MemoryConfig};
pub use tiered::{GetOptions, PutOptions, TieredCache};
pub use types::{
    CacheCost, CacheLookup, CacheStats, CacheTier, CacheableValue, CleanupEvent, CleanupReport,
    StoreOutcome, ValueError,
};

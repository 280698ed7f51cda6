//! Two-tier composition: memory front, disk behind
//!
//! Reads go memory first and short-circuit; a disk hit warms the memory
//! tier before returning. Writes land in memory synchronously and reach
//! disk through its lane, with each tier reporting its own outcome.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use crate::disk::{DiskCache, DiskConfig};
use crate::error::Result;
use crate::expiration::{AccessExtension, Expiration};
use crate::memory::{MemoryCache, MemoryConfig};
use crate::types::{
    CacheCost, CacheLookup, CacheStats, CacheTier, CacheableValue, CleanupEvent, CleanupReport,
    StoreOutcome,
};

/// Cleanup events queued per subscriber before sends are dropped.
const EVENT_QUEUE_DEPTH: usize = 16;

/// Options for a write-through store.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Memory-tier expiration override.
    pub memory_expiration: Option<Expiration>,
    /// Disk-tier expiration override.
    pub disk_expiration: Option<Expiration>,
    /// Skip the disk tier entirely.
    pub memory_only: bool,
    /// Allow the memory payload to be discarded under pressure.
    pub volatile: bool,
}

/// Options for a read-through fetch.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Consult only the memory tier.
    pub memory_only: bool,
    /// Extension applied to a memory hit.
    pub memory_extension: AccessExtension,
    /// Extension applied to a disk hit.
    pub disk_extension: AccessExtension,
}

/// Two-tier cache over values that can live in memory and on disk.
pub struct TieredCache<V> {
    memory: MemoryCache<V>,
    disk: DiskCache<V>,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    cleanup_tx: Mutex<Option<mpsc::Sender<CleanupEvent>>>,
}

impl<V> TieredCache<V>
where
    V: CacheableValue + CacheCost + Clone,
{
    /// Create a named cache with default tier configurations.
    pub fn new(name: &str) -> Result<Self> {
        Self::with_configs(MemoryConfig::default(), DiskConfig::new(name))
    }

    pub fn with_configs(memory: MemoryConfig, disk: DiskConfig) -> Result<Self> {
        Ok(Self::with_tiers(MemoryCache::new(memory), DiskCache::new(disk)?))
    }

    /// Compose pre-built tiers.
    pub fn with_tiers(memory: MemoryCache<V>, disk: DiskCache<V>) -> Self {
        Self {
            memory,
            disk,
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            cleanup_tx: Mutex::new(None),
        }
    }

    pub fn memory(&self) -> &MemoryCache<V> {
        &self.memory
    }

    pub fn disk(&self) -> &DiskCache<V> {
        &self.disk
    }

    /// Write-through store with default options.
    pub async fn put(&self, key: &str, value: V) -> StoreOutcome {
        self.put_with(key, value, PutOptions::default()).await
    }

    /// Write-through store. The memory tier accepts synchronously and
    /// cannot fail; the disk tier reports its own outcome.
    pub async fn put_with(&self, key: &str, value: V, options: PutOptions) -> StoreOutcome {
        if options.volatile {
            self.memory
                .store_volatile(key, value.clone(), options.memory_expiration);
        } else {
            self.memory.store(key, value.clone(), options.memory_expiration);
        }
        let disk = if options.memory_only {
            Ok(())
        } else {
            self.disk.store(key, value, options.disk_expiration).await
        };
        if let Err(err) = &disk {
            debug!(key = %key, error = %err, "Disk store failed");
        }
        StoreOutcome {
            memory: Ok(()),
            disk,
        }
    }

    /// Store only to the disk tier.
    pub async fn put_to_disk(
        &self,
        key: &str,
        value: V,
        expiration: Option<Expiration>,
    ) -> Result<()> {
        self.disk.store(key, value, expiration).await
    }

    /// Read-through fetch with default options.
    pub async fn get(&self, key: &str) -> Result<CacheLookup<V>> {
        self.get_with(key, GetOptions::default()).await
    }

    /// Read-through fetch. The memory tier answers synchronously and
    /// short-circuits; a disk hit warms the memory tier (without writing
    /// back to disk) before returning.
    pub async fn get_with(&self, key: &str, options: GetOptions) -> Result<CacheLookup<V>> {
        if let Some(value) = self.memory.fetch(key, options.memory_extension) {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Memory cache hit");
            return Ok(CacheLookup::Memory(value));
        }
        if options.memory_only {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(CacheLookup::Miss);
        }
        match self.disk.fetch(key, options.disk_extension).await? {
            Some(value) => {
                self.disk_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Disk cache hit");
                // Warm the memory tier so the next read is synchronous.
                self.memory.store(key, value.clone(), None);
                Ok(CacheLookup::Disk(value))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss");
                Ok(CacheLookup::Miss)
            }
        }
    }

    /// Fetch from the memory tier only, synchronously.
    pub fn get_from_memory(&self, key: &str) -> Option<V> {
        self.memory.fetch(key, AccessExtension::PreserveDuration)
    }

    /// Fetch from the disk tier without warming memory.
    pub async fn get_from_disk(&self, key: &str) -> Result<Option<V>> {
        self.disk.fetch(key, AccessExtension::PreserveDuration).await
    }

    /// Remove the value from both tiers.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.remove_with(key, true, true).await
    }

    pub async fn remove_with(&self, key: &str, from_memory: bool, from_disk: bool) -> Result<()> {
        if from_memory {
            self.memory.remove(key);
        }
        if from_disk {
            self.disk.remove(key).await?;
        }
        Ok(())
    }

    /// Which tier would answer for the key right now. The disk check is a
    /// payload-free probe.
    pub async fn cached_tier(&self, key: &str) -> CacheTier {
        if self.memory.is_cached(key) {
            CacheTier::Memory
        } else if self.disk.exists(key).await {
            CacheTier::Disk
        } else {
            CacheTier::None
        }
    }

    pub async fn is_cached(&self, key: &str) -> bool {
        self.cached_tier(key).await.is_cached()
    }

    /// Remove everything from both tiers. Operator-invoked; emits no
    /// cleanup event.
    pub async fn clear(&self) -> Result<()> {
        self.memory.remove_all();
        self.disk.remove_all().await
    }

    /// Reclaim expired entries in both tiers, then shrink the disk tier
    /// under its size limit. Removed disk files are reported and, when a
    /// subscriber is registered, emitted as a cleanup event.
    pub async fn clean_expired(&self) -> Result<CleanupReport> {
        self.memory.remove_expired();
        let expired = self.disk.remove_expired().await?;
        let size_evicted = self.disk.remove_over_size_limit().await?;
        let report = CleanupReport {
            expired,
            size_evicted,
        };
        if !report.is_empty() {
            self.emit_cleanup(&report);
        }
        Ok(report)
    }

    /// Subscribe to automatic-cleanup events. Each call replaces the
    /// previous subscription.
    pub fn subscribe_cleanup(&self) -> mpsc::Receiver<CleanupEvent> {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        *self.cleanup_tx.lock() = Some(tx);
        rx
    }

    fn emit_cleanup(&self, report: &CleanupReport) {
        let sender = self.cleanup_tx.lock().clone();
        let Some(sender) = sender else { return };
        let event = CleanupEvent {
            removed_files: report.file_names(),
        };
        // Best effort; a full or dropped subscriber never stalls cleanup.
        if sender.try_send(event).is_err() {
            debug!("Cleanup event dropped");
        }
    }

    /// Clear payloads of volatile memory entries (the host's
    /// memory-pressure hook). Disk copies are unaffected.
    pub fn discard_volatile(&self) -> usize {
        self.memory.discard_volatile()
    }

    /// Snapshot of hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Total size in bytes of the disk tier.
    pub async fn disk_size(&self) -> Result<u64> {
        self.disk.total_size().await
    }

    /// Expected on-disk location for a key.
    pub fn file_path_for(&self, key: &str) -> PathBuf {
        self.disk.file_path(key, None)
    }
}

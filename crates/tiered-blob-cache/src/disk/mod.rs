//! Size-bounded, TTL-aware persistent tier
//!
//! Values live as flat files under one backing directory. The only
//! per-file metadata is two timestamp attributes (last access and
//! estimated expiry); there is no companion index file or database. An
//! approximate in-memory existence index makes negative lookups cheap
//! without ever being trusted over the filesystem.

mod index;
mod lane;
mod meta;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};
use crate::expiration::{AccessExtension, Expiration};
use crate::types::CacheableValue;

use index::ExistenceIndex;
use lane::DiskJob;

const DEFAULT_EXPIRATION: Expiration = Expiration::Days(7);
/// Joined with the cache name to form the backing directory name.
const DIRECTORY_PREFIX: &str = "tiered-blob-cache";
/// Queued jobs per instance before submitters back-pressure.
const LANE_DEPTH: usize = 64;

/// Configuration for a disk tier instance.
///
/// Two instances must never share a backing directory; distinct names, or
/// distinct explicit directories, keep them disjoint.
#[derive(Debug, Clone)]
pub struct DiskConfig {
    /// Cache name; becomes the final component of the backing directory.
    pub name: String,
    /// Parent of the backing directory. Defaults to the platform cache
    /// directory.
    pub directory: Option<PathBuf>,
    /// Size bound in bytes enforced by `remove_over_size_limit`.
    /// 0 means unbounded.
    pub size_limit: u64,
    /// Expiration applied when a store call does not override it.
    pub expiration: Expiration,
    /// Derive file names by hashing keys. Disable only when every key is
    /// already a safe path component.
    pub hashed_filenames: bool,
    /// Extension appended to every derived file name.
    pub path_extension: Option<String>,
    /// With hashed file names, also append the extension carried by the
    /// key itself.
    pub auto_extension: bool,
}

impl DiskConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directory: None,
            size_limit: 0,
            expiration: DEFAULT_EXPIRATION,
            hashed_filenames: true,
            path_extension: None,
            auto_extension: false,
        }
    }
}

pub(crate) struct DiskInner {
    directory: PathBuf,
    /// Hot-swappable limits and naming, independent of the lane.
    config: RwLock<DiskConfig>,
    /// Sticky readiness; false only while the backing directory is
    /// unusable.
    ready: AtomicBool,
    /// Written by the lane and the one-shot build task only.
    index: Mutex<ExistenceIndex>,
}

impl DiskInner {
    fn check_ready(&self) -> Result<()> {
        if self.ready.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CacheError::StorageNotReady {
                dir: self.directory.clone(),
            })
        }
    }

    fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// Derive the file name for a key under the current naming config.
    fn file_name(&self, key: &str, forced_extension: Option<&str>) -> String {
        let config = self.config.read();
        let base = if config.hashed_filenames {
            hash_key(key)
        } else {
            key.to_string()
        };
        let extension = forced_extension
            .map(str::to_string)
            .or_else(|| config.path_extension.clone())
            .or_else(|| {
                if config.hashed_filenames && config.auto_extension {
                    key_extension(key)
                } else {
                    None
                }
            });
        match extension {
            Some(ext) if !ext.is_empty() => format!("{}.{}", base, ext),
            _ => base,
        }
    }
}

/// Persistent cache tier.
///
/// Every operation executes on the instance's I/O lane in submission
/// order; the caller is suspended until its reply arrives, never
/// thread-blocked.
pub struct DiskCache<T> {
    inner: Arc<DiskInner>,
    lane: mpsc::Sender<DiskJob<T>>,
}

impl<T: CacheableValue> DiskCache<T> {
    /// Create a disk tier and eagerly create its backing directory.
    ///
    /// Directory creation failure is not an error here: the instance
    /// comes up not ready, every operation fails fast with
    /// `StorageNotReady`, and a successful [`remove_all`](Self::remove_all)
    /// is the only way back. Errors are reserved for configuration that
    /// can never work, like an empty name.
    ///
    /// Must be called within a tokio runtime; the lane worker and the
    /// index build task are spawned onto it.
    pub fn new(config: DiskConfig) -> Result<Self> {
        let directory = resolve_directory(&config)?;
        let ready = match std::fs::create_dir_all(&directory) {
            Ok(()) => true,
            Err(err) => {
                warn!(dir = ?directory, error = %err, "Cache directory unavailable; disk tier not ready");
                false
            }
        };
        let inner = Arc::new(DiskInner {
            directory,
            config: RwLock::new(config),
            ready: AtomicBool::new(ready),
            index: Mutex::new(ExistenceIndex::new()),
        });
        let (lane, jobs) = mpsc::channel(LANE_DEPTH);
        tokio::spawn(lane::run(inner.clone(), jobs));
        tokio::spawn(build_index(inner.clone()));
        if ready {
            info!(dir = ?inner.directory, "Disk cache initialized");
        }
        Ok(Self { inner, lane })
    }

    /// Persist a value. A resolved expiration already in the past stores
    /// nothing and succeeds.
    pub async fn store(&self, key: &str, value: T, expiration: Option<Expiration>) -> Result<()> {
        self.store_with_extension(key, value, expiration, None).await
    }

    pub async fn store_with_extension(
        &self,
        key: &str,
        value: T,
        expiration: Option<Expiration>,
        forced_extension: Option<&str>,
    ) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.submit(DiskJob::Store {
            key: key.to_string(),
            value,
            expiration,
            forced_extension: forced_extension.map(str::to_string),
            reply,
        })
        .await?;
        response.await.map_err(|_| CacheError::Closed)?
    }

    /// Fetch a live value, re-applying the extension to the file
    /// timestamps after the value has been returned.
    pub async fn fetch(&self, key: &str, extension: AccessExtension) -> Result<Option<T>> {
        self.fetch_at(key, Utc::now(), true, extension, None).await
    }

    /// Fetch with an explicit reference instant and full control over
    /// payload loading and file-name derivation.
    ///
    /// With `load_payload` false the payload is not read, the value
    /// type's empty placeholder stands in for it, and timestamps are left
    /// untouched.
    pub async fn fetch_at(
        &self,
        key: &str,
        reference: DateTime<Utc>,
        load_payload: bool,
        extension: AccessExtension,
        forced_extension: Option<&str>,
    ) -> Result<Option<T>> {
        let (reply, response) = oneshot::channel();
        self.submit(DiskJob::Fetch {
            key: key.to_string(),
            reference,
            load_payload,
            extension,
            forced_extension: forced_extension.map(str::to_string),
            reply,
        })
        .await?;
        response.await.map_err(|_| CacheError::Closed)?
    }

    /// Whether a live value exists for the key. Every failure, including
    /// an unready tier, reads as absent.
    pub async fn exists(&self, key: &str) -> bool {
        self.exists_at(key, Utc::now()).await
    }

    pub async fn exists_at(&self, key: &str, reference: DateTime<Utc>) -> bool {
        matches!(
            self.fetch_at(key, reference, false, AccessExtension::None, None)
                .await,
            Ok(Some(_))
        )
    }

    /// Remove the value for a key. Removing an absent key succeeds.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.remove_with_extension(key, None).await
    }

    pub async fn remove_with_extension(
        &self,
        key: &str,
        forced_extension: Option<&str>,
    ) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.submit(DiskJob::Remove {
            key: key.to_string(),
            forced_extension: forced_extension.map(str::to_string),
            reply,
        })
        .await?;
        response.await.map_err(|_| CacheError::Closed)?
    }

    /// Delete the entire backing directory and recreate it empty. On
    /// success the tier is ready again regardless of prior state.
    pub async fn remove_all(&self) -> Result<()> {
        self.submit_remove_all(false).await
    }

    /// Delete the backing directory without recreating it. A later store
    /// recreates it on demand.
    pub async fn remove_all_without_recreate(&self) -> Result<()> {
        self.submit_remove_all(true).await
    }

    async fn submit_remove_all(&self, skip_recreate: bool) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.submit(DiskJob::RemoveAll {
            skip_recreate,
            reply,
        })
        .await?;
        response.await.map_err(|_| CacheError::Closed)?
    }

    /// Delete every expired file and return their locations.
    pub async fn remove_expired(&self) -> Result<Vec<PathBuf>> {
        self.remove_expired_at(Utc::now()).await
    }

    pub async fn remove_expired_at(&self, reference: DateTime<Utc>) -> Result<Vec<PathBuf>> {
        let (reply, response) = oneshot::channel();
        self.submit(DiskJob::RemoveExpired { reference, reply }).await?;
        response.await.map_err(|_| CacheError::Closed)?
    }

    /// Evict least-recently-used files until usage drops to half the size
    /// limit. A no-op while unbounded or strictly under the limit.
    pub async fn remove_over_size_limit(&self) -> Result<Vec<PathBuf>> {
        let (reply, response) = oneshot::channel();
        self.submit(DiskJob::RemoveOverSizeLimit { reply }).await?;
        response.await.map_err(|_| CacheError::Closed)?
    }

    /// Total size in bytes of the backing directory. Files whose size
    /// cannot be read contribute zero.
    pub async fn total_size(&self) -> Result<u64> {
        let (reply, response) = oneshot::channel();
        self.submit(DiskJob::TotalSize { reply }).await?;
        response.await.map_err(|_| CacheError::Closed)?
    }

    /// Expected on-disk location for a key under the current naming
    /// config.
    pub fn file_path(&self, key: &str, forced_extension: Option<&str>) -> PathBuf {
        self.inner
            .directory
            .join(self.inner.file_name(key, forced_extension))
    }

    /// Derived file name for a key.
    pub fn file_name(&self, key: &str, forced_extension: Option<&str>) -> String {
        self.inner.file_name(key, forced_extension)
    }

    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    pub fn config(&self) -> DiskConfig {
        self.inner.config.read().clone()
    }

    /// Swap limits, default expiration and naming. The backing directory
    /// is fixed at construction and does not move with a new name or
    /// directory.
    pub fn configure(&self, config: DiskConfig) {
        *self.inner.config.write() = config;
    }

    async fn submit(&self, job: DiskJob<T>) -> Result<()> {
        self.lane.send(job).await.map_err(|_| CacheError::Closed)
    }
}

/// One-shot startup scan that turns the existence index live.
async fn build_index(inner: Arc<DiskInner>) {
    let mut names = HashSet::new();
    let mut reader = match fs::read_dir(&inner.directory).await {
        Ok(reader) => reader,
        Err(err) => {
            warn!(dir = ?inner.directory, error = %err, "Disabling existence index");
            inner.index.lock().disable();
            return;
        }
    };
    loop {
        match reader.next_entry().await {
            Ok(Some(entry)) => {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with('.') {
                    names.insert(name);
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(dir = ?inner.directory, error = %err, "Disabling existence index");
                inner.index.lock().disable();
                return;
            }
        }
    }
    debug!(entries = names.len(), "Existence index built");
    inner.index.lock().complete(names);
}

fn resolve_directory(config: &DiskConfig) -> Result<PathBuf> {
    if config.name.is_empty() {
        return Err(CacheError::InvalidConfig(
            "cache name must not be empty".to_string(),
        ));
    }
    let base = match &config.directory {
        Some(directory) => directory.clone(),
        None => dirs_next::cache_dir().ok_or_else(|| {
            CacheError::InvalidConfig("no platform cache directory available".to_string())
        })?,
    };
    Ok(base.join(format!("{}.{}", DIRECTORY_PREFIX, config.name)))
}

/// SHA-256 hex digest of the key.
fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

fn key_extension(key: &str) -> Option<String> {
    Path::new(key)
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn config_in(dir: &Path, name: &str) -> DiskConfig {
        let mut config = DiskConfig::new(name);
        config.directory = Some(dir.to_path_buf());
        config
    }

    fn bytes_cache(dir: &Path, name: &str) -> DiskCache<Vec<u8>> {
        DiskCache::new(config_in(dir, name)).unwrap()
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let err = resolve_directory(&DiskConfig::new("")).unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfig(_)));
    }

    #[test]
    fn test_hashed_file_name_shape() {
        let config = DiskConfig::new("images");
        let inner = DiskInner {
            directory: PathBuf::from("/tmp"),
            config: RwLock::new(config),
            ready: AtomicBool::new(true),
            index: Mutex::new(ExistenceIndex::new()),
        };
        let name = inner.file_name("https://example.com/a.png", None);
        assert_eq!(name.len(), 64);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
        // Same key, same name; different key, different name.
        assert_eq!(name, inner.file_name("https://example.com/a.png", None));
        assert_ne!(name, inner.file_name("https://example.com/b.png", None));
    }

    #[test]
    fn test_file_name_extension_precedence() {
        let mut config = DiskConfig::new("images");
        config.path_extension = Some("bin".to_string());
        config.auto_extension = true;
        let inner = DiskInner {
            directory: PathBuf::from("/tmp"),
            config: RwLock::new(config),
            ready: AtomicBool::new(true),
            index: Mutex::new(ExistenceIndex::new()),
        };
        // Forced beats configured beats the key's own extension.
        assert!(inner.file_name("photo.png", Some("jpg")).ends_with(".jpg"));
        assert!(inner.file_name("photo.png", None).ends_with(".bin"));

        inner.config.write().path_extension = None;
        assert!(inner.file_name("photo.png", None).ends_with(".png"));
    }

    #[test]
    fn test_raw_file_name_keeps_key() {
        let mut config = DiskConfig::new("images");
        config.hashed_filenames = false;
        let inner = DiskInner {
            directory: PathBuf::from("/tmp"),
            config: RwLock::new(config),
            ready: AtomicBool::new(true),
            index: Mutex::new(ExistenceIndex::new()),
        };
        assert_eq!(inner.file_name("plain-key", None), "plain-key");
    }

    #[tokio::test]
    async fn test_store_and_fetch() {
        let dir = tempdir().unwrap();
        let cache = bytes_cache(dir.path(), "basic");

        cache.store("k", b"payload".to_vec(), None).await.unwrap();
        let value = cache.fetch("k", AccessExtension::None).await.unwrap();
        assert_eq!(value, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn test_fetch_missing_key() {
        let dir = tempdir().unwrap();
        let cache = bytes_cache(dir.path(), "missing");
        assert_eq!(cache.fetch("absent", AccessExtension::None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_expired_policy_writes_nothing() {
        let dir = tempdir().unwrap();
        let cache = bytes_cache(dir.path(), "expired-store");

        cache
            .store("k", b"gone".to_vec(), Some(Expiration::Expired))
            .await
            .unwrap();
        assert_eq!(cache.fetch("k", AccessExtension::None).await.unwrap(), None);
        assert_eq!(cache.total_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ttl_hit_then_miss_with_reference_instants() {
        let dir = tempdir().unwrap();
        let cache = bytes_cache(dir.path(), "ttl");
        let t0 = Utc::now();

        cache
            .store("greeting", b"hello".to_vec(), Some(Expiration::Seconds(1.0)))
            .await
            .unwrap();

        let half = t0 + Duration::milliseconds(500);
        let hit = cache
            .fetch_at("greeting", half, true, AccessExtension::None, None)
            .await
            .unwrap();
        assert_eq!(hit, Some(b"hello".to_vec()));

        let later = t0 + Duration::seconds(2);
        let miss = cache
            .fetch_at("greeting", later, true, AccessExtension::None, None)
            .await
            .unwrap();
        assert_eq!(miss, None);

        // The expired file stays on disk until a cleanup pass claims it.
        assert_eq!(cache.total_size().await.unwrap(), 5);
        let removed = cache.remove_expired_at(later).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(cache.total_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_probe_returns_placeholder_and_preserves_access_time() {
        let dir = tempdir().unwrap();
        let cache = bytes_cache(dir.path(), "probe");

        cache.store("k", b"payload".to_vec(), None).await.unwrap();
        let path = cache.file_path("k", None);
        let access_before = std::fs::metadata(&path).unwrap().accessed().unwrap();

        let probed = cache
            .fetch_at("k", Utc::now(), false, AccessExtension::PreserveDuration, None)
            .await
            .unwrap();
        assert_eq!(probed, Some(Vec::new()));
        assert!(cache.exists("k").await);

        // Fence on the lane so any (unexpected) rewrite would have landed.
        cache.total_size().await.unwrap();
        let access_after = std::fs::metadata(&path).unwrap().accessed().unwrap();
        assert_eq!(access_before, access_after);
    }

    #[tokio::test]
    async fn test_fetch_extension_rewrites_timestamps() {
        let dir = tempdir().unwrap();
        let cache = bytes_cache(dir.path(), "extend");

        cache
            .store("k", b"payload".to_vec(), Some(Expiration::Seconds(60.0)))
            .await
            .unwrap();
        let path = cache.file_path("k", None);
        let expiry_before = std::fs::metadata(&path).unwrap().modified().unwrap();

        let value = cache
            .fetch("k", AccessExtension::ResetTo(Expiration::Days(1)))
            .await
            .unwrap();
        assert!(value.is_some());

        // Fence on the lane; the rewrite is ordered before the next job.
        cache.total_size().await.unwrap();
        let expiry_after = std::fs::metadata(&path).unwrap().modified().unwrap();
        let extended = expiry_after
            .duration_since(expiry_before)
            .expect("expiry moved backwards");
        assert!(extended.as_secs() > 23 * 3600);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let cache = bytes_cache(dir.path(), "remove");

        cache.store("k", b"payload".to_vec(), None).await.unwrap();
        cache.remove("k").await.unwrap();
        assert_eq!(cache.fetch("k", AccessExtension::None).await.unwrap(), None);
        cache.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_all_recreates_empty_directory() {
        let dir = tempdir().unwrap();
        let cache = bytes_cache(dir.path(), "clear");

        cache.store("a", vec![1], None).await.unwrap();
        cache.store("b", vec![2], None).await.unwrap();
        cache.remove_all().await.unwrap();

        assert!(cache.directory().is_dir());
        assert_eq!(cache.total_size().await.unwrap(), 0);
        assert!(cache.is_ready());

        // Clearing an already-empty tier lands in the same state.
        cache.remove_all().await.unwrap();
        assert!(cache.directory().is_dir());
        assert_eq!(cache.total_size().await.unwrap(), 0);
        assert!(cache.is_ready());

        // Still fully usable afterwards.
        cache.store("c", vec![3], None).await.unwrap();
        assert!(cache.exists("c").await);
    }

    #[tokio::test]
    async fn test_store_recreates_deleted_directory() {
        let dir = tempdir().unwrap();
        let cache = bytes_cache(dir.path(), "recreate");

        cache.store("a", vec![1], None).await.unwrap();
        std::fs::remove_dir_all(cache.directory()).unwrap();

        cache.store("b", vec![2], None).await.unwrap();
        assert_eq!(
            cache.fetch("b", AccessExtension::None).await.unwrap(),
            Some(vec![2])
        );
    }

    #[tokio::test]
    async fn test_unready_tier_fails_fast_and_recovers() {
        let dir = tempdir().unwrap();
        // A file where the parent directory should be makes creation fail.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"in the way").unwrap();

        let cache: DiskCache<Vec<u8>> = DiskCache::new(config_in(&blocker, "stuck")).unwrap();
        assert!(!cache.is_ready());

        let err = cache.store("k", vec![1], None).await.unwrap_err();
        assert!(matches!(err, CacheError::StorageNotReady { .. }));
        assert!(matches!(
            cache.fetch("k", AccessExtension::None).await.unwrap_err(),
            CacheError::StorageNotReady { .. }
        ));
        assert!(!cache.exists("k").await);

        // Clearing the obstruction and wiping the tier restores service.
        std::fs::remove_file(&blocker).unwrap();
        cache.remove_all().await.unwrap();
        assert!(cache.is_ready());
        cache.store("k", vec![1], None).await.unwrap();
        assert!(cache.exists("k").await);
    }

    #[tokio::test]
    async fn test_size_eviction_hysteresis_in_lru_order() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path(), "evict");
        config.size_limit = 1000;
        let cache: DiskCache<Vec<u8>> = DiskCache::new(config).unwrap();

        // Three files of 500 bytes each, oldest first.
        for key in ["first", "second", "third"] {
            cache.store(key, vec![0u8; 500], None).await.unwrap();
        }
        assert_eq!(cache.total_size().await.unwrap(), 1500);

        let removed = cache.remove_over_size_limit().await.unwrap();
        // Least recently used go first until usage is at most half the
        // limit.
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0], cache.file_path("first", None));
        assert_eq!(removed[1], cache.file_path("second", None));
        assert_eq!(cache.total_size().await.unwrap(), 500);
        assert!(cache.exists("third").await);

        // Under the limit nothing further is evicted.
        assert!(cache.remove_over_size_limit().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unlimited_size_never_evicts() {
        let dir = tempdir().unwrap();
        let cache = bytes_cache(dir.path(), "unbounded");
        cache.store("k", vec![0u8; 4096], None).await.unwrap();
        assert!(cache.remove_over_size_limit().await.unwrap().is_empty());
        assert!(cache.exists("k").await);
    }

    #[tokio::test]
    async fn test_warm_start_sees_existing_files() {
        let dir = tempdir().unwrap();
        {
            let cache = bytes_cache(dir.path(), "warm");
            cache.store("kept", b"still here".to_vec(), None).await.unwrap();
        }

        // A fresh instance over the same directory serves the old file.
        let reopened = bytes_cache(dir.path(), "warm");
        assert!(reopened.exists("kept").await);
        assert_eq!(
            reopened.fetch("kept", AccessExtension::None).await.unwrap(),
            Some(b"still here".to_vec())
        );
    }

    #[tokio::test]
    async fn test_index_negative_is_reconciled_against_filesystem() {
        let dir = tempdir().unwrap();
        let cache = bytes_cache(dir.path(), "reconcile");
        // Settle the lane (and give the index scan its chance to land).
        cache.total_size().await.unwrap();

        // A file appears behind the cache's back.
        let path = cache.file_path("stranger", None);
        std::fs::write(&path, b"external").unwrap();
        meta::write_timestamps(&path, Utc::now(), Utc::now() + Duration::days(1)).unwrap();

        assert!(cache.exists("stranger").await);
        assert_eq!(
            cache.fetch("stranger", AccessExtension::None).await.unwrap(),
            Some(b"external".to_vec())
        );
    }

    #[tokio::test]
    async fn test_expired_sweep_leaves_live_files() {
        let dir = tempdir().unwrap();
        let cache = bytes_cache(dir.path(), "sweep");
        let t0 = Utc::now();

        cache
            .store("short", vec![1], Some(Expiration::Seconds(1.0)))
            .await
            .unwrap();
        cache
            .store("long", vec![2], Some(Expiration::Days(1)))
            .await
            .unwrap();

        let removed = cache
            .remove_expired_at(t0 + Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(removed, vec![cache.file_path("short", None)]);
        assert!(cache.exists("long").await);
    }

    #[tokio::test]
    async fn test_sequential_stores_keep_last_value() {
        let dir = tempdir().unwrap();
        let cache = bytes_cache(dir.path(), "ordering");

        let (first, second) = tokio::join!(
            cache.store("k", b"v1".to_vec(), None),
            cache.store("k", b"v2".to_vec(), None),
        );
        first.unwrap();
        second.unwrap();

        assert_eq!(
            cache.fetch("k", AccessExtension::None).await.unwrap(),
            Some(b"v2".to_vec())
        );
    }

    #[tokio::test]
    async fn test_configure_swaps_size_limit() {
        let dir = tempdir().unwrap();
        let cache = bytes_cache(dir.path(), "reconfigure");
        cache.store("k", vec![0u8; 100], None).await.unwrap();

        let mut config = cache.config();
        config.size_limit = 50;
        cache.configure(config);

        let removed = cache.remove_over_size_limit().await.unwrap();
        assert_eq!(removed.len(), 1);
    }
}

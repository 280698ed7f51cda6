//! Single-consumer I/O lane for the disk tier
//!
//! All disk operations for an instance are funneled through one mpsc
//! channel and executed here in arrival order. Callers wait on a oneshot
//! reply, so they are suspended rather than thread-blocked, and two
//! operations of the same instance can never interleave.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::expiration::{AccessExtension, Expiration};
use crate::types::CacheableValue;

use super::meta::{self, FileMeta};
use super::DiskInner;

pub(super) enum DiskJob<T> {
    Store {
        key: String,
        value: T,
        expiration: Option<Expiration>,
        forced_extension: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    Fetch {
        key: String,
        reference: DateTime<Utc>,
        load_payload: bool,
        extension: AccessExtension,
        forced_extension: Option<String>,
        reply: oneshot::Sender<Result<Option<T>>>,
    },
    Remove {
        key: String,
        forced_extension: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveAll {
        skip_recreate: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveExpired {
        reference: DateTime<Utc>,
        reply: oneshot::Sender<Result<Vec<PathBuf>>>,
    },
    RemoveOverSizeLimit {
        reply: oneshot::Sender<Result<Vec<PathBuf>>>,
    },
    TotalSize {
        reply: oneshot::Sender<Result<u64>>,
    },
}

pub(super) async fn run<T: CacheableValue>(
    inner: Arc<DiskInner>,
    mut jobs: mpsc::Receiver<DiskJob<T>>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            DiskJob::Store {
                key,
                value,
                expiration,
                forced_extension,
                reply,
            } => {
                let result =
                    store(&inner, &key, &value, expiration, forced_extension.as_deref()).await;
                let _ = reply.send(result);
            }
            DiskJob::Fetch {
                key,
                reference,
                load_payload,
                extension,
                forced_extension,
                reply,
            } => {
                let (result, rewrite) = fetch(
                    &inner,
                    &key,
                    reference,
                    load_payload,
                    extension,
                    forced_extension.as_deref(),
                )
                .await;
                let _ = reply.send(result);
                // The extension lands after the reply but before the next
                // job: off the caller's path, still in lane order.
                if let Some(rewrite) = rewrite {
                    apply_rewrite(rewrite).await;
                }
            }
            DiskJob::Remove {
                key,
                forced_extension,
                reply,
            } => {
                let _ = reply.send(remove(&inner, &key, forced_extension.as_deref()).await);
            }
            DiskJob::RemoveAll {
                skip_recreate,
                reply,
            } => {
                let _ = reply.send(remove_all(&inner, skip_recreate).await);
            }
            DiskJob::RemoveExpired { reference, reply } => {
                let _ = reply.send(remove_expired(&inner, reference).await);
            }
            DiskJob::RemoveOverSizeLimit { reply } => {
                let _ = reply.send(remove_over_size_limit(&inner).await);
            }
            DiskJob::TotalSize { reply } => {
                let _ = reply.send(total_size(&inner).await);
            }
        }
    }
    debug!("Disk lane closed");
}

async fn store<T: CacheableValue>(
    inner: &DiskInner,
    key: &str,
    value: &T,
    expiration: Option<Expiration>,
    forced_extension: Option<&str>,
) -> Result<()> {
    inner.check_ready()?;
    let now = Utc::now();
    let expiration = expiration.unwrap_or_else(|| inner.config.read().expiration);
    if expiration.is_expired_at(now) {
        return Ok(());
    }

    let bytes = value.to_bytes().map_err(|source| CacheError::CannotSerialize {
        key: key.to_string(),
        source,
    })?;
    let name = inner.file_name(key, forced_extension);
    let path = inner.directory.join(&name);

    if let Err(first) = fs::write(&path, &bytes).await {
        // The directory may have been deleted out from under us; recreate
        // it once and retry.
        if first.kind() != std::io::ErrorKind::NotFound {
            return Err(CacheError::CannotWriteFile {
                key: key.to_string(),
                path,
                source: first,
            });
        }
        if let Err(source) = fs::create_dir_all(&inner.directory).await {
            return Err(CacheError::CannotCreateDirectory {
                dir: inner.directory.clone(),
                source,
            });
        }
        fs::write(&path, &bytes)
            .await
            .map_err(|source| CacheError::CannotWriteFile {
                key: key.to_string(),
                path: path.clone(),
                source,
            })?;
    }

    let expires_at = expiration.estimated_expiry_from(now);
    if let Err(source) = set_timestamps(&path, now, expires_at).await {
        // Never leave a payload behind without its expiry metadata.
        let _ = fs::remove_file(&path).await;
        return Err(CacheError::CannotSetAttributes { path, source });
    }

    inner.index.lock().record(name);
    debug!(key = %key, size = bytes.len(), "Stored cache file");
    Ok(())
}

async fn fetch<T: CacheableValue>(
    inner: &DiskInner,
    key: &str,
    reference: DateTime<Utc>,
    load_payload: bool,
    extension: AccessExtension,
    forced_extension: Option<&str>,
) -> (Result<Option<T>>, Option<TimestampRewrite>) {
    match fetch_inner(inner, key, reference, load_payload, extension, forced_extension).await {
        Ok((value, rewrite)) => (Ok(value), rewrite),
        Err(err) => (Err(err), None),
    }
}

async fn fetch_inner<T: CacheableValue>(
    inner: &DiskInner,
    key: &str,
    reference: DateTime<Utc>,
    load_payload: bool,
    extension: AccessExtension,
    forced_extension: Option<&str>,
) -> Result<(Option<T>, Option<TimestampRewrite>)> {
    inner.check_ready()?;
    let name = inner.file_name(key, forced_extension);
    let path = inner.directory.join(&name);

    let believed_present = inner.index.lock().believes_present(&name);
    if !believed_present {
        // The index can answer a fast negative, but only the filesystem
        // is authoritative for a miss.
        match fs::try_exists(&path).await {
            Ok(false) => return Ok((None, None)),
            Ok(true) => {
                debug!(key = %key, "Existence index missed a present file");
                inner.index.lock().record(name.clone());
            }
            Err(_) => {}
        }
    }

    let metadata = match fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok((None, None)),
        Err(err) => {
            // Unreadable metadata counts as expired.
            debug!(path = ?path, error = %err, "Unreadable cache file metadata");
            return Ok((None, None));
        }
    };
    let meta = FileMeta::from_metadata(path.clone(), &metadata);
    if meta.is_dir || meta.is_expired_at(reference) {
        return Ok((None, None));
    }

    if !load_payload {
        // Liveness probe: no payload read, no timestamp changes.
        return Ok((Some(T::empty()), None));
    }

    let bytes = fs::read(&path)
        .await
        .map_err(|source| CacheError::CannotReadFile {
            path: path.clone(),
            source,
        })?;
    let value = T::from_bytes(bytes).map_err(|source| CacheError::CannotDeserialize {
        key: key.to_string(),
        source,
    })?;
    let rewrite = plan_rewrite(&meta, extension, Utc::now());
    Ok((Some(value), rewrite))
}

struct TimestampRewrite {
    path: PathBuf,
    last_access: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

fn plan_rewrite(
    meta: &FileMeta,
    extension: AccessExtension,
    now: DateTime<Utc>,
) -> Option<TimestampRewrite> {
    if extension == AccessExtension::None {
        return None;
    }
    let (last_access, expires_at) = match meta.timestamps() {
        Ok(timestamps) => timestamps,
        Err(err) => {
            debug!(error = %err, "Skipping expiry extension");
            return None;
        }
    };
    let new_expiry = match extension {
        AccessExtension::None => return None,
        AccessExtension::PreserveDuration => {
            // The original lifetime is the gap between the stored
            // timestamps; re-apply it from now.
            let lifetime = expires_at.signed_duration_since(last_access);
            now.checked_add_signed(lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        }
        AccessExtension::ResetTo(policy) => policy.estimated_expiry_from(now),
    };
    Some(TimestampRewrite {
        path: meta.path.clone(),
        last_access: now,
        expires_at: new_expiry,
    })
}

async fn apply_rewrite(rewrite: TimestampRewrite) {
    let TimestampRewrite {
        path,
        last_access,
        expires_at,
    } = rewrite;
    if let Err(err) = set_timestamps(&path, last_access, expires_at).await {
        debug!(path = ?path, error = %err, "Failed to extend expiry");
    }
}

async fn set_timestamps(
    path: &Path,
    last_access: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> std::io::Result<()> {
    let path = path.to_path_buf();
    match tokio::task::spawn_blocking(move || meta::write_timestamps(&path, last_access, expires_at))
        .await
    {
        Ok(result) => result,
        Err(join_err) => Err(std::io::Error::other(join_err)),
    }
}

async fn remove(inner: &DiskInner, key: &str, forced_extension: Option<&str>) -> Result<()> {
    inner.check_ready()?;
    let name = inner.file_name(key, forced_extension);
    let path = inner.directory.join(&name);
    match fs::remove_file(&path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => return Err(CacheError::CannotRemoveFile { path, source }),
    }
    inner.index.lock().forget(&name);
    Ok(())
}

async fn remove_all(inner: &DiskInner, skip_recreate: bool) -> Result<()> {
    match fs::remove_dir_all(&inner.directory).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(CacheError::CannotRemoveFile {
                path: inner.directory.clone(),
                source,
            })
        }
    }
    if skip_recreate {
        inner.index.lock().reset_empty();
        return Ok(());
    }
    if let Err(source) = fs::create_dir_all(&inner.directory).await {
        inner.set_ready(false);
        return Err(CacheError::CannotCreateDirectory {
            dir: inner.directory.clone(),
            source,
        });
    }
    inner.set_ready(true);
    inner.index.lock().reset_empty();
    debug!(dir = ?inner.directory, "Cache directory cleared");
    Ok(())
}

async fn remove_expired(inner: &DiskInner, reference: DateTime<Utc>) -> Result<Vec<PathBuf>> {
    inner.check_ready()?;
    let mut removed = Vec::new();
    for (path, metadata) in list_entries(inner).await? {
        let expired = match &metadata {
            // A file whose metadata cannot be read is reclaimed as if
            // expired.
            None => true,
            Some(metadata) => {
                let meta = FileMeta::from_metadata(path.clone(), metadata);
                if meta.is_dir {
                    continue;
                }
                meta.is_expired_at(reference)
            }
        };
        if !expired {
            continue;
        }
        match fs::remove_file(&path).await {
            Ok(()) => {
                forget_name(inner, &path);
                removed.push(path);
            }
            Err(err) => {
                warn!(path = ?path, error = %err, "Failed to remove expired cache file")
            }
        }
    }
    if !removed.is_empty() {
        debug!(removed = removed.len(), "Removed expired cache files");
    }
    Ok(removed)
}

async fn remove_over_size_limit(inner: &DiskInner) -> Result<Vec<PathBuf>> {
    inner.check_ready()?;
    let size_limit = inner.config.read().size_limit;
    if size_limit == 0 {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut total: u64 = 0;
    for (path, metadata) in list_entries(inner).await? {
        let Some(metadata) = metadata else { continue };
        let meta = FileMeta::from_metadata(path, &metadata);
        if meta.is_dir {
            continue;
        }
        total += meta.size;
        files.push(meta);
    }
    if total < size_limit {
        return Ok(Vec::new());
    }

    // Shrink well below the limit so cleanups stay rare.
    let target = size_limit / 2;
    // Most recently used first; eviction pops from the back.
    files.sort_by_key(|meta| std::cmp::Reverse(meta.last_access_or_oldest()));

    let mut removed = Vec::new();
    while total > target {
        let Some(meta) = files.pop() else { break };
        match fs::remove_file(&meta.path).await {
            Ok(()) => {
                total = total.saturating_sub(meta.size);
                forget_name(inner, &meta.path);
                removed.push(meta.path);
            }
            Err(err) => warn!(path = ?meta.path, error = %err, "Failed to evict cache file"),
        }
    }
    if !removed.is_empty() {
        debug!(removed = removed.len(), remaining = total, "Evicted cache files over size limit");
    }
    Ok(removed)
}

async fn total_size(inner: &DiskInner) -> Result<u64> {
    inner.check_ready()?;
    let mut total = 0u64;
    for (_, metadata) in list_entries(inner).await? {
        if let Some(metadata) = metadata {
            if !metadata.is_dir() {
                total += metadata.len();
            }
        }
    }
    Ok(total)
}

/// Flat listing of the cache directory, dotfiles skipped. Per-file
/// metadata failures surface as `None` so each scan can apply its own
/// rule.
async fn list_entries(inner: &DiskInner) -> Result<Vec<(PathBuf, Option<std::fs::Metadata>)>> {
    let enumeration_failed = |source| CacheError::DirectoryEnumerationFailed {
        dir: inner.directory.clone(),
        source,
    };
    let mut reader = fs::read_dir(&inner.directory).await.map_err(enumeration_failed)?;
    let mut entries = Vec::new();
    loop {
        match reader.next_entry().await {
            Ok(Some(entry)) => {
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let metadata = entry.metadata().await.ok();
                entries.push((entry.path(), metadata));
            }
            Ok(None) => break,
            Err(source) => return Err(enumeration_failed(source)),
        }
    }
    Ok(entries)
}

fn forget_name(inner: &DiskInner, path: &Path) {
    if let Some(name) = path.file_name() {
        inner.index.lock().forget(&name.to_string_lossy());
    }
}

//! Cache state carried in file timestamp attributes
//!
//! A cache file's only metadata is two timestamp slots: the access-time
//! slot holds the last cache access and the modification-time slot holds
//! the estimated expiry. Nothing else is persisted alongside the payload.

use chrono::{DateTime, Utc};
use std::fs::{FileTimes, Metadata, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::CacheError;

/// Cache-relevant view of one file's attributes.
#[derive(Debug, Clone)]
pub(super) struct FileMeta {
    pub path: PathBuf,
    /// Last cache access, if the slot could be read.
    pub last_access: Option<DateTime<Utc>>,
    /// Estimated expiry, if the slot could be read.
    pub expires_at: Option<DateTime<Utc>>,
    pub size: u64,
    pub is_dir: bool,
}

impl FileMeta {
    pub fn from_metadata(path: PathBuf, metadata: &Metadata) -> Self {
        Self {
            last_access: metadata.accessed().ok().map(DateTime::<Utc>::from),
            expires_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            size: metadata.len(),
            is_dir: metadata.is_dir(),
            path,
        }
    }

    /// A file whose expiry slot cannot be read counts as expired.
    pub fn is_expired_at(&self, reference: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => expiry <= reference,
            None => true,
        }
    }

    /// Both timestamp slots, or `InvalidMetadata` if either is missing.
    pub fn timestamps(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), CacheError> {
        match (self.last_access, self.expires_at) {
            (Some(access), Some(expiry)) => Ok((access, expiry)),
            _ => Err(CacheError::InvalidMetadata {
                path: self.path.clone(),
            }),
        }
    }

    /// Sort key for least-recently-used ordering; an unreadable access
    /// slot sorts oldest.
    pub fn last_access_or_oldest(&self) -> DateTime<Utc> {
        self.last_access.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Write both timestamp slots. Blocking; callers run it off the lane via
/// `spawn_blocking`.
pub(super) fn write_timestamps(
    path: &Path,
    last_access: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> io::Result<()> {
    let times = FileTimes::new()
        .set_accessed(SystemTime::from(last_access))
        .set_modified(SystemTime::from(expires_at));
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_times(times)
}

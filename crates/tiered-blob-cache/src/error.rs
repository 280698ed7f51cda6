//! Error types for the tiered cache

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::types::ValueError;

#[derive(Debug)]
pub enum CacheError {
    /// Construction-time configuration that cannot produce a usable cache.
    InvalidConfig(String),
    /// The backing directory could not be created; only a successful
    /// `remove_all` clears this state.
    StorageNotReady { dir: PathBuf },
    CannotCreateDirectory { dir: PathBuf, source: io::Error },
    CannotSerialize { key: String, source: ValueError },
    CannotDeserialize { key: String, source: ValueError },
    CannotWriteFile { key: String, path: PathBuf, source: io::Error },
    CannotSetAttributes { path: PathBuf, source: io::Error },
    CannotReadFile { path: PathBuf, source: io::Error },
    CannotRemoveFile { path: PathBuf, source: io::Error },
    DirectoryEnumerationFailed { dir: PathBuf, source: io::Error },
    /// A timestamp slot exists but could not be interpreted.
    InvalidMetadata { path: PathBuf },
    /// The instance was dropped while a call was in flight.
    Closed,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::InvalidConfig(reason) => {
                write!(f, "Invalid cache configuration: {}", reason)
            }
            CacheError::StorageNotReady { dir } => {
                write!(f, "Disk storage is not ready: {}", dir.display())
            }
            CacheError::CannotCreateDirectory { dir, source } => {
                write!(f, "Cannot create cache directory {}: {}", dir.display(), source)
            }
            CacheError::CannotSerialize { key, source } => {
                write!(f, "Cannot serialize value for key {}: {}", key, source)
            }
            CacheError::CannotDeserialize { key, source } => {
                write!(f, "Cannot deserialize value for key {}: {}", key, source)
            }
            CacheError::CannotWriteFile { key, path, source } => {
                write!(
                    f,
                    "Cannot write cache file {} for key {}: {}",
                    path.display(),
                    key,
                    source
                )
            }
            CacheError::CannotSetAttributes { path, source } => {
                write!(f, "Cannot set file attributes on {}: {}", path.display(), source)
            }
            CacheError::CannotReadFile { path, source } => {
                write!(f, "Cannot read cache file {}: {}", path.display(), source)
            }
            CacheError::CannotRemoveFile { path, source } => {
                write!(f, "Cannot remove cache file {}: {}", path.display(), source)
            }
            CacheError::DirectoryEnumerationFailed { dir, source } => {
                write!(f, "Cannot enumerate cache directory {}: {}", dir.display(), source)
            }
            CacheError::InvalidMetadata { path } => {
                write!(f, "Invalid file metadata for {}", path.display())
            }
            CacheError::Closed => write!(f, "Cache instance is closed"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::CannotCreateDirectory { source, .. }
            | CacheError::CannotWriteFile { source, .. }
            | CacheError::CannotSetAttributes { source, .. }
            | CacheError::CannotReadFile { source, .. }
            | CacheError::CannotRemoveFile { source, .. }
            | CacheError::DirectoryEnumerationFailed { source, .. } => Some(source),
            CacheError::CannotSerialize { source, .. }
            | CacheError::CannotDeserialize { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

//! Value contracts and shared cache types

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::PathBuf;

use crate::error::CacheError;

/// Boxed error reported by value conversions.
pub type ValueError = Box<dyn std::error::Error + Send + Sync>;

/// A value the disk tier can persist.
///
/// `empty()` is the placeholder returned by payload-free probes; it should
/// be cheap and distinguishable from real content where that matters.
pub trait CacheableValue: Sized + Send + Sync + 'static {
    fn to_bytes(&self) -> std::result::Result<Vec<u8>, ValueError>;
    fn from_bytes(bytes: Vec<u8>) -> std::result::Result<Self, ValueError>;
    fn empty() -> Self;
}

/// Raw bytes round-trip as themselves.
impl CacheableValue for Vec<u8> {
    fn to_bytes(&self) -> std::result::Result<Vec<u8>, ValueError> {
        Ok(self.clone())
    }

    fn from_bytes(bytes: Vec<u8>) -> std::result::Result<Self, ValueError> {
        Ok(bytes)
    }

    fn empty() -> Self {
        Vec::new()
    }
}

/// Approximate in-memory footprint, used by the memory tier's cost bound.
pub trait CacheCost {
    fn cache_cost(&self) -> usize;
}

impl CacheCost for Vec<u8> {
    fn cache_cost(&self) -> usize {
        self.len()
    }
}

/// Which tier holds (or answered for) a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheTier {
    None,
    Memory,
    Disk,
}

impl CacheTier {
    pub fn is_cached(&self) -> bool {
        !matches!(self, CacheTier::None)
    }
}

/// Result of a read-through fetch, tagged with the answering tier.
#[derive(Debug, Clone)]
pub enum CacheLookup<V> {
    Memory(V),
    Disk(V),
    Miss,
}

impl<V> CacheLookup<V> {
    pub fn tier(&self) -> CacheTier {
        match self {
            CacheLookup::Memory(_) => CacheTier::Memory,
            CacheLookup::Disk(_) => CacheTier::Disk,
            CacheLookup::Miss => CacheTier::None,
        }
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, CacheLookup::Miss)
    }

    pub fn into_value(self) -> Option<V> {
        match self {
            CacheLookup::Memory(value) | CacheLookup::Disk(value) => Some(value),
            CacheLookup::Miss => None,
        }
    }
}

/// Per-tier results of a write-through store.
///
/// The memory tier cannot fail, which the type records; the disk tier
/// reports its own outcome independently.
#[derive(Debug)]
pub struct StoreOutcome {
    pub memory: std::result::Result<(), Infallible>,
    pub disk: std::result::Result<(), CacheError>,
}

impl StoreOutcome {
    /// Whether both tiers accepted the value.
    pub fn is_complete(&self) -> bool {
        self.disk.is_ok()
    }
}

/// Files removed by a cleanup pass, split by what doomed them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Removed because their expiry had passed.
    pub expired: Vec<PathBuf>,
    /// Removed to bring the tier back under its size limit.
    pub size_evicted: Vec<PathBuf>,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.size_evicted.is_empty()
    }

    pub fn removed_count(&self) -> usize {
        self.expired.len() + self.size_evicted.len()
    }

    /// File names of everything removed, for cleanup events.
    pub fn file_names(&self) -> Vec<String> {
        self.expired
            .iter()
            .chain(self.size_evicted.iter())
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect()
    }
}

/// Emitted after an automatic cleanup that removed files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupEvent {
    pub removed_files: Vec<String>,
}

/// Snapshot of hit/miss counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_round_trip() {
        let original = vec![1u8, 2, 3];
        let bytes = original.to_bytes().unwrap();
        let restored = Vec::<u8>::from_bytes(bytes).unwrap();
        assert_eq!(restored, original);
        assert!(Vec::<u8>::empty().is_empty());
    }

    #[test]
    fn test_bytes_cost_is_length() {
        assert_eq!(vec![0u8; 42].cache_cost(), 42);
    }

    #[test]
    fn test_tier_is_cached() {
        assert!(!CacheTier::None.is_cached());
        assert!(CacheTier::Memory.is_cached());
        assert!(CacheTier::Disk.is_cached());
    }

    #[test]
    fn test_lookup_tier_and_value() {
        let hit: CacheLookup<u32> = CacheLookup::Disk(7);
        assert_eq!(hit.tier(), CacheTier::Disk);
        assert_eq!(hit.into_value(), Some(7));

        let miss: CacheLookup<u32> = CacheLookup::Miss;
        assert!(miss.is_miss());
        assert_eq!(miss.into_value(), None);
    }

    #[test]
    fn test_cleanup_report_file_names() {
        let report = CleanupReport {
            expired: vec![PathBuf::from("/cache/aaa")],
            size_evicted: vec![PathBuf::from("/cache/bbb")],
        };
        assert_eq!(report.removed_count(), 2);
        assert_eq!(report.file_names(), vec!["aaa".to_string(), "bbb".to_string()]);
    }

    #[test]
    fn test_cleanup_report_serialization() {
        let report = CleanupReport {
            expired: vec![PathBuf::from("/cache/aaa")],
            size_evicted: Vec::new(),
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("aaa"));

        let restored: CleanupReport = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.expired, report.expired);
        assert!(restored.size_evicted.is_empty());
    }

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.memory_hits, 0);
        assert_eq!(stats.disk_hits, 0);
        assert_eq!(stats.misses, 0);
    }
}

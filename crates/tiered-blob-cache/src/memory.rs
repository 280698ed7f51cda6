//! Bounded, TTL-aware in-memory tier
//!
//! The backing store is independently thread-safe and evicts on its own
//! under the configured limits, so the set of keys tracked here may run
//! ahead of what the store still holds; the sweep reconciles the two.

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::expiration::{AccessExtension, Expiration};
use crate::types::CacheCost;

const DEFAULT_TOTAL_COST_LIMIT: u64 = 256 * 1024 * 1024;
const DEFAULT_EXPIRATION: Expiration = Expiration::Seconds(300.0);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);

/// Configuration for the in-memory tier.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Upper bound on the summed cost of live entries, in bytes.
    /// 0 means unbounded.
    pub total_cost_limit: u64,
    /// Upper bound on the number of live entries. 0 means unbounded.
    pub count_limit: u64,
    /// Expiration applied when a store call does not override it.
    pub expiration: Expiration,
    /// Interval between periodic expired-entry sweeps. A zero interval
    /// disables the periodic sweep.
    pub sweep_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            total_cost_limit: DEFAULT_TOTAL_COST_LIMIT,
            count_limit: 0,
            expiration: DEFAULT_EXPIRATION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

struct EntryState<V> {
    /// `None` once a volatile payload has been discarded; reads as a miss.
    payload: Option<V>,
    expires_at: DateTime<Utc>,
}

struct MemoryEntry<V> {
    state: Mutex<EntryState<V>>,
    /// Policy the entry was stored under; re-applied on extension.
    expiration: Expiration,
    cost: u64,
    volatile: bool,
}

impl<V> MemoryEntry<V> {
    fn new(value: V, expiration: Expiration, now: DateTime<Utc>, volatile: bool) -> Self
    where
        V: CacheCost,
    {
        let cost = value.cache_cost() as u64;
        Self {
            state: Mutex::new(EntryState {
                payload: Some(value),
                expires_at: expiration.estimated_expiry_from(now),
            }),
            expiration,
            cost,
            volatile,
        }
    }
}

struct MemoryState {
    config: MemoryConfig,
    /// Keys handed to the store. May be a superset of what it still holds.
    keys: HashSet<String>,
    sweeper: Option<JoinHandle<()>>,
}

struct MemoryInner<V> {
    /// Store handle; write-locked only while `configure` swaps in a
    /// rebuilt store.
    store: RwLock<Cache<String, Arc<MemoryEntry<V>>>>,
    /// Serializes config swaps, tracked-key mutation and sweeps.
    state: Mutex<MemoryState>,
}

/// Synchronous in-memory cache tier.
///
/// Stores never fail. A store whose resolved expiration is already past
/// is a silent no-op. Expired entries stop being served immediately and
/// are reclaimed by the periodic sweep or an explicit
/// [`remove_expired`](Self::remove_expired).
pub struct MemoryCache<V> {
    inner: Arc<MemoryInner<V>>,
}

impl<V> MemoryCache<V>
where
    V: Clone + CacheCost + Send + Sync + 'static,
{
    /// Create a tier and start its periodic sweep. Outside a tokio
    /// runtime the sweep is skipped and reclamation is caller-driven.
    pub fn new(config: MemoryConfig) -> Self {
        let inner = Arc::new(MemoryInner {
            store: RwLock::new(build_store(&config)),
            state: Mutex::new(MemoryState {
                config,
                keys: HashSet::new(),
                sweeper: None,
            }),
        });
        let cache = Self { inner };
        cache.restart_sweeper();
        cache
    }

    /// Store a value under the tier's default or the given expiration.
    pub fn store(&self, key: &str, value: V, expiration: Option<Expiration>) {
        self.store_entry(key, value, expiration, false);
    }

    /// Store a value whose payload may be discarded by
    /// [`discard_volatile`](Self::discard_volatile).
    pub fn store_volatile(&self, key: &str, value: V, expiration: Option<Expiration>) {
        self.store_entry(key, value, expiration, true);
    }

    fn store_entry(&self, key: &str, value: V, expiration: Option<Expiration>, volatile: bool) {
        let now = Utc::now();
        let mut state = self.inner.state.lock();
        let expiration = expiration.unwrap_or(state.config.expiration);
        if expiration.is_expired_at(now) {
            return;
        }
        let entry = Arc::new(MemoryEntry::new(value, expiration, now, volatile));
        self.inner.store.read().insert(key.to_string(), entry);
        state.keys.insert(key.to_string());
    }

    /// Fetch a live value, applying the extension to its expiry on a hit.
    pub fn fetch(&self, key: &str, extension: AccessExtension) -> Option<V> {
        self.fetch_at(key, Utc::now(), extension)
    }

    /// Fetch against an explicit reference instant.
    pub fn fetch_at(
        &self,
        key: &str,
        reference: DateTime<Utc>,
        extension: AccessExtension,
    ) -> Option<V> {
        let store = self.inner.store.read();
        let entry = store.get(key)?;
        let mut entry_state = entry.state.lock();
        if entry_state.expires_at <= reference {
            return None;
        }
        let Some(payload) = entry_state.payload.clone() else {
            // Discarded volatile payload; drop the husk.
            drop(entry_state);
            store.invalidate(key);
            return None;
        };
        match extension {
            AccessExtension::None => {}
            AccessExtension::PreserveDuration => {
                entry_state.expires_at = entry.expiration.estimated_expiry_from(reference);
            }
            AccessExtension::ResetTo(policy) => {
                entry_state.expires_at = policy.estimated_expiry_from(reference);
            }
        }
        Some(payload)
    }

    /// Whether a live value exists, without extending its expiry.
    pub fn is_cached(&self, key: &str) -> bool {
        self.fetch_at(key, Utc::now(), AccessExtension::None).is_some()
    }

    pub fn remove(&self, key: &str) {
        let mut state = self.inner.state.lock();
        self.inner.store.read().invalidate(key);
        state.keys.remove(key);
    }

    pub fn remove_all(&self) {
        let mut state = self.inner.state.lock();
        self.inner.store.read().invalidate_all();
        state.keys.clear();
    }

    /// Reclaim expired entries now. Returns how many tracked keys were
    /// dropped, whether expired or already evicted by the store.
    pub fn remove_expired(&self) -> usize {
        sweep(&self.inner, Utc::now())
    }

    pub fn remove_expired_at(&self, reference: DateTime<Utc>) -> usize {
        sweep(&self.inner, reference)
    }

    /// Clear the payloads of volatile entries; each then reads as a miss.
    /// Returns how many payloads were discarded.
    pub fn discard_volatile(&self) -> usize {
        let state = self.inner.state.lock();
        let store = self.inner.store.read().clone();
        let mut discarded = 0;
        for key in &state.keys {
            if let Some(entry) = store.get(key) {
                if entry.volatile && entry.state.lock().payload.take().is_some() {
                    discarded += 1;
                }
            }
        }
        discarded
    }

    /// Replace the tier configuration. Changing either capacity limit
    /// rebuilds the store and carries live entries over; the periodic
    /// sweep restarts at the new interval.
    pub fn configure(&self, config: MemoryConfig) {
        {
            let mut state = self.inner.state.lock();
            let limits_changed = state.config.total_cost_limit != config.total_cost_limit
                || state.config.count_limit != config.count_limit;
            if limits_changed {
                let store = self.inner.store.read().clone();
                let rebuilt = build_store(&config);
                for (key, entry) in store.iter() {
                    rebuilt.insert((*key).clone(), entry);
                }
                *self.inner.store.write() = rebuilt;
            }
            state.config = config;
        }
        self.restart_sweeper();
    }

    pub fn config(&self) -> MemoryConfig {
        self.inner.state.lock().config.clone()
    }

    fn restart_sweeper(&self) {
        let mut state = self.inner.state.lock();
        if let Some(handle) = state.sweeper.take() {
            handle.abort();
        }
        let interval = state.config.sweep_interval;
        if interval.is_zero() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime; periodic memory sweep disabled");
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        state.sweeper = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let removed = sweep(&inner, Utc::now());
                if removed > 0 {
                    debug!(removed, "Swept expired memory entries");
                }
            }
        }));
    }

    #[cfg(test)]
    fn run_pending_tasks(&self) {
        self.inner.store.read().run_pending_tasks();
    }

    #[cfg(test)]
    fn tracked_key_count(&self) -> usize {
        self.inner.state.lock().keys.len()
    }
}

impl<V> Drop for MemoryCache<V> {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.state.lock().sweeper.take() {
            handle.abort();
        }
    }
}

fn sweep<V>(inner: &MemoryInner<V>, reference: DateTime<Utc>) -> usize
where
    V: Send + Sync + 'static,
{
    let mut state = inner.state.lock();
    let store = inner.store.read().clone();
    let before = state.keys.len();
    state.keys.retain(|key| match store.get(key) {
        None => false,
        Some(entry) => {
            if entry.state.lock().expires_at <= reference {
                store.invalidate(key);
                false
            } else {
                true
            }
        }
    });
    before - state.keys.len()
}

fn build_store<V>(config: &MemoryConfig) -> Cache<String, Arc<MemoryEntry<V>>>
where
    V: Send + Sync + 'static,
{
    match (config.total_cost_limit, config.count_limit) {
        (0, 0) => Cache::builder().build(),
        (0, count) => Cache::builder().max_capacity(count).build(),
        (cost, 0) => Cache::builder()
            .max_capacity(cost)
            .weigher(|_key, entry: &Arc<MemoryEntry<V>>| clamp_weight(entry.cost))
            .build(),
        (cost, count) => {
            // A per-entry weight floor lets one capacity dimension
            // enforce both the cost and the count bound.
            let floor = (cost / count).max(1);
            Cache::builder()
                .max_capacity(cost)
                .weigher(move |_key, entry: &Arc<MemoryEntry<V>>| {
                    clamp_weight(entry.cost.max(floor))
                })
                .build()
        }
    }
}

fn clamp_weight(cost: u64) -> u32 {
    cost.min(u64::from(u32::MAX)) as u32
}

//! Generic key→value store with idle-based eviction.
//!
//! Every stored value carries a `last_touch` timestamp. A background
//! task sweeps the map on a fixed period and removes entries whose idle
//! time exceeds the configured keepalive. The grid uses one instance to
//! track agent liveness (`agent_id → AgentRef`), but the structure is
//! deliberately generic.
//!
//! The internal lock is owned by this map alone and is never shared with
//! the token pool; the two structures are coupled only through the
//! service façade.

use std::collections::HashMap;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Callback invoked for every entry removed by the background sweep.
pub type EvictionListener<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;

struct TimedEntry<V> {
    value: V,
    last_touch: Instant,
}

/// Map whose entries silently expire after a period of no refresh
/// activity.
///
/// Eviction is disabled when the keepalive is zero; no sweeper task is
/// spawned in that case. [`ExpiringMap::close`] (or dropping the map)
/// stops the sweeper — no orphaned timers.
pub struct ExpiringMap<K, V> {
    entries: Arc<RwLock<HashMap<K, TimedEntry<V>>>>,
    keepalive: Duration,
    sweeper: Option<JoinHandle<()>>,
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a map evicting entries idle for longer than `keepalive`,
    /// checked every `sweep_interval`. A zero `keepalive` disables
    /// eviction entirely.
    #[must_use]
    pub fn new(keepalive: Duration, sweep_interval: Duration) -> Self {
        Self::build(keepalive, sweep_interval, None)
    }

    /// Like [`ExpiringMap::new`], additionally invoking `listener` for
    /// every swept entry.
    #[must_use]
    pub fn with_eviction_listener(
        keepalive: Duration,
        sweep_interval: Duration,
        listener: impl Fn(&K, &V) + Send + Sync + 'static,
    ) -> Self {
        Self::build(keepalive, sweep_interval, Some(Arc::new(listener)))
    }

    fn build(
        keepalive: Duration,
        sweep_interval: Duration,
        listener: Option<EvictionListener<K, V>>,
    ) -> Self {
        let entries: Arc<RwLock<HashMap<K, TimedEntry<V>>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let sweeper = (!keepalive.is_zero()).then(|| {
            let entries = Arc::clone(&entries);
            let period = sweep_interval.max(Duration::from_millis(10));
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let mut expired: Vec<(K, V)> = Vec::new();
                    {
                        let mut map = entries.write().await;
                        map.retain(|key, entry| {
                            if entry.last_touch.elapsed() > keepalive {
                                expired.push((key.clone(), entry.value.clone()));
                                false
                            } else {
                                true
                            }
                        });
                    }
                    if expired.is_empty() {
                        continue;
                    }
                    tracing::debug!(count = expired.len(), "evicted idle entries");
                    if let Some(listener) = &listener {
                        for (key, value) in &expired {
                            // One misbehaving entry must not stop future sweeps.
                            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                                listener(key, value);
                            }));
                            if outcome.is_err() {
                                tracing::warn!("eviction listener panicked; entry dropped anyway");
                            }
                        }
                    }
                }
            })
        });

        Self {
            entries,
            keepalive,
            sweeper,
        }
    }

    /// Inserts a value, resetting its liveness. Returns the previous
    /// value for the key, if any.
    pub async fn insert(&self, key: K, value: V) -> Option<V> {
        let mut map = self.entries.write().await;
        map.insert(
            key,
            TimedEntry {
                value,
                last_touch: Instant::now(),
            },
        )
        .map(|e| e.value)
    }

    /// Inserts the value if the key is absent, otherwise only refreshes
    /// the existing entry's liveness (the stored value is kept).
    ///
    /// Returns `true` if the key was newly inserted.
    pub async fn put_or_touch(&self, key: K, value: V) -> bool {
        let mut map = self.entries.write().await;
        match map.get_mut(&key) {
            Some(entry) => {
                entry.last_touch = Instant::now();
                false
            }
            None => {
                map.insert(
                    key,
                    TimedEntry {
                        value,
                        last_touch: Instant::now(),
                    },
                );
                true
            }
        }
    }

    /// Refreshes the liveness of an existing key. Returns `false` (and
    /// does nothing) if the key is absent.
    pub async fn touch(&self, key: &K) -> bool {
        let mut map = self.entries.write().await;
        match map.get_mut(key) {
            Some(entry) => {
                entry.last_touch = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Returns a clone of the value for `key`, without refreshing its
    /// liveness.
    pub async fn get(&self, key: &K) -> Option<V> {
        let map = self.entries.read().await;
        map.get(key).map(|e| e.value.clone())
    }

    /// Removes and returns the value for `key`.
    pub async fn remove(&self, key: &K) -> Option<V> {
        let mut map = self.entries.write().await;
        map.remove(key).map(|e| e.value)
    }

    /// Returns `true` if the key is present.
    pub async fn contains_key(&self, key: &K) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Snapshot of all keys.
    pub async fn keys(&self) -> Vec<K> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Snapshot of all values.
    pub async fn values(&self) -> Vec<V> {
        self.entries
            .read()
            .await
            .values()
            .map(|e| e.value.clone())
            .collect()
    }

    /// Snapshot of all entries.
    pub async fn entries(&self) -> Vec<(K, V)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` if the map contains no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Removes all entries.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Stops the background sweep task. The map stays usable; entries
    /// simply stop expiring.
    pub fn close(&self) {
        if let Some(handle) = &self.sweeper {
            handle.abort();
        }
    }

    /// The configured keepalive timeout (zero = eviction disabled).
    #[must_use]
    pub const fn keepalive(&self) -> Duration {
        self.keepalive
    }
}

impl<K, V> Drop for ExpiringMap<K, V> {
    fn drop(&mut self) {
        if let Some(handle) = &self.sweeper {
            handle.abort();
        }
    }
}

impl<K, V> std::fmt::Debug for ExpiringMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringMap")
            .field("keepalive", &self.keepalive)
            .field("sweeping", &self.sweeper.is_some())
            .finish_non_exhaustive()
    }
}

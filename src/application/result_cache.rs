// In-memory cache of fetched record sets
use crate::domain::telemetry::TelemetryRecord;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key for one (battery, time range) request signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(battery_id: &str, selector: &str) -> Self {
        CacheKey(format!("{}-{}", battery_id, selector))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to do as the cache grows. `None` keeps every entry for the life of
/// the process; entries then only leave through an explicit `invalidate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    #[default]
    None,
    /// Drop the oldest insertion once more than this many keys are held.
    MaxEntries(usize),
}

/// Process-lifetime cache of raw fetched records. Entries never expire on
/// their own, so a repeat request can be served records that predate newer
/// rows in the store; callers opt into freshness by invalidating first.
pub struct ResultCache {
    state: RwLock<CacheState>,
    policy: EvictionPolicy,
}

#[derive(Default)]
struct CacheState {
    records: HashMap<CacheKey, Arc<Vec<TelemetryRecord>>>,
    insertion_order: VecDeque<CacheKey>,
}

impl ResultCache {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            policy,
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Arc<Vec<TelemetryRecord>>> {
        let state = self.state.read().await;
        let hit = state.records.get(key).cloned();
        match &hit {
            Some(records) => tracing::debug!("cache hit for {} ({} records)", key, records.len()),
            None => tracing::debug!("cache miss for {}", key),
        }
        hit
    }

    pub async fn put(&self, key: CacheKey, records: Vec<TelemetryRecord>) {
        let mut state = self.state.write().await;
        if state.records.insert(key.clone(), Arc::new(records)).is_none() {
            state.insertion_order.push_back(key);
        }

        if let EvictionPolicy::MaxEntries(limit) = self.policy {
            while state.records.len() > limit {
                match state.insertion_order.pop_front() {
                    Some(oldest) => {
                        tracing::debug!("evicting cache entry {}", oldest);
                        state.records.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.state.read().await.records.contains_key(key)
    }

    /// Remove one entry. Returns whether it was present.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        let mut state = self.state.write().await;
        state.insertion_order.retain(|held| held != key);
        state.records.remove(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }
}

use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;

/// Read-through cache keyed by record id. Entries expire after `ttl` and are
/// dropped explicitly when the record changes.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Arc<RwLock<Entries<K, V>>>,
}

struct Entries<K, V> {
    values: HashMap<K, (Instant, V)>,
    /// Bumped by every invalidation.
    generation: u64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(RwLock::new(Entries {
                values: HashMap::new(),
                generation: 0,
            })),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        self.fresh(&entries, key)
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;
        self.store(&mut entries, key, value);
    }

    pub async fn invalidate(&self, key: &K) {
        let mut entries = self.entries.write().await;
        entries.values.remove(key);
        entries.generation = entries.generation.wrapping_add(1);
    }

    /// Returns the cached value or loads, stores and returns it. Failed loads
    /// are not cached, and neither are loads that overlapped an invalidation.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let generation = {
            let entries = self.entries.read().await;
            if let Some(value) = self.fresh(&entries, &key) {
                return Ok(value);
            }
            entries.generation
        };

        let value = load().await?;
        let mut entries = self.entries.write().await;
        if entries.generation == generation {
            self.store(&mut entries, key, value.clone());
        }
        Ok(value)
    }

    fn fresh(&self, entries: &Entries<K, V>, key: &K) -> Option<V> {
        entries
            .values
            .get(key)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    fn store(&self, entries: &mut Entries<K, V>, key: K, value: V) {
        let ttl = self.ttl;
        entries
            .values
            .retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        entries.values.insert(key, (Instant::now(), value));
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;

// batch/single_flight.rs

//! Coalesces lookups for the same key into one underlying call.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

/// Thread-safe memo keyed by lookup key.
///
/// The first caller for a key runs the fetch; callers arriving while it is
/// in flight wait for it, and later callers get the stored value. Every
/// caller receives a clone of the same result, failures included.
#[derive(Debug)]
pub struct SingleFlight<K, V> {
    slots: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key).or_default())
        };
        slot.get_or_init(fetch).await.clone()
    }

    /// Number of distinct keys seen.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    /// Resolved values, for keys whose fetch has completed.
    pub async fn resolved(&self) -> HashMap<K, V>
    where
        K: Clone,
    {
        self.slots
            .lock()
            .await
            .iter()
            .filter_map(|(k, cell)| cell.get().map(|v| (k.clone(), v.clone())))
            .collect()
    }
}

use crate::utils::error::Result;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct Entry {
    stored_at: Instant,
    value: Arc<dyn Any + Send + Sync>,
}

/// Time-bounded memoisation of service results, keyed by operation and
/// arguments. The lock is never held across an await.
#[derive(Default)]
pub struct TtlCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T>(&self, key: &str, ttl: Duration) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        if entry.stored_at.elapsed() > ttl {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    pub fn insert<T>(&self, key: impl Into<String>, value: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key.into(),
                Entry {
                    stored_at: Instant::now(),
                    value: Arc::new(value),
                },
            );
        }
    }

    /// Returns the cached value when younger than `ttl`, otherwise runs
    /// `producer` and caches its result. Errors are not cached.
    pub async fn get_or_try_insert<T, F, Fut>(&self, key: String, ttl: Duration, producer: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get::<T>(&key, ttl) {
            tracing::trace!(%key, "cache hit");
            return Ok(value);
        }

        tracing::trace!(%key, "cache miss");
        let value = producer().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            let count = entries.len();
            entries.clear();
            tracing::info!(count, "cache cleared");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

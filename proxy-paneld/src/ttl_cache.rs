use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct Entry<T> {
    value: T,
    computed_at: Instant,
}

/// Single-value cache that recomputes once its value is older than the caller's TTL.
///
/// The lock is held only to inspect or replace the entry, never across the
/// compute future. Two callers that both see a stale entry may both compute;
/// the last one to finish wins.
pub struct TtlCache<T> {
    entry: Mutex<Option<Entry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new() -> Self {
        Self {
            entry: Mutex::new(None),
        }
    }

    /// Return the cached value if it is at most `ttl` old, otherwise run `compute` once.
    ///
    /// A failed compute leaves the previous value and its timestamp in place and
    /// returns the error; the stale value is never handed out in its stead.
    pub async fn get<F, Fut, E>(&self, ttl: Duration, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.fresh(ttl) {
            return Ok(value);
        }

        let value = compute().await?;

        let mut entry = self.entry.lock().unwrap_or_else(|e| e.into_inner());
        *entry = Some(Entry {
            value: value.clone(),
            computed_at: Instant::now(),
        });

        Ok(value)
    }

    fn fresh(&self, ttl: Duration) -> Option<T> {
        let entry = self.entry.lock().unwrap_or_else(|e| e.into_inner());
        entry
            .as_ref()
            .filter(|e| e.computed_at.elapsed() <= ttl)
            .map(|e| e.value.clone())
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

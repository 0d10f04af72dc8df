//! Cached read results and the handles used to invalidate them.
//!
//! A confirmed write hands every relevant [`CacheHandle`] an
//! `invalidate()`; each slot bumps a `watch` generation so refresh loops
//! blocked on [`CacheSlot::subscribe`] wake up and refetch.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Something a confirmed transaction can mark stale.
pub trait CacheHandle: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;
    /// Marks the cached data stale and wakes dependent refreshers.
    fn invalidate(&self);
}

/// Invalidation signal without a stored value.
#[derive(Debug)]
pub struct CacheSlot {
    name: String,
    generation: watch::Sender<u64>,
}

impl CacheSlot {
    /// Creates a slot at generation zero.
    pub fn new(name: impl Into<String>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            name: name.into(),
            generation,
        }
    }

    /// Number of invalidations seen so far.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Receiver that observes every invalidation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}

impl CacheHandle for CacheSlot {
    fn name(&self) -> &str {
        &self.name
    }

    fn invalidate(&self) {
        self.generation.send_modify(|g| *g = g.wrapping_add(1));
        debug!(target: "usdx::cache", cache = %self.name, generation = self.generation(), evt = "INVALIDATE");
    }
}

struct Entry<T> {
    value: T,
    fetched_at: Instant,
}

/// A read result kept until it ages out or is invalidated.
pub struct CachedRead<T> {
    slot: CacheSlot,
    max_age: Duration,
    entry: Mutex<Option<Entry<T>>>,
}

impl<T: Clone + Send> CachedRead<T> {
    /// Creates an empty cache whose entries expire after `max_age`.
    pub fn new(name: impl Into<String>, max_age: Duration) -> Self {
        Self {
            slot: CacheSlot::new(name),
            max_age,
            entry: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Entry<T>>> {
        self.entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fresh cached value, if any.
    pub fn get(&self) -> Option<T> {
        self.lock()
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < self.max_age)
            .map(|entry| entry.value.clone())
    }

    /// Stores a freshly fetched value.
    pub fn store(&self, value: T) {
        *self.lock() = Some(Entry {
            value,
            fetched_at: Instant::now(),
        });
    }

    /// Returns the cached value, or runs `fetch` and caches its success.
    pub async fn get_or_fetch<E, F, Fut>(&self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get() {
            return Ok(value);
        }
        let generation = self.slot.generation();
        let value = fetch().await?;
        // An invalidation raced the fetch; hand the value back without caching it.
        if self.slot.generation() == generation {
            self.store(value.clone());
        }
        Ok(value)
    }

    /// Invalidation signal for refresh loops.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.slot.subscribe()
    }
}

impl<T: Send> CacheHandle for CachedRead<T> {
    fn name(&self) -> &str {
        self.slot.name()
    }

    fn invalidate(&self) {
        *self.entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        self.slot.invalidate();
    }
}

/// Shared handle list passed to a transaction lifecycle.
pub type CacheHandles = Vec<Arc<dyn CacheHandle>>;

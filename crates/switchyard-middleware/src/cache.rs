//! Concurrent cache of compiled chains.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::chain::{ChainKey, CompiledChain};

/// Compiled chains keyed by participant ids.
///
/// Reads take a shard read lock only. On a miss the chain is compiled
/// outside any lock; if two threads race, both may compile but the first
/// insert wins and both get the same chain back.
///
/// # Example
///
/// ```rust
/// use switchyard_core::{DispatchContext, Handler};
/// use switchyard_middleware::{ChainCache, ChainKey, CompiledChain};
///
/// let cache = ChainCache::new();
/// let handler = Handler::new(|_: &mut DispatchContext| {});
/// let key = ChainKey::default();
///
/// let first = cache.get_or_compile(&key, || CompiledChain::compile(key.clone(), &[], &[handler.clone()]));
/// let second = cache.get_or_compile(&key, || unreachable!());
///
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// assert_eq!((cache.hits(), cache.misses()), (1, 1));
/// ```
#[derive(Debug, Default)]
pub struct ChainCache {
    chains: DashMap<ChainKey, Arc<CompiledChain>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ChainCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the chain for `key`, compiling it with `build` on first use.
    pub fn get_or_compile<F>(&self, key: &ChainKey, build: F) -> Arc<CompiledChain>
    where
        F: FnOnce() -> CompiledChain,
    {
        if let Some(chain) = self.chains.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(chain.value());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(build());
        debug!(key = %key, steps = compiled.steps(), "compiled middleware chain");

        let entry = self.chains.entry(key.clone()).or_insert(compiled);
        Arc::clone(entry.value())
    }

    /// Returns the cached chain for `key` without compiling.
    #[must_use]
    pub fn get(&self, key: &ChainKey) -> Option<Arc<CompiledChain>> {
        self.chains.get(key).map(|chain| Arc::clone(chain.value()))
    }

    /// Returns the number of cached chains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Returns the number of lookups served from the cache.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns the number of lookups that compiled a chain.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Drops every cached chain and resets the counters.
    ///
    /// Only meant for setup time; chains already handed out stay valid.
    pub fn clear(&self) {
        self.chains.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use switchyard_core::{DispatchContext, Handler, HandlerRegistry};

    fn handler() -> Handler {
        Handler::new(|_: &mut DispatchContext| {})
    }

    #[test]
    fn test_cache_hit_and_miss() {
        let mut registry = HandlerRegistry::new();
        let (a, b) = (handler(), handler());
        let key_a = ChainKey::from_parts(&[], &[registry.register(&a)]);
        let key_b = ChainKey::from_parts(&[], &[registry.register(&b)]);

        let cache = ChainCache::new();
        let first = cache.get_or_compile(&key_a, || CompiledChain::compile(key_a.clone(), &[], &[a.clone()]));
        let again = cache.get_or_compile(&key_a, || CompiledChain::compile(key_a.clone(), &[], &[a.clone()]));
        let other = cache.get_or_compile(&key_b, || CompiledChain::compile(key_b.clone(), &[], &[b.clone()]));

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 2);
        assert_eq!(cache.get(&key_b).map(|c| c.key().clone()), Some(key_b));
    }

    #[test]
    fn test_cache_clear() {
        let cache = ChainCache::new();
        let key = ChainKey::default();
        cache.get_or_compile(&key, || CompiledChain::compile(key.clone(), &[], &[handler()]));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.misses(), 0);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_cache_concurrent_first_use() {
        let cache = ChainCache::new();
        let key = ChainKey::default();
        let compiled = AtomicUsize::new(0);
        let h = handler();

        let chains: Vec<_> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        cache.get_or_compile(&key, || {
                            compiled.fetch_add(1, Ordering::SeqCst);
                            CompiledChain::compile(key.clone(), &[], &[h.clone()])
                        })
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(cache.len(), 1);
        assert!(compiled.load(Ordering::SeqCst) >= 1);
        assert!(chains.iter().all(|c| Arc::ptr_eq(c, &chains[0])));
        assert_eq!(cache.hits() + cache.misses(), 8);
    }
}

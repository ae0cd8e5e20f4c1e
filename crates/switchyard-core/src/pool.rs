//! Object pools for dispatch state.
//!
//! A [`Pool`] hands out [`Pooled`] guards. Dropping a guard resets the value
//! and puts it back, up to the pool's idle limit, so release happens exactly
//! once even when a handler panics. An empty pool builds a fresh value;
//! exhaustion is never an error.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use switchyard_router::ParamStore;
use tracing::trace;

use crate::context::{DispatchContext, DEFAULT_HEADER_CAPACITY_LIMIT};

/// A value that can be cleared for reuse.
pub trait Recycle: Default {
    /// Clears per-use state, keeping allocated capacity where possible.
    fn recycle(&mut self);
}

impl Recycle for DispatchContext {
    fn recycle(&mut self) {
        self.reset();
    }
}

impl Recycle for ParamStore {
    fn recycle(&mut self) {
        self.reset();
    }
}

/// Counters describing pool behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Values built because the pool was empty.
    pub created: u64,
    /// Values handed out from the idle list.
    pub reused: u64,
    /// Values dropped on release because the idle list was full.
    pub discarded: u64,
}

/// A bounded pool of reusable values.
///
/// # Example
///
/// ```rust
/// use switchyard_core::Pool;
/// use switchyard_router::{ParamKey, ParamStore};
///
/// let pool: Pool<ParamStore> = Pool::new(8);
/// {
///     let mut params = pool.acquire();
///     params.set(&ParamKey::new("id"), "1");
/// }
/// assert_eq!(pool.idle_count(), 1);
/// assert!(pool.acquire().is_empty());
/// ```
pub struct Pool<T: Recycle> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    created: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
}

impl<T: Recycle> Pool<T> {
    /// Creates a pool that builds values with `T::default()`.
    #[must_use]
    pub fn new(max_idle: usize) -> Self
    where
        T: 'static,
    {
        Self::with_factory(max_idle, T::default)
    }

    /// Creates a pool that builds values with `factory`.
    pub fn with_factory<F>(max_idle: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
            factory: Box::new(factory),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Takes a value from the pool, building one if none is idle.
    pub fn acquire(&self) -> Pooled<'_, T> {
        let value = match self.idle.lock().pop() {
            Some(value) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                value
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                (self.factory)()
            }
        };
        Pooled { pool: self, value }
    }

    fn release(&self, mut value: T) {
        value.recycle();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(value);
        } else {
            drop(idle);
            self.discarded.fetch_add(1, Ordering::Relaxed);
            trace!(max_idle = self.max_idle, "pool full, discarding released value");
        }
    }

    /// Returns the number of idle values.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Returns the idle limit.
    #[must_use]
    pub const fn max_idle(&self) -> usize {
        self.max_idle
    }

    /// Returns a snapshot of the pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

impl<T: Recycle> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle_count())
            .field("max_idle", &self.max_idle)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// A value on loan from a [`Pool`]; returned to it on drop.
pub struct Pooled<'a, T: Recycle> {
    pool: &'a Pool<T>,
    value: T,
}

impl<T: Recycle> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Recycle> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Recycle> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        let value = std::mem::take(&mut self.value);
        self.pool.release(value);
    }
}

impl<T: Recycle + fmt::Debug> fmt::Debug for Pooled<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

/// Pool limits used by [`PoolManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Idle contexts kept for reuse.
    pub max_idle_contexts: usize,
    /// Idle parameter stores kept for reuse.
    pub max_idle_param_stores: usize,
    /// Header map capacity above which maps are replaced on reset.
    pub header_capacity_limit: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_idle_contexts: 1024,
            max_idle_param_stores: 256,
            header_capacity_limit: DEFAULT_HEADER_CAPACITY_LIMIT,
        }
    }
}

/// The pools a router owns.
#[derive(Debug)]
pub struct PoolManager {
    contexts: Pool<DispatchContext>,
    param_stores: Pool<ParamStore>,
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new(PoolLimits::default())
    }
}

impl PoolManager {
    /// Creates the pools with the given limits.
    #[must_use]
    pub fn new(limits: PoolLimits) -> Self {
        let header_limit = limits.header_capacity_limit;
        Self {
            contexts: Pool::with_factory(limits.max_idle_contexts, move || {
                DispatchContext::with_header_capacity_limit(header_limit)
            }),
            param_stores: Pool::new(limits.max_idle_param_stores),
        }
    }

    /// Acquires a clean dispatch context.
    pub fn acquire_context(&self) -> Pooled<'_, DispatchContext> {
        self.contexts.acquire()
    }

    /// Acquires an empty parameter store.
    pub fn acquire_params(&self) -> Pooled<'_, ParamStore> {
        self.param_stores.acquire()
    }

    /// Returns the context pool.
    #[must_use]
    pub const fn contexts(&self) -> &Pool<DispatchContext> {
        &self.contexts
    }

    /// Returns the parameter store pool.
    #[must_use]
    pub const fn param_stores(&self) -> &Pool<ParamStore> {
        &self.param_stores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;
    use http::{Method, StatusCode};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use switchyard_router::ParamKey;

    #[test]
    fn test_pool_reuses_values() {
        let pool: Pool<ParamStore> = Pool::new(4);
        drop(pool.acquire());
        drop(pool.acquire());

        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 1);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_pool_respects_max_idle() {
        let pool: Pool<ParamStore> = Pool::new(1);
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);

        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.stats().discarded, 1);
    }

    #[test]
    fn test_pool_exhaustion_builds_fresh() {
        let pool: Pool<ParamStore> = Pool::new(0);
        let guards: Vec<_> = (0..3).map(|_| pool.acquire()).collect();
        assert_eq!(guards.len(), 3);
        assert_eq!(pool.stats().created, 3);
    }

    #[test]
    fn test_released_context_is_clean() {
        let pools = PoolManager::default();
        {
            let mut ctx = pools.acquire_context();
            ctx.load(Request::builder(Method::POST, "/a").header("x", "y").build());
            ctx.params_mut().set(&ParamKey::new("id"), "1");
            ctx.set_status(StatusCode::BAD_REQUEST);
            ctx.write_str("oops");
        }

        let ctx = pools.acquire_context();
        assert_eq!(pools.contexts().stats().reused, 1);
        assert!(ctx.headers().is_empty());
        assert!(ctx.response_headers().is_empty());
        assert!(ctx.response_body().is_empty());
        assert_eq!(ctx.status(), StatusCode::OK);
        assert!(ctx.params().is_empty());
    }

    #[test]
    fn test_release_on_unwind() {
        let pools = PoolManager::default();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut ctx = pools.acquire_context();
            ctx.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            panic!("handler blew up");
        }));

        assert!(result.is_err());
        assert_eq!(pools.contexts().idle_count(), 1);
        assert_eq!(pools.acquire_context().status(), StatusCode::OK);
    }

    #[test]
    fn test_param_store_pool() {
        let pools = PoolManager::new(PoolLimits {
            max_idle_param_stores: 2,
            ..PoolLimits::default()
        });
        {
            let mut params = pools.acquire_params();
            params.set(&ParamKey::new("a"), "1");
        }
        assert!(pools.acquire_params().is_empty());
        assert_eq!(pools.param_stores().max_idle(), 2);
    }
}

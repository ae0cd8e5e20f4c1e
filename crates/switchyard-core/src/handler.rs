//! The handler type and handler identity.
//!
//! Middleware and route handlers share one closed type, [`Handler`]: a
//! shared closure over the [`DispatchContext`]. Each distinct closure is
//! given a stable [`HandlerId`] by the [`HandlerRegistry`] so compiled
//! chains can be cached by the ids of their participants.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::DispatchContext;

type HandlerFn = dyn Fn(&mut DispatchContext) + Send + Sync + 'static;

/// A middleware or route handler.
///
/// A handler continues the chain by calling
/// [`DispatchContext::next`]; returning without calling it
/// short-circuits the remaining steps. Cloning a handler is cheap and keeps
/// its identity.
///
/// # Example
///
/// ```rust
/// use switchyard_core::{DispatchContext, Handler};
/// use http::StatusCode;
///
/// let handler = Handler::named("teapot", |ctx: &mut DispatchContext| {
///     ctx.set_status(StatusCode::IM_A_TEAPOT);
/// });
///
/// let mut ctx = DispatchContext::new();
/// handler.call(&mut ctx);
/// assert_eq!(ctx.status(), StatusCode::IM_A_TEAPOT);
/// assert_eq!(handler.name(), Some("teapot"));
/// ```
#[derive(Clone)]
pub struct Handler {
    func: Arc<HandlerFn>,
    name: Option<Arc<str>>,
}

impl Handler {
    /// Wraps a closure.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut DispatchContext) + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            name: None,
        }
    }

    /// Wraps a closure and gives it a name for logs and debugging.
    pub fn named<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&mut DispatchContext) + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            name: Some(name.into()),
        }
    }

    /// Returns the handler name, if one was given.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Invokes the handler.
    #[inline]
    pub fn call(&self, ctx: &mut DispatchContext) {
        (self.func)(ctx);
    }

    /// Returns true if both values wrap the same closure.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }

    fn address(&self) -> usize {
        Arc::as_ptr(&self.func).cast::<()>() as usize
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name().unwrap_or("<anonymous>"))
            .finish_non_exhaustive()
    }
}

/// Stable identity of a handler within one router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Assigns registration-order ids to handlers by closure identity.
///
/// The registry keeps a clone of every handler it has seen, so an id can
/// never be reused by a different closure at the same address.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    ids: HashMap<usize, HandlerId>,
    handlers: Vec<Handler>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `handler`, assigning the next one if it is new.
    pub fn register(&mut self, handler: &Handler) -> HandlerId {
        let next = HandlerId(self.handlers.len() as u64);
        let id = *self.ids.entry(handler.address()).or_insert(next);
        if id == next {
            self.handlers.push(handler.clone());
        }
        id
    }

    /// Returns the id of `handler` if it has been registered.
    #[must_use]
    pub fn id_of(&self, handler: &Handler) -> Option<HandlerId> {
        self.ids.get(&handler.address()).copied()
    }

    /// Returns the number of distinct handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// An ordered sequence of handlers that a context can step through.
pub trait Chain: Send + Sync {
    /// Returns the number of steps.
    fn len(&self) -> usize;

    /// Runs step `index` against `ctx`.
    fn invoke(&self, index: usize, ctx: &mut DispatchContext);

    /// Returns true if there are no steps.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn noop() -> Handler {
        Handler::new(|_ctx: &mut DispatchContext| {})
    }

    #[test]
    fn test_handler_call() {
        let handler = Handler::new(|ctx: &mut DispatchContext| ctx.set_status(StatusCode::CREATED));
        let mut ctx = DispatchContext::new();
        handler.call(&mut ctx);
        assert_eq!(ctx.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_handler_identity() {
        let a = noop();
        let b = noop();
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_handler_debug() {
        assert!(format!("{:?}", Handler::named("auth", |_: &mut DispatchContext| {})).contains("auth"));
        assert!(format!("{:?}", noop()).contains("<anonymous>"));
    }

    #[test]
    fn test_registry_assigns_sequential_ids() {
        let mut registry = HandlerRegistry::new();
        let a = noop();
        let b = noop();

        let id_a = registry.register(&a);
        let id_b = registry.register(&b);
        assert_eq!(id_a.get(), 0);
        assert_eq!(id_b.get(), 1);
        assert_eq!(registry.register(&a.clone()), id_a);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.id_of(&b), Some(id_b));
        assert_eq!(registry.id_of(&noop()), None);
        assert_eq!(id_b.to_string(), "h1");
    }
}

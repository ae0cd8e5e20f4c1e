//! Chain compilation.
//!
//! A [`CompiledChain`] is the flattened sequence of global middleware, group
//! middleware and route handlers for one route.
//!
//! Every step still advances through [`DispatchContext::next`], which asks
//! the chain for the step at the cursor. Chains of up to four steps keep
//! their handlers in fixed-size arrays, so that lookup is a single match on
//! `(size, index)` with no slice bounds check and no extra allocation.
//! Longer chains keep a boxed slice and index into it.

use std::fmt;

use smallvec::SmallVec;
use switchyard_core::{Chain, DispatchContext, Handler, HandlerId};

/// The ordered handler ids of a chain; identical participants give equal keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ChainKey(SmallVec<[HandlerId; 8]>);

impl ChainKey {
    /// Builds a key from global middleware ids followed by route handler ids.
    #[must_use]
    pub fn from_parts(global: &[HandlerId], route: &[HandlerId]) -> Self {
        let mut ids = SmallVec::with_capacity(global.len() + route.len());
        ids.extend_from_slice(global);
        ids.extend_from_slice(route);
        Self(ids)
    }

    /// Returns the ids in execution order.
    #[must_use]
    pub fn ids(&self) -> &[HandlerId] {
        &self.0
    }

    /// Returns the number of participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no participants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<HandlerId> for ChainKey {
    fn from_iter<I: IntoIterator<Item = HandlerId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

enum Steps {
    One(Handler),
    Two([Handler; 2]),
    Three([Handler; 3]),
    Four([Handler; 4]),
    Many(Box<[Handler]>),
}

/// A ready-to-run handler chain.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use switchyard_core::{DispatchContext, Handler};
/// use switchyard_middleware::{ChainKey, CompiledChain};
/// use http::StatusCode;
///
/// let auth = Handler::new(|ctx: &mut DispatchContext| ctx.next());
/// let handler = Handler::new(|ctx: &mut DispatchContext| ctx.set_status(StatusCode::NO_CONTENT));
///
/// let chain = CompiledChain::compile(ChainKey::default(), &[auth], &[handler]);
/// assert_eq!(chain.steps(), 2);
///
/// let mut ctx = DispatchContext::new();
/// ctx.run(Arc::new(chain));
/// assert_eq!(ctx.status(), StatusCode::NO_CONTENT);
/// ```
pub struct CompiledChain {
    key: ChainKey,
    steps: Steps,
}

impl CompiledChain {
    /// Flattens `global` then `route` into one chain.
    #[must_use]
    pub fn compile(key: ChainKey, global: &[Handler], route: &[Handler]) -> Self {
        let handlers: Vec<Handler> = global.iter().chain(route).cloned().collect();
        let steps = match handlers.len() {
            1 => handlers.try_into().map(|[a]: [Handler; 1]| Steps::One(a)),
            2 => handlers.try_into().map(Steps::Two),
            3 => handlers.try_into().map(Steps::Three),
            4 => handlers.try_into().map(Steps::Four),
            _ => Err(handlers),
        }
        .unwrap_or_else(|handlers| Steps::Many(handlers.into_boxed_slice()));

        Self { key, steps }
    }

    /// Returns the key this chain was compiled for.
    #[must_use]
    pub const fn key(&self) -> &ChainKey {
        &self.key
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn steps(&self) -> usize {
        match &self.steps {
            Steps::One(_) => 1,
            Steps::Two(_) => 2,
            Steps::Three(_) => 3,
            Steps::Four(_) => 4,
            Steps::Many(steps) => steps.len(),
        }
    }

    /// Returns true if the chain stores its steps in a fixed-size array.
    #[must_use]
    pub const fn is_fixed_size(&self) -> bool {
        !matches!(self.steps, Steps::Many(_))
    }
}

impl Chain for CompiledChain {
    fn len(&self) -> usize {
        self.steps()
    }

    #[inline]
    fn invoke(&self, index: usize, ctx: &mut DispatchContext) {
        match (&self.steps, index) {
            (Steps::One(a), 0)
            | (Steps::Two([a, _]), 0)
            | (Steps::Three([a, _, _]), 0)
            | (Steps::Four([a, _, _, _]), 0) => a.call(ctx),
            (Steps::Two([_, b]), 1)
            | (Steps::Three([_, b, _]), 1)
            | (Steps::Four([_, b, _, _]), 1) => b.call(ctx),
            (Steps::Three([_, _, c]), 2) | (Steps::Four([_, _, c, _]), 2) => c.call(ctx),
            (Steps::Four([_, _, _, d]), 3) => d.call(ctx),
            (Steps::Many(steps), index) => {
                if let Some(step) = steps.get(index) {
                    step.call(ctx);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Debug for CompiledChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledChain")
            .field("key", &self.key)
            .field("steps", &self.steps())
            .field("fixed_size", &self.is_fixed_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::sync::{Arc, Mutex};

    fn recorder(log: &Arc<Mutex<Vec<usize>>>, n: usize) -> Handler {
        let log = Arc::clone(log);
        Handler::new(move |ctx: &mut DispatchContext| {
            log.lock().unwrap().push(n);
            ctx.next();
        })
    }

    fn run(global: usize, route: usize) -> (Vec<usize>, bool) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let global: Vec<_> = (0..global).map(|n| recorder(&log, n)).collect();
        let route: Vec<_> = (global.len()..global.len() + route)
            .map(|n| recorder(&log, n))
            .collect();

        let chain = CompiledChain::compile(ChainKey::default(), &global, &route);
        let fixed = chain.is_fixed_size();
        let mut ctx = DispatchContext::new();
        ctx.run(Arc::new(chain));
        let order = log.lock().unwrap().clone();
        (order, fixed)
    }

    #[test]
    fn test_chain_order_for_every_size() {
        for total in 1..=7 {
            for global in 0..total {
                let (order, fixed) = run(global, total - global);
                assert_eq!(order, (0..total).collect::<Vec<_>>(), "global={global} total={total}");
                assert_eq!(fixed, total <= 4);
            }
        }
    }

    #[test]
    fn test_chain_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let deny = Handler::new(|ctx: &mut DispatchContext| {
            ctx.set_status(StatusCode::FORBIDDEN);
            ctx.next();
        });
        let chain = CompiledChain::compile(
            ChainKey::default(),
            &[recorder(&log, 0), deny],
            &[recorder(&log, 2)],
        );

        let mut ctx = DispatchContext::new();
        ctx.run(Arc::new(chain));
        assert_eq!(*log.lock().unwrap(), vec![0]);
        assert_eq!(ctx.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_chain_post_processing_runs_after_downstream() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outer_log = Arc::clone(&log);
        let outer = Handler::new(move |ctx: &mut DispatchContext| {
            outer_log.lock().unwrap().push(10);
            ctx.next();
            outer_log.lock().unwrap().push(11);
        });
        let chain = CompiledChain::compile(ChainKey::default(), &[outer], &[recorder(&log, 1)]);

        let mut ctx = DispatchContext::new();
        ctx.run(Arc::new(chain));
        assert_eq!(*log.lock().unwrap(), vec![10, 1, 11]);
    }

    #[test]
    fn test_chain_key() {
        let mut registry = switchyard_core::HandlerRegistry::new();
        let a = registry.register(&Handler::new(|_: &mut DispatchContext| {}));
        let b = registry.register(&Handler::new(|_: &mut DispatchContext| {}));

        let key = ChainKey::from_parts(&[a], &[b]);
        assert_eq!(key.ids(), &[a, b]);
        assert_eq!(key, [a, b].into_iter().collect());
        assert_ne!(key, ChainKey::from_parts(&[b], &[a]));
        assert_eq!(key.to_string(), "h0,h1");
    }
}

//! Method-aware route table.
//!
//! Routes live in a registration-ordered list used for conflict detection
//! and enumeration. For lookup each method has its own prefix trie plus a
//! literal map for fully static paths; method-agnostic routes get a trie of
//! their own.

use std::collections::HashMap;

use http::Method;
use thiserror::Error;
use tracing::{debug, warn};

use crate::method::AllowedMethods;
use crate::node::Node;
use crate::params::ParamStore;
use crate::pattern::{Pattern, PatternError};

/// Index of a route in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(usize);

impl RouteId {
    /// Wraps a registration index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the registration index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// What to do when a new pattern conflicts with a registered one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Reject the new route.
    #[default]
    Strict,
    /// Log a warning and keep both; the earlier route wins ties.
    FirstWins,
}

/// Errors produced while inserting a route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsertError {
    /// The template did not compile.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// The pattern is equivalent to, or overlaps, a registered one.
    #[error("route `{template}` conflicts with `{existing}`")]
    Conflict {
        /// The rejected pattern.
        template: String,
        /// The registered pattern it conflicts with.
        existing: String,
    },
}

/// A registered route.
#[derive(Debug)]
pub struct Route<T> {
    id: RouteId,
    pattern: Pattern,
    value: T,
}

impl<T> Route<T> {
    /// Returns the route id.
    #[must_use]
    pub const fn id(&self) -> RouteId {
        self.id
    }

    /// Returns the compiled pattern.
    #[must_use]
    pub const fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Returns the method, or `None` for method-agnostic routes.
    #[must_use]
    pub fn method(&self) -> Option<&Method> {
        self.pattern.method()
    }

    /// Returns the attached value.
    #[must_use]
    pub const fn value(&self) -> &T {
        &self.value
    }
}

/// Result of [`RouteTable::lookup`].
#[derive(Debug)]
pub enum Lookup<'a, T> {
    /// A route matched; its captures are in the caller's store.
    Found(&'a Route<T>),
    /// The path matched only under other methods.
    MethodNotAllowed(AllowedMethods),
    /// Nothing matched the path.
    NotFound,
}

impl<'a, T> Lookup<'a, T> {
    /// Returns the matched route, if any.
    #[must_use]
    pub const fn route(&self) -> Option<&'a Route<T>> {
        match self {
            Self::Found(route) => Some(*route),
            Self::MethodNotAllowed(_) | Self::NotFound => None,
        }
    }

    /// Returns true if a route matched.
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

#[derive(Debug, Default)]
struct MethodTree {
    root: Node,
    statics: HashMap<Box<str>, RouteId>,
}

impl MethodTree {
    fn insert(&mut self, pattern: &Pattern, id: RouteId) -> bool {
        if let Some(path) = pattern.static_path() {
            self.statics.entry(path.into_boxed_str()).or_insert(id);
        }
        self.root.insert(pattern.segments(), id)
    }

    fn find(
        &self,
        path: &str,
        trailing: bool,
        params: &mut ParamStore,
        decode: bool,
    ) -> Option<RouteId> {
        if let Some(id) = self.statics.get(path) {
            return Some(*id);
        }
        self.root.find(path, trailing, params, decode)
    }
}

/// A table of routes keyed by method and pattern.
///
/// # Example
///
/// ```rust
/// use switchyard_router::{Lookup, ParamStore, Pattern, RouteTable};
/// use http::Method;
///
/// let mut table = RouteTable::new();
/// table.insert(Pattern::compile("/users/:id", Some(Method::GET)).unwrap(), "getUser").unwrap();
/// table.insert(Pattern::compile("/users/me", Some(Method::GET)).unwrap(), "getMe").unwrap();
///
/// let mut params = ParamStore::new();
/// let route = table.lookup(&Method::GET, "/users/42", &mut params).route().unwrap();
/// assert_eq!(*route.value(), "getUser");
/// assert_eq!(params.get("id"), Some("42"));
///
/// params.reset();
/// assert!(matches!(
///     table.lookup(&Method::POST, "/users/42", &mut params),
///     Lookup::MethodNotAllowed(_)
/// ));
/// ```
#[derive(Debug)]
pub struct RouteTable<T> {
    routes: Vec<Route<T>>,
    trees: Vec<(Method, MethodTree)>,
    any: MethodTree,
    policy: ConflictPolicy,
    decode: bool,
}

impl<T> Default for RouteTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RouteTable<T> {
    /// Creates an empty table with the strict conflict policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(ConflictPolicy::Strict)
    }

    /// Creates an empty table with the given conflict policy.
    #[must_use]
    pub fn with_policy(policy: ConflictPolicy) -> Self {
        Self {
            routes: Vec::new(),
            trees: Vec::new(),
            any: MethodTree::default(),
            policy,
            decode: true,
        }
    }

    /// Returns the conflict policy.
    #[must_use]
    pub const fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Enables or disables percent-decoding of captured values.
    pub fn set_decode_params(&mut self, decode: bool) {
        self.decode = decode;
    }

    /// Compiles `template` and inserts it.
    pub fn add(
        &mut self,
        method: Option<Method>,
        template: &str,
        value: T,
    ) -> Result<RouteId, InsertError> {
        let pattern = Pattern::compile(template, method)?;
        self.insert(pattern, value)
    }

    /// Inserts a compiled pattern.
    ///
    /// # Errors
    ///
    /// Returns [`InsertError::Conflict`] under [`ConflictPolicy::Strict`] if
    /// the pattern is equivalent to or overlaps a registered one.
    pub fn insert(&mut self, pattern: Pattern, value: T) -> Result<RouteId, InsertError> {
        for existing in &self.routes {
            if !pattern.conflicts_with(&existing.pattern) {
                continue;
            }
            match self.policy {
                ConflictPolicy::Strict => {
                    return Err(InsertError::Conflict {
                        template: pattern.to_string(),
                        existing: existing.pattern.to_string(),
                    });
                }
                ConflictPolicy::FirstWins => {
                    warn!(
                        route = %pattern,
                        existing = %existing.pattern,
                        "route conflicts with an earlier registration"
                    );
                }
            }
        }

        let id = RouteId::new(self.routes.len());
        let tree = match pattern.method() {
            Some(method) => self.tree_mut(method),
            None => &mut self.any,
        };
        if !tree.insert(&pattern, id) {
            warn!(route = %pattern, "route is shadowed by an earlier registration");
        }

        debug!(route = %pattern, id = id.index(), "registered route");
        self.routes.push(Route { id, pattern, value });
        Ok(id)
    }

    /// Finds the route for `method` and `path`.
    ///
    /// Captured parameters are appended to `params`. A query string, if
    /// present, is ignored. On anything but [`Lookup::Found`] the store is
    /// left as it was.
    pub fn lookup(&self, method: &Method, path: &str, params: &mut ParamStore) -> Lookup<'_, T> {
        let path = path.split_once('?').map_or(path, |(path, _)| path);
        let trailing = path.ends_with('/');

        let primary = self.tree(method);
        let fallback = if *method == Method::HEAD {
            self.tree(&Method::GET)
        } else {
            None
        };

        for tree in [primary, fallback, Some(&self.any)].into_iter().flatten() {
            if let Some(id) = tree.find(path, trailing, params, self.decode) {
                return Lookup::Found(&self.routes[id.index()]);
            }
        }

        let allowed = self.allowed_methods(path, trailing, params);
        if allowed.is_empty() {
            Lookup::NotFound
        } else {
            Lookup::MethodNotAllowed(allowed)
        }
    }

    /// Returns the methods under which `path` would match.
    fn allowed_methods(
        &self,
        path: &str,
        trailing: bool,
        params: &mut ParamStore,
    ) -> AllowedMethods {
        let mut allowed = AllowedMethods::new();
        for (method, tree) in &self.trees {
            let checkpoint = params.checkpoint();
            if tree.find(path, trailing, params, false).is_some() {
                allowed.insert(method.clone());
            }
            params.rollback(checkpoint);
        }
        allowed
    }

    /// Returns every route in registration order.
    #[must_use]
    pub fn routes(&self) -> &[Route<T>] {
        &self.routes
    }

    /// Returns the route with the given id.
    #[must_use]
    pub fn get(&self, id: RouteId) -> Option<&Route<T>> {
        self.routes.get(id.index())
    }

    /// Iterates mutably over the attached values.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.routes.iter_mut().map(|route| &mut route.value)
    }

    /// Returns the number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn tree(&self, method: &Method) -> Option<&MethodTree> {
        self.trees
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, tree)| tree)
    }

    fn tree_mut(&mut self, method: &Method) -> &mut MethodTree {
        let idx = match self.trees.iter().position(|(m, _)| m == method) {
            Some(idx) => idx,
            None => {
                self.trees.push((method.clone(), MethodTree::default()));
                self.trees.len() - 1
            }
        };
        &mut self.trees[idx].1
    }
}

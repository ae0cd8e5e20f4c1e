//! The dispatch entry point.
//!
//! [`Router`] owns the route table, the middleware list, the compiled-chain
//! cache and the object pools. Routes are registered through `&mut Router`
//! during setup; afterwards [`Router::dispatch`] runs on `&Router` from any
//! number of threads.

use std::fmt;
use std::sync::{Arc, OnceLock};

use http::header::{HeaderValue, ALLOW};
use http::Method;
use switchyard_core::{
    DispatchContext, DispatchError, Handler, HandlerId, HandlerRegistry, PoolManager, Pooled,
    Request, Response,
};
use switchyard_middleware::{ChainCache, ChainKey, CompiledChain};
use switchyard_router::{AllowedMethods, InsertError, Lookup, Pattern, RouteId, RouteTable};
use thiserror::Error;
use tracing::{debug, error, trace};

use crate::config::RouterConfig;
use crate::group::Group;

/// A function that turns a dispatch error into a response.
pub type ErrorHandler = Arc<dyn Fn(&mut DispatchContext, &DispatchError) + Send + Sync + 'static>;

/// Errors produced while registering a route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The pattern failed to compile or conflicts with a registered one.
    #[error(transparent)]
    Route(#[from] InsertError),

    /// The route was registered without any handler.
    #[error("route `{template}` has no handlers")]
    NoHandlers {
        /// The route template.
        template: String,
    },
}

/// Handlers attached to a route, plus their lazily compiled chain.
struct RouteEntry {
    handlers: Vec<Handler>,
    ids: Vec<HandlerId>,
    chain: OnceLock<Arc<CompiledChain>>,
}

impl RouteEntry {
    fn new(handlers: Vec<Handler>, registry: &mut HandlerRegistry) -> Self {
        let ids = handlers.iter().map(|h| registry.register(h)).collect();
        Self {
            handlers,
            ids,
            chain: OnceLock::new(),
        }
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("handlers", &self.handlers)
            .field("compiled", &self.chain.get().is_some())
            .finish()
    }
}

/// The outcome of [`Router::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'r> {
    /// A route matched.
    Matched {
        /// The matched pattern.
        pattern: &'r Pattern,
        /// Captured parameters in path order.
        params: Vec<(String, String)>,
    },
    /// The path is registered only under other methods.
    MethodNotAllowed(AllowedMethods),
    /// Nothing matched the path.
    NotFound,
}

/// Route registration and request dispatch.
///
/// # Example
///
/// ```rust
/// use switchyard::{DispatchContext, Handler, Request, Router};
/// use http::{Method, StatusCode};
///
/// let mut router = Router::new();
/// router.get("/users/:id", [Handler::new(|ctx: &mut DispatchContext| {
///     let body = format!("user {}", ctx.param("id").unwrap_or_default());
///     ctx.write_str(&body);
/// })]);
///
/// let response = router.dispatch(Request::new(Method::GET, "/users/42"));
/// assert_eq!(response.status, StatusCode::OK);
/// assert_eq!(response.body, "user 42");
///
/// let response = router.dispatch(Request::new(Method::DELETE, "/users/42"));
/// assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
/// assert_eq!(response.header("allow"), Some("GET"));
/// ```
pub struct Router {
    table: RouteTable<RouteEntry>,
    middleware: Vec<Handler>,
    middleware_ids: Vec<HandlerId>,
    registry: HandlerRegistry,
    chains: ChainCache,
    not_found: RouteEntry,
    method_not_allowed: RouteEntry,
    error_handler: ErrorHandler,
    pools: PoolManager,
    config: RouterConfig,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! method_helpers {
    ($($(#[$doc:meta])* $name:ident => $method:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(
                &mut self,
                pattern: &str,
                handlers: impl IntoIterator<Item = Handler>,
            ) -> &mut Self {
                self.handle(Method::$method, pattern, handlers)
            }
        )*
    };
}
pub(crate) use method_helpers;

impl Router {
    /// Creates a router with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Creates a router with the given configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        let mut table = RouteTable::with_policy(config.conflict_policy);
        table.set_decode_params(config.decode_params);

        let mut registry = HandlerRegistry::new();
        let not_found = RouteEntry::new(
            vec![Handler::named("not_found", default_not_found)],
            &mut registry,
        );
        let method_not_allowed = RouteEntry::new(
            vec![Handler::named("method_not_allowed", default_method_not_allowed)],
            &mut registry,
        );

        Self {
            table,
            middleware: Vec::new(),
            middleware_ids: Vec::new(),
            registry,
            chains: ChainCache::new(),
            not_found,
            method_not_allowed,
            error_handler: Arc::new(default_error_handler),
            pools: PoolManager::new(config.pool_limits()),
            config,
        }
    }

    // Registration

    /// Registers `handlers` for `method` and `pattern`.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is malformed, conflicts with a registered route
    /// under the strict policy, or `handlers` is empty. Use
    /// [`try_handle`](Self::try_handle) to get the error instead.
    pub fn handle(
        &mut self,
        method: Method,
        pattern: &str,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> &mut Self {
        if let Err(err) = self.try_handle(method, pattern, handlers) {
            panic!("invalid route registration: {err}");
        }
        self
    }

    /// Registers `handlers` for `pattern` under every method.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`handle`](Self::handle).
    pub fn handle_any(
        &mut self,
        pattern: &str,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> &mut Self {
        if let Err(err) = self.register(None, pattern, handlers.into_iter().collect()) {
            panic!("invalid route registration: {err}");
        }
        self
    }

    /// Registers `handlers` for `method` and `pattern`, returning any error.
    pub fn try_handle(
        &mut self,
        method: Method,
        pattern: &str,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> Result<RouteId, RegistrationError> {
        self.register(Some(method), pattern, handlers.into_iter().collect())
    }

    /// Registers `handlers` for `pattern` under every method, returning any error.
    pub fn try_handle_any(
        &mut self,
        pattern: &str,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> Result<RouteId, RegistrationError> {
        self.register(None, pattern, handlers.into_iter().collect())
    }

    pub(crate) fn register(
        &mut self,
        method: Option<Method>,
        pattern: &str,
        handlers: Vec<Handler>,
    ) -> Result<RouteId, RegistrationError> {
        if handlers.is_empty() {
            return Err(RegistrationError::NoHandlers {
                template: pattern.to_string(),
            });
        }
        let compiled = Pattern::compile(pattern, method).map_err(InsertError::from)?;
        let entry = RouteEntry::new(handlers, &mut self.registry);
        Ok(self.table.insert(compiled, entry)?)
    }

    method_helpers! {
        /// Registers a `GET` route. `HEAD` requests are answered by it too.
        get => GET;
        /// Registers a `POST` route.
        post => POST;
        /// Registers a `PUT` route.
        put => PUT;
        /// Registers a `DELETE` route.
        delete => DELETE;
        /// Registers a `PATCH` route.
        patch => PATCH;
        /// Registers a `HEAD` route.
        head => HEAD;
        /// Registers an `OPTIONS` route.
        options => OPTIONS;
    }

    /// Appends global middleware, run before every route's handlers.
    ///
    /// Applies to routes registered before and after this call.
    pub fn use_middleware(&mut self, handlers: impl IntoIterator<Item = Handler>) -> &mut Self {
        for handler in handlers {
            let id = self.registry.register(&handler);
            debug!(middleware = handler.name().unwrap_or("<anonymous>"), id = %id, "added global middleware");
            self.middleware.push(handler);
            self.middleware_ids.push(id);
        }
        self.invalidate_chains();
        self
    }

    /// Starts a group of routes sharing `prefix` and group middleware.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group::new(self, prefix)
    }

    /// Replaces the handler run when no route matches.
    pub fn set_not_found(&mut self, handler: Handler) -> &mut Self {
        self.not_found = RouteEntry::new(vec![handler], &mut self.registry);
        self
    }

    /// Replaces the handler run when the path matches only other methods.
    ///
    /// The `Allow` header is already set when it runs.
    pub fn set_method_not_allowed(&mut self, handler: Handler) -> &mut Self {
        self.method_not_allowed = RouteEntry::new(vec![handler], &mut self.registry);
        self
    }

    /// Replaces the function that renders errors into responses.
    ///
    /// It runs after the chain whenever an error was recorded or the status is
    /// 400 or above.
    pub fn set_error_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut DispatchContext, &DispatchError) + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    fn invalidate_chains(&mut self) {
        for entry in self.table.values_mut() {
            entry.chain.take();
        }
        self.not_found.chain.take();
        self.method_not_allowed.chain.take();
        self.chains.clear();
    }

    // Dispatch

    /// Runs a request through the matching chain and returns the response.
    ///
    /// The dispatch context comes from the router's pool and goes back to it
    /// when this returns, or if a handler panics.
    pub fn dispatch(&self, request: Request) -> Response {
        self.process(request).take_response()
    }

    /// Like [`dispatch`](Self::dispatch), but writes into `response`.
    ///
    /// The header map of `response` is cleared and handed to the pooled
    /// context in exchange for the produced headers, so a caller that reuses
    /// one `Response` per connection keeps both maps allocated.
    pub fn dispatch_into(&self, request: Request, response: &mut Response) {
        self.process(request).take_response_into(response);
    }

    fn process(&self, request: Request) -> Pooled<'_, DispatchContext> {
        let mut ctx = self.pools.acquire_context();
        ctx.load(request);

        let chain = self.select_chain(&mut ctx);
        ctx.run(chain);
        self.finish(&mut ctx);

        trace!(
            method = %ctx.method(),
            path = ctx.path(),
            status = ctx.status().as_u16(),
            "dispatched request"
        );
        ctx
    }

    fn select_chain(&self, ctx: &mut DispatchContext) -> Arc<CompiledChain> {
        let (method, path, params) = ctx.lookup_parts();
        match self.table.lookup(method, path, params) {
            Lookup::Found(route) => {
                trace!(route = %route.pattern(), "matched route");
                self.chain_for(route.value())
            }
            Lookup::MethodNotAllowed(allowed) => {
                if let Ok(value) = HeaderValue::from_str(&allowed.header_value()) {
                    ctx.set_header(ALLOW, value);
                }
                ctx.set_allowed_methods(allowed);
                self.chain_for(&self.method_not_allowed)
            }
            Lookup::NotFound => self.chain_for(&self.not_found),
        }
    }

    fn chain_for(&self, entry: &RouteEntry) -> Arc<CompiledChain> {
        let chain = entry.chain.get_or_init(|| {
            let key = ChainKey::from_parts(&self.middleware_ids, &entry.ids);
            self.chains.get_or_compile(&key, || {
                CompiledChain::compile(key.clone(), &self.middleware, &entry.handlers)
            })
        });
        Arc::clone(chain)
    }

    fn finish(&self, ctx: &mut DispatchContext) {
        let error = match ctx.take_error() {
            Some(error) => Some(error),
            None if ctx.status().as_u16() >= 400 => Some(DispatchError::from_status(ctx.status())),
            None => None,
        };

        if let Some(error) = error {
            if error.is_internal() {
                error!(
                    method = %ctx.method(),
                    path = ctx.path(),
                    error = %error,
                    source = ?std::error::Error::source(&error),
                    "internal error during dispatch"
                );
            }
            (self.error_handler)(ctx, &error);
        }

        if self.config.strip_head_body && *ctx.method() == Method::HEAD {
            ctx.clear_response_body();
        }
    }

    // Inspection

    /// Looks up a route without running it.
    ///
    /// Uses a pooled parameter store; the captured values are copied out.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution<'_> {
        let mut params = self.pools.acquire_params();
        match self.table.lookup(method, path, &mut params) {
            Lookup::Found(route) => Resolution::Matched {
                pattern: route.pattern(),
                params: params.to_owned_pairs(),
            },
            Lookup::MethodNotAllowed(allowed) => Resolution::MethodNotAllowed(allowed),
            Lookup::NotFound => Resolution::NotFound,
        }
    }

    /// Iterates over registered patterns in registration order.
    pub fn routes(&self) -> impl Iterator<Item = &Pattern> {
        self.table.routes().iter().map(|route| route.pattern())
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the compiled-chain cache.
    #[must_use]
    pub const fn chain_cache(&self) -> &ChainCache {
        &self.chains
    }

    /// Returns the object pools.
    #[must_use]
    pub const fn pools(&self) -> &PoolManager {
        &self.pools
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.table.len())
            .field("middleware", &self.middleware)
            .field("chains", &self.chains.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn default_not_found(ctx: &mut DispatchContext) {
    let error = DispatchError::not_found(ctx.path());
    ctx.fail(error);
}

fn default_method_not_allowed(ctx: &mut DispatchContext) {
    let error = DispatchError::method_not_allowed(ctx.allowed_methods().clone());
    ctx.fail(error);
}

/// Renders the error as a JSON envelope with the error's status.
///
/// A response that already carries a body under the same error status, with
/// no richer error recorded, is left as the handler wrote it.
pub fn default_error_handler(ctx: &mut DispatchContext, error: &DispatchError) {
    if matches!(error, DispatchError::Http { status, .. } if *status == ctx.status())
        && !ctx.response_body().is_empty()
    {
        return;
    }
    let body = serde_json::to_vec(&error.to_envelope()).unwrap_or_default();
    ctx.respond(error.status_code(), "application/json", &body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use switchyard_router::PatternError;

    fn text(body: &'static str) -> Handler {
        Handler::new(move |ctx: &mut DispatchContext| ctx.write_str(body))
    }

    fn get(router: &Router, path: &str) -> Response {
        router.dispatch(Request::new(Method::GET, path))
    }

    #[test]
    fn test_router_new() {
        let router = Router::new();
        assert!(router.is_empty());
        assert_eq!(router.config(), &RouterConfig::default());
    }

    #[test]
    fn test_router_dispatch_static() {
        let mut router = Router::new();
        router.get("/health", [text("ok")]);

        let response = get(&router, "/health");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, "ok");
    }

    #[test]
    fn test_router_default_not_found_envelope() {
        let router = Router::new();
        let response = get(&router, "/missing");

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.header("content-type"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["status"], 404);
    }

    #[test]
    fn test_router_try_handle_errors() {
        let mut router = Router::new();
        assert_eq!(
            router.try_handle(Method::GET, "/x", Vec::new()),
            Err(RegistrationError::NoHandlers {
                template: "/x".to_string()
            })
        );
        assert_eq!(
            router.try_handle(Method::GET, "", [text("x")]),
            Err(RegistrationError::Route(InsertError::Pattern(PatternError::Empty)))
        );

        router.get("/users/:id", [text("a")]);
        assert!(matches!(
            router.try_handle(Method::GET, "/users/{name}", [text("b")]),
            Err(RegistrationError::Route(InsertError::Conflict { .. }))
        ));
        assert!(router.try_handle_any("/status", [text("c")]).is_ok());
        assert_eq!(router.len(), 2);
    }

    #[test]
    #[should_panic(expected = "invalid route registration")]
    fn test_router_handle_panics_on_conflict() {
        let mut router = Router::new();
        router.get("/a/:x", [text("1")]);
        router.get("/a/:y", [text("2")]);
    }

    #[test]
    fn test_router_resolve() {
        let mut router = Router::new();
        router.get("/a/:x/b/:y", [text("ab")]);

        match router.resolve(&Method::GET, "/a/1/b/2") {
            Resolution::Matched { pattern, params } => {
                assert_eq!(pattern.template(), "/a/:x/b/:y");
                assert_eq!(
                    params,
                    vec![
                        ("x".to_string(), "1".to_string()),
                        ("y".to_string(), "2".to_string())
                    ]
                );
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
        assert_eq!(router.resolve(&Method::GET, "/a/1/b"), Resolution::NotFound);
        assert!(matches!(
            router.resolve(&Method::PUT, "/a/1/b/2"),
            Resolution::MethodNotAllowed(_)
        ));
        assert_eq!(router.pools().param_stores().idle_count(), 1);
    }

    #[test]
    fn test_router_routes_enumeration() {
        let mut router = Router::new();
        router.get("/a", [text("a")]).post("/b", [text("b")]);
        let routes: Vec<String> = router.routes().map(ToString::to_string).collect();
        assert_eq!(routes, vec!["GET /a", "POST /b"]);
    }

    #[test]
    fn test_router_middleware_added_later_applies() {
        let mut router = Router::new();
        router.get("/x", [text("body")]);
        assert_eq!(get(&router, "/x").body, "body");

        router.use_middleware([Handler::new(|ctx: &mut DispatchContext| {
            ctx.write_str("mw:");
            ctx.next();
        })]);
        assert_eq!(get(&router, "/x").body, "mw:body");
    }

    #[test]
    fn test_router_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Router>();
    }
}

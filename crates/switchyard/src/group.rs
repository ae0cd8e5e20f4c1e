//! Route groups.

use http::Method;
use switchyard_core::Handler;
use switchyard_router::RouteId;

use crate::router::{method_helpers, RegistrationError, Router};

/// Routes sharing a path prefix and group middleware.
///
/// Group middleware runs after the router's global middleware and before
/// the route's own handlers. Middleware added to a group applies to routes
/// registered on it afterwards.
///
/// # Example
///
/// ```rust
/// use switchyard::{DispatchContext, Handler, Request, Router};
/// use http::Method;
///
/// let mut router = Router::new();
/// {
///     let mut api = router.group("/api");
///     api.use_middleware([Handler::new(|ctx: &mut DispatchContext| {
///         ctx.write_str("api:");
///         ctx.next();
///     })]);
///     api.group("/v1").get("/ping", [Handler::new(|ctx: &mut DispatchContext| {
///         ctx.write_str("pong");
///     })]);
/// }
///
/// let response = router.dispatch(Request::new(Method::GET, "/api/v1/ping"));
/// assert_eq!(response.body, "api:pong");
/// ```
#[derive(Debug)]
pub struct Group<'r> {
    router: &'r mut Router,
    prefix: String,
    middleware: Vec<Handler>,
}

impl<'r> Group<'r> {
    pub(crate) fn new(router: &'r mut Router, prefix: &str) -> Self {
        Self {
            router,
            prefix: normalize_prefix(prefix),
            middleware: Vec::new(),
        }
    }

    /// Returns the group's path prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Appends group middleware for routes registered afterwards.
    pub fn use_middleware(&mut self, handlers: impl IntoIterator<Item = Handler>) -> &mut Self {
        self.middleware.extend(handlers);
        self
    }

    /// Starts a nested group that inherits this group's prefix and middleware.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        let full = join(&self.prefix, prefix);
        Group {
            router: &mut *self.router,
            prefix: normalize_prefix(&full),
            middleware: self.middleware.clone(),
        }
    }

    /// Registers `handlers` for `method` and the prefixed pattern.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Router::handle`].
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

    /// Registers `handlers` for the prefixed pattern under every method.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Router::handle`].
    pub fn handle_any(
        &mut self,
        pattern: &str,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> &mut Self {
        if let Err(err) = self.try_handle_any(pattern, handlers) {
            panic!("invalid route registration: {err}");
        }
        self
    }

    /// Registers `handlers` for `method` and the prefixed pattern, returning any error.
    pub fn try_handle(
        &mut self,
        method: Method,
        pattern: &str,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> Result<RouteId, RegistrationError> {
        self.register(Some(method), pattern, handlers)
    }

    /// Registers `handlers` for the prefixed pattern under every method, returning any error.
    pub fn try_handle_any(
        &mut self,
        pattern: &str,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> Result<RouteId, RegistrationError> {
        self.register(None, pattern, handlers)
    }

    fn register(
        &mut self,
        method: Option<Method>,
        pattern: &str,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> Result<RouteId, RegistrationError> {
        let route: Vec<Handler> = handlers.into_iter().collect();
        let template = join(&self.prefix, pattern);
        if route.is_empty() {
            return Err(RegistrationError::NoHandlers { template });
        }
        let chain = self.middleware.iter().cloned().chain(route).collect();
        self.router.register(method, &template, chain)
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
}

/// Trims trailing slashes and ensures a leading one; the root prefix is empty.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn join(prefix: &str, pattern: &str) -> String {
    if pattern.is_empty() {
        return prefix.to_string();
    }
    if pattern.starts_with('/') {
        format!("{prefix}{pattern}")
    } else {
        format!("{prefix}/{pattern}")
    }
}

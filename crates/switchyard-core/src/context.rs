//! Per-request dispatch state.
//!
//! A [`DispatchContext`] carries the request, the response being built, the
//! captured path parameters and the position in the running handler chain.
//! Contexts are pooled: [`DispatchContext::reset`] returns one to a clean
//! state while keeping the buffers it has grown.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{Extensions, HeaderMap, Method, StatusCode};
use switchyard_router::{AllowedMethods, ParamStore};

use crate::handler::Chain;
use crate::types::{split_target, Request, Response};
use crate::DispatchError;

/// Header maps above this capacity are replaced instead of cleared on reset.
pub const DEFAULT_HEADER_CAPACITY_LIMIT: usize = 64;

/// Mutable state for one request as it moves through a handler chain.
///
/// # Example
///
/// ```rust
/// use switchyard_core::{DispatchContext, Request};
/// use http::{Method, StatusCode};
///
/// let mut ctx = DispatchContext::new();
/// ctx.load(Request::new(Method::GET, "/hello?name=world"));
/// assert_eq!(ctx.path(), "/hello");
/// assert_eq!(ctx.query(), Some("name=world"));
///
/// ctx.set_status(StatusCode::ACCEPTED);
/// ctx.write_str("queued");
/// let response = ctx.take_response();
/// assert_eq!(response.status, StatusCode::ACCEPTED);
/// assert_eq!(response.body, "queued");
/// ```
pub struct DispatchContext {
    method: Method,
    target: String,
    path_len: usize,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    params: ParamStore,

    status: StatusCode,
    response_headers: HeaderMap,
    response_body: BytesMut,

    error: Option<DispatchError>,
    allowed: AllowedMethods,
    extensions: Extensions,

    cursor: usize,
    chain: Option<Arc<dyn Chain>>,
    header_capacity_limit: usize,
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::with_header_capacity_limit(DEFAULT_HEADER_CAPACITY_LIMIT)
    }

    /// Creates an empty context whose header maps are replaced on reset once
    /// their capacity exceeds `limit`.
    #[must_use]
    pub fn with_header_capacity_limit(limit: usize) -> Self {
        Self {
            method: Method::GET,
            target: String::new(),
            path_len: 0,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
            params: ParamStore::new(),
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            response_body: BytesMut::new(),
            error: None,
            allowed: AllowedMethods::new(),
            extensions: Extensions::new(),
            cursor: 0,
            chain: None,
            header_capacity_limit: limit,
        }
    }

    /// Copies a request into the context.
    pub fn load(&mut self, request: Request) {
        self.method = request.method;
        self.target.clear();
        self.target.push_str(&request.target);
        self.path_len = split_target(&self.target).0.len();
        self.headers = request.headers;
        self.body = request.body;
        self.remote_addr = request.remote_addr;
    }

    // Request

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path, without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.target[..self.path_len]
    }

    /// Returns the query string, without the `?`.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.target.get(self.path_len + 1..)
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a request header as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the request body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the peer address, if known.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Returns a captured path parameter.
    ///
    /// The value is only valid for this request; copy it to keep it.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Returns every captured path parameter.
    #[must_use]
    pub fn params(&self) -> &ParamStore {
        &self.params
    }

    /// Returns the parameter store for writing.
    pub fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    /// Splits the context into the pieces a route lookup needs.
    #[doc(hidden)]
    pub fn lookup_parts(&mut self) -> (&Method, &str, &mut ParamStore) {
        (&self.method, &self.target[..self.path_len], &mut self.params)
    }

    // Response

    /// Returns the response status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the response status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Returns the response headers.
    #[must_use]
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Returns the response headers for writing.
    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    /// Sets a response header, replacing existing values.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.response_headers.insert(name, value);
    }

    /// Appends bytes to the response body.
    pub fn write(&mut self, bytes: &[u8]) {
        self.response_body.extend_from_slice(bytes);
    }

    /// Appends text to the response body.
    pub fn write_str(&mut self, text: &str) {
        self.write(text.as_bytes());
    }

    /// Returns the response body written so far.
    #[must_use]
    pub fn response_body(&self) -> &[u8] {
        &self.response_body
    }

    /// Discards the response body written so far.
    pub fn clear_response_body(&mut self) {
        self.response_body.clear();
    }

    /// Sets status, content type and body in one call, replacing any body.
    pub fn respond(&mut self, status: StatusCode, content_type: &'static str, body: &[u8]) {
        self.status = status;
        self.response_headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static(content_type),
        );
        self.response_body.clear();
        self.response_body.extend_from_slice(body);
    }

    /// Moves the response out.
    ///
    /// Headers are drained into a map sized for them, so the context's own
    /// header map and body buffer keep their capacity for the next request.
    pub fn take_response(&mut self) -> Response {
        let mut headers = HeaderMap::with_capacity(self.response_headers.len());
        headers.extend(self.response_headers.drain());
        Response {
            status: self.status,
            headers,
            body: self.response_body.split().freeze(),
        }
    }

    /// Moves the response into `response`, taking its cleared header map in
    /// exchange for the produced one.
    pub fn take_response_into(&mut self, response: &mut Response) {
        response.headers.clear();
        std::mem::swap(&mut response.headers, &mut self.response_headers);
        response.status = self.status;
        response.body = self.response_body.split().freeze();
    }

    // Errors

    /// Records an error. Remaining chain steps are skipped.
    ///
    /// A second failure replaces the first.
    pub fn fail(&mut self, error: impl Into<DispatchError>) {
        self.error = Some(error.into());
    }

    /// Returns the recorded error.
    #[must_use]
    pub fn error(&self) -> Option<&DispatchError> {
        self.error.as_ref()
    }

    /// Takes the recorded error out of the context.
    pub fn take_error(&mut self) -> Option<DispatchError> {
        self.error.take()
    }

    /// Returns true once an error is recorded or the status is 400 or above.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.error.is_some() || self.status.as_u16() >= 400
    }

    /// Returns the methods the path is registered under, after a 405.
    #[must_use]
    pub fn allowed_methods(&self) -> &AllowedMethods {
        &self.allowed
    }

    /// Records the methods for a 405 response.
    pub fn set_allowed_methods(&mut self, allowed: AllowedMethods) {
        self.allowed = allowed;
    }

    // Extensions

    /// Returns request-scoped values set by middleware.
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Returns request-scoped values for writing.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    // Chain

    /// Runs `chain` from its first step.
    pub fn run(&mut self, chain: Arc<dyn Chain>) {
        self.chain = Some(chain);
        self.cursor = 0;
        self.next();
    }

    /// Invokes the next step of the running chain.
    ///
    /// Does nothing once the chain is exhausted, or if the context is halted
    /// before any step after the first.
    pub fn next(&mut self) {
        let Some(chain) = self.chain.clone() else {
            return;
        };
        let index = self.cursor;
        if index >= chain.len() {
            return;
        }
        if index > 0 && self.is_halted() {
            return;
        }
        self.cursor += 1;
        chain.invoke(index, self);
    }

    /// Returns how many chain steps have been entered.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Clears every request-specific field, keeping allocated capacity.
    pub fn reset(&mut self) {
        self.method = Method::GET;
        self.target.clear();
        self.path_len = 0;
        reset_headers(&mut self.headers, self.header_capacity_limit);
        self.body = Bytes::new();
        self.remote_addr = None;
        self.params.reset();

        self.status = StatusCode::OK;
        reset_headers(&mut self.response_headers, self.header_capacity_limit);
        self.response_body.clear();

        self.error = None;
        self.allowed.clear();
        self.extensions.clear();

        self.cursor = 0;
        self.chain = None;
    }
}

fn reset_headers(headers: &mut HeaderMap, limit: usize) {
    if headers.capacity() > limit {
        *headers = HeaderMap::new();
    } else {
        headers.clear();
    }
}

impl fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("method", &self.method)
            .field("target", &self.target)
            .field("params", &self.params)
            .field("status", &self.status)
            .field("error", &self.error)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Handler;
    use std::sync::Mutex;
    use switchyard_router::ParamKey;

    struct VecChain(Vec<Handler>);

    impl Chain for VecChain {
        fn len(&self) -> usize {
            self.0.len()
        }

        fn invoke(&self, index: usize, ctx: &mut DispatchContext) {
            self.0[index].call(ctx);
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str, forward: bool) -> Handler {
        let log = Arc::clone(log);
        Handler::new(move |ctx: &mut DispatchContext| {
            log.lock().unwrap().push(name);
            if forward {
                ctx.next();
            }
        })
    }

    #[test]
    fn test_context_new() {
        let ctx = DispatchContext::new();
        assert_eq!(ctx.method(), Method::GET);
        assert_eq!(ctx.path(), "");
        assert_eq!(ctx.query(), None);
        assert_eq!(ctx.status(), StatusCode::OK);
        assert!(ctx.params().is_empty());
        assert!(!ctx.is_halted());
    }

    #[test]
    fn test_context_load() {
        let mut ctx = DispatchContext::new();
        let request = Request::builder(Method::POST, "/users?dry_run=1")
            .header("x-request-id", "abc")
            .body("{}")
            .build();
        ctx.load(request);

        assert_eq!(ctx.method(), Method::POST);
        assert_eq!(ctx.path(), "/users");
        assert_eq!(ctx.query(), Some("dry_run=1"));
        assert_eq!(ctx.header("x-request-id"), Some("abc"));
        assert_eq!(ctx.body(), &Bytes::from_static(b"{}"));

        let (method, path, _) = ctx.lookup_parts();
        assert_eq!((method.clone(), path), (Method::POST, "/users"));
    }

    #[test]
    fn test_context_chain_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = VecChain(vec![
            recorder(&log, "a", true),
            recorder(&log, "b", true),
            recorder(&log, "c", false),
        ]);

        let mut ctx = DispatchContext::new();
        ctx.run(Arc::new(chain));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(ctx.cursor(), 3);

        // Calling next past the end is a no-op.
        ctx.next();
        assert_eq!(ctx.cursor(), 3);
    }

    #[test]
    fn test_context_short_circuit_without_next() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = VecChain(vec![recorder(&log, "a", false), recorder(&log, "b", true)]);

        let mut ctx = DispatchContext::new();
        ctx.run(Arc::new(chain));
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_context_halts_on_error_status() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let deny = Handler::new(|ctx: &mut DispatchContext| {
            ctx.set_status(StatusCode::FORBIDDEN);
            ctx.next();
        });
        let chain = VecChain(vec![deny, recorder(&log, "handler", false)]);

        let mut ctx = DispatchContext::new();
        ctx.run(Arc::new(chain));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(ctx.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_context_halts_on_recorded_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let fail = Handler::new(|ctx: &mut DispatchContext| {
            ctx.fail(DispatchError::internal("boom"));
            ctx.next();
        });
        let chain = VecChain(vec![fail, recorder(&log, "handler", false)]);

        let mut ctx = DispatchContext::new();
        ctx.run(Arc::new(chain));
        assert!(log.lock().unwrap().is_empty());
        assert!(ctx.take_error().is_some_and(|e| e.is_internal()));
        assert!(ctx.error().is_none());
    }

    #[test]
    fn test_context_take_response() {
        let mut ctx = DispatchContext::new();
        ctx.respond(StatusCode::CREATED, "text/plain", b"made");
        ctx.set_header(
            HeaderName::from_static("x-id"),
            HeaderValue::from_static("7"),
        );

        let response = ctx.take_response();
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.header("x-id"), Some("7"));
        assert_eq!(response.body, Bytes::from_static(b"made"));
        assert!(ctx.response_body().is_empty());
        assert!(ctx.response_headers().is_empty());
    }

    #[test]
    fn test_context_take_response_keeps_header_capacity() {
        let mut ctx = DispatchContext::new();
        for i in 0..8 {
            let name = HeaderName::from_bytes(format!("x-h{i}").as_bytes()).unwrap();
            ctx.set_header(name, HeaderValue::from_static("v"));
        }

        let response = ctx.take_response();
        assert_eq!(response.headers.len(), 8);

        ctx.reset();
        assert!(ctx.response_headers().is_empty());
        assert!(ctx.response_headers().capacity() >= 8);
    }

    #[test]
    fn test_context_take_response_into_swaps_maps() {
        let mut response = Response::default();
        response.headers.reserve(16);
        response
            .headers
            .insert(HeaderName::from_static("x-stale"), HeaderValue::from_static("old"));
        let reused = response.headers.capacity();

        let mut ctx = DispatchContext::new();
        ctx.respond(StatusCode::ACCEPTED, "text/plain", b"queued");
        ctx.take_response_into(&mut response);

        assert_eq!(response.status, StatusCode::ACCEPTED);
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.header("x-stale"), None);
        assert_eq!(response.body, Bytes::from_static(b"queued"));
        assert!(ctx.response_headers().is_empty());
        assert_eq!(ctx.response_headers().capacity(), reused);
    }

    #[test]
    fn test_context_reset_clears_everything() {
        let mut ctx = DispatchContext::new();
        ctx.load(Request::builder(Method::PUT, "/x?y=1").header("a", "b").build());
        ctx.params_mut().set(&ParamKey::new("id"), "9");
        ctx.set_status(StatusCode::NOT_FOUND);
        ctx.set_header(HeaderName::from_static("x-a"), HeaderValue::from_static("1"));
        ctx.write_str("body");
        ctx.fail(DispatchError::internal("x"));
        ctx.set_allowed_methods([Method::GET].into_iter().collect());
        ctx.extensions_mut().insert(42u32);
        ctx.run(Arc::new(VecChain(vec![Handler::new(|_: &mut DispatchContext| {})])));

        ctx.reset();

        assert_eq!(ctx.method(), Method::GET);
        assert_eq!(ctx.path(), "");
        assert_eq!(ctx.query(), None);
        assert!(ctx.headers().is_empty());
        assert!(ctx.body().is_empty());
        assert!(ctx.params().is_empty());
        assert_eq!(ctx.status(), StatusCode::OK);
        assert!(ctx.response_headers().is_empty());
        assert!(ctx.response_body().is_empty());
        assert!(ctx.error().is_none());
        assert!(ctx.allowed_methods().is_empty());
        assert!(ctx.extensions().get::<u32>().is_none());
        assert_eq!(ctx.cursor(), 0);

        // No chain attached after reset.
        ctx.next();
        assert_eq!(ctx.cursor(), 0);
    }

    #[test]
    fn test_context_reset_replaces_oversized_headers() {
        let mut ctx = DispatchContext::with_header_capacity_limit(4);
        for i in 0..32 {
            let name = HeaderName::from_bytes(format!("x-h{i}").as_bytes()).unwrap();
            ctx.response_headers_mut().insert(name, HeaderValue::from_static("v"));
        }
        assert!(ctx.response_headers().capacity() > 4);

        ctx.reset();
        assert!(ctx.response_headers().capacity() <= 4);
    }
}

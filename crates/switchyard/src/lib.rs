//! # Switchyard
//!
//! A synchronous HTTP dispatch core: route registration, trie lookup with
//! typed parameters, and middleware chains compiled on first use and shared
//! through a cache.
//!
//! Switchyard does no I/O. The embedding server turns its wire request into a
//! [`Request`], calls [`Router::dispatch`], and writes the returned
//! [`Response`]. One [`Router`] can be shared by every server thread.
//!
//! ## Quick Start
//!
//! ```rust
//! use switchyard::prelude::*;
//! use http::{Method, StatusCode};
//!
//! let mut router = Router::new();
//!
//! router.use_middleware([Handler::named("auth", |ctx: &mut DispatchContext| {
//!     if ctx.header("authorization").is_none() {
//!         ctx.fail(DispatchError::http(StatusCode::UNAUTHORIZED, "missing credentials"));
//!         return;
//!     }
//!     ctx.next();
//! })]);
//!
//! router.get("/users/:id", [Handler::named("show_user", |ctx: &mut DispatchContext| {
//!     let body = format!("user {}", ctx.param("id").unwrap_or_default());
//!     ctx.write_str(&body);
//! })]);
//!
//! let request = Request::builder(Method::GET, "/users/7")
//!     .header("authorization", "Bearer t")
//!     .build();
//! assert_eq!(router.dispatch(request).body, "user 7");
//!
//! let response = router.dispatch(Request::new(Method::GET, "/users/7"));
//! assert_eq!(response.status, StatusCode::UNAUTHORIZED);
//! ```
//!
//! ## Crates
//!
//! | Crate | Contents |
//! |-------|----------|
//! | [`routing`] | patterns, the per-method trie, parameter storage |
//! | [`core`] | dispatch context, handlers, errors, pools |
//! | [`middleware`] | compiled chains and the chain cache |

#![doc(html_root_url = "https://docs.rs/switchyard/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod group;
mod router;

pub use config::{ConfigError, RouterConfig, RouterConfigBuilder};
pub use group::Group;
pub use router::{default_error_handler, ErrorHandler, RegistrationError, Resolution, Router};

// Re-export core types
pub use switchyard_core as core;
pub use switchyard_core::{
    DispatchContext, DispatchError, DispatchResult, Handler, Request, RequestBuilder, Response,
};

// Re-export middleware types
pub use switchyard_middleware as middleware;

// Re-export routing types
pub use switchyard_router as routing;
pub use switchyard_router::{AllowedMethods, ConflictPolicy, Pattern, PatternError, RouteId};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use switchyard::prelude::*;
///
/// let router = Router::new();
/// assert!(router.is_empty());
/// ```
pub mod prelude {
    pub use crate::{
        ConflictPolicy, DispatchContext, DispatchError, DispatchResult, Group, Handler,
        RegistrationError, Request, Response, Router, RouterConfig,
    };
}

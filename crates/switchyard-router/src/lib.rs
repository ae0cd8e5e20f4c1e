//! Route compilation and lookup for Switchyard.
//!
//! This crate turns route templates into compiled [`Pattern`]s, stores them
//! in a method-aware [`RouteTable`], and resolves request paths to routes
//! while capturing parameters into a reusable [`ParamStore`].
//!
//! # Features
//!
//! - **Pattern language**: literals, `:id` / `{id}` parameters, `*` / `*rest` /
//!   `{rest...}` wildcards and the `{$}` end anchor
//! - **Conflict detection**: equivalent or overlapping registrations are
//!   rejected at setup time
//! - **Literal fast path**: fully static routes resolve with one hash lookup
//! - **Allocation-free captures**: a warmed-up [`ParamStore`] never allocates
//! - **405 support**: the [`AllowedMethods`] for a path are computed on a miss
//!
//! # Example
//!
//! ```rust
//! use switchyard_router::{Lookup, ParamStore, RouteTable};
//! use http::Method;
//!
//! let mut table = RouteTable::new();
//! table.add(Some(Method::GET), "/users", "listUsers").unwrap();
//! table.add(Some(Method::GET), "/users/:id", "getUser").unwrap();
//! table.add(Some(Method::GET), "/files/*path", "serveFile").unwrap();
//!
//! let mut params = ParamStore::new();
//! match table.lookup(&Method::GET, "/files/css/site.css", &mut params) {
//!     Lookup::Found(route) => assert_eq!(*route.value(), "serveFile"),
//!     _ => unreachable!(),
//! }
//! assert_eq!(params.get("path"), Some("css/site.css"));
//! ```
//!
//! # Architecture
//!
//! Each method owns a trie where every node is one path segment:
//!
//! ```text
//!                    (root)
//!                      │
//!              ┌───────┴───────┐
//!              │               │
//!            users           files
//!              │               │
//!        ┌─────┴─────┐       *path
//!        │           │
//!     (route)      :id
//!                    │
//!                 (route)
//! ```
//!
//! Literal children are tried before parameters, parameters before
//! wildcards. A failed branch rolls back whatever it captured.

mod method;
mod node;
mod params;
mod pattern;
mod table;

pub use method::AllowedMethods;
pub use params::{fnv1a, Checkpoint, ParamKey, ParamStore, INLINE_PARAMS};
pub use pattern::{Pattern, PatternError, Relationship, Segment, ANONYMOUS_WILDCARD};
pub use table::{ConflictPolicy, InsertError, Lookup, Route, RouteId, RouteTable};

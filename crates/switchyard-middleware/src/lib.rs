//! # Switchyard Middleware
//!
//! Just-in-time compilation of middleware chains.
//!
//! A route's chain is its global middleware followed by its group middleware
//! and route handlers, in registration order. The first request to a route
//! compiles the chain into a [`CompiledChain`]; chains with identical
//! participants are shared through the [`ChainCache`].
//!
//! ## Execution Model
//!
//! ```text
//! ctx.run(chain)
//!   └─ step 0 ── ctx.next() ──▶ step 1 ── ctx.next() ──▶ ... ──▶ handler
//!                   │
//!                   └─ halted (error recorded or status >= 400): stop
//! ```
//!
//! A step that returns without calling `next` ends the chain early. Code
//! after `next` in a step runs once everything downstream has finished.

#![forbid(unsafe_code)]

mod cache;
mod chain;

pub use cache::ChainCache;
pub use chain::{ChainKey, CompiledChain};

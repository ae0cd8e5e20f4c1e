//! # Switchyard Core
//!
//! Per-request types shared by the Switchyard crates:
//!
//! - [`DispatchContext`] - Request, response accumulator, parameters and chain cursor
//! - [`Handler`] - The closed middleware/handler type, with [`HandlerId`] identity
//! - [`Chain`] - An ordered sequence of handlers a context steps through
//! - [`Pool`] / [`PoolManager`] - Bounded pools with RAII release
//! - [`DispatchError`] - Dispatch errors and their JSON envelope
//! - [`Request`] / [`Response`] - What the connection layer hands in and gets back

#![forbid(unsafe_code)]

mod context;
mod error;
mod handler;
mod pool;
mod types;

pub use context::{DispatchContext, DEFAULT_HEADER_CAPACITY_LIMIT};
pub use error::{DispatchError, DispatchResult, ErrorDetail, ErrorEnvelope};
pub use handler::{Chain, Handler, HandlerId, HandlerRegistry};
pub use pool::{Pool, PoolLimits, PoolManager, PoolStats, Pooled, Recycle};
pub use types::{Request, RequestBuilder, Response};

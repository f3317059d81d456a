//! Waypoint — a request-serving core for server-rendered UI frameworks: pattern matching,
//! deduplicated task execution, and nested route resolution.
//!
//! The three pieces compose but are independently usable:
//!
//! - [`pattern`] parses and matches route patterns, flat (`find_best_match`) or nested
//!   (`pattern::nested::find_nested_matches`).
//! - [`task`] is a memoized, cancellable async task engine ([`task::Ctx::run`],
//!   [`task::Ctx::run_parallel`]) usable on its own by application code that just wants
//!   deduplicated derived values.
//! - [`router`] and [`nested`] build an HTTP-facing dispatcher and a loader-chain resolver on
//!   top of the two.

#![warn(missing_docs)]

use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod marshal;
pub mod nested;
pub mod pattern;
pub mod router;
mod service;
pub mod start;
pub mod task;

pub use error::{Result, RouterError};
pub use router::Router;
pub use service::WaypointService;

/// A boxed, `Send` future, used throughout the crate's trait-object-based handler and middleware
/// signatures in place of an associated type.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

//! # sflight Async
//!
//! Call coalescing for async producers.
//!
//! [`AsyncGroup`] gives `async` code the same contract as the blocking
//! [`Group`](sflight_core::Group): concurrent tasks asking for the same key share
//! one execution, and its result is reused until the freshness window elapses.
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! sflight-async = "0.3"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use sflight_async::AsyncGroup;
//! use std::time::Duration;
//!
//! #[derive(Clone, Debug)]
//! struct User {
//!     id: u64,
//! }
//!
//! async fn fetch_user(id: u64) -> Result<User, String> {
//!     tokio::time::sleep(Duration::from_millis(100)).await;
//!     Ok(User { id })
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let users: AsyncGroup<u64, User, String> = AsyncGroup::new(Duration::from_secs(1));
//!
//!     // Ten concurrent lookups, one fetch.
//!     let lookups = (0..10).map(|_| {
//!         let users = users.clone();
//!         tokio::spawn(async move { users.work(7, || fetch_user(7)).await })
//!     });
//!     for lookup in lookups {
//!         let flight = lookup.await.unwrap();
//!         assert_eq!(flight.result.unwrap().id, 7);
//!     }
//! }
//! ```
//!
//! ## Runtime
//!
//! The group only needs `tokio::sync`; it works on any executor. The
//! expiration sweep runs on a short-lived background OS thread, never on the
//! async runtime.
//!
mod call;
mod group;

pub use call::AsyncCall;
pub use group::AsyncGroup;

// Re-export the shared building blocks from sflight-core
pub use sflight_core::{ConfigError, Flight, GroupConfig};
#[cfg(feature = "stats")]
pub use sflight_core::{stats_registry, FlightStats};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{AsyncGroup, Flight, GroupConfig};
}

//! # sflight Core
//!
//! Core building blocks for the sflight call-coalescing library.
//!
//! A [`Group`] makes sure that concurrent callers asking for the same key share
//! a single execution of the producing function, and that the result of that
//! execution keeps being reused until its freshness window elapses.
//!
//! ## Features
//!
//! - **Coalescing**: one execution per key per freshness window, any number of waiters
//! - **Freshness window**: results are reused for a bounded time after the execution started
//! - **Expiration sweep**: stale records are reclaimed opportunistically, with no timer thread
//! - **Panic safety**: a panicking producer never leaves waiters blocked
//! - **Statistics**: execution/join counters and a named registry (with the `stats` feature)
//!
//! ## Module Organization
//!
//! - [`call`] - The call record: start time and write-once outcome
//! - [`table`] - The key → record table shared by blocking and async groups, and the sweep
//! - [`group`] - The blocking [`Group`]
//! - [`config`] - [`GroupConfig`] and [`ConfigError`]
//! - [`stats_registry`] - Process-wide lookup of group statistics by name
//!
pub mod call;
pub mod config;
pub mod group;
#[doc(hidden)]
pub mod table;

#[cfg(feature = "stats")]
mod stats;

#[cfg(feature = "stats")]
pub mod stats_registry;

pub use call::{Call, Completion, Settled};
pub use config::{ConfigError, GroupConfig};
pub use group::{Flight, Group};
// Shared with sflight-async; not part of the supported surface.
#[doc(hidden)]
pub use table::{Claim, Started, Table};

#[cfg(feature = "stats")]
pub use stats::FlightStats;
